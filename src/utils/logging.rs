// file: src/utils/logging.rs
// description: Tracing subscriber initialization and colored CLI status lines

use colored::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. `RUST_LOG` wins over the verbosity flag.
pub fn init_logger(colored_output: bool, verbose: bool) {
    let level = if verbose {
        "deepwiki_store=debug,sqlx=warn"
    } else {
        "deepwiki_store=info,sqlx=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact()
        .with_ansi(colored_output);

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

pub fn format_success(msg: &str) -> String {
    format!("{} {}", "✓".green().bold(), msg.green())
}

pub fn format_error(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}

pub fn format_warning(msg: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), msg.yellow())
}

pub fn format_info(msg: &str) -> String {
    format!("{} {}", "ℹ".blue().bold(), msg)
}

/// Color a lifecycle status by how it reads to an operator.
pub fn format_status(status: &str) -> String {
    match status {
        "READY" | "COMPLETED" | "ACTIVE" => status.green().to_string(),
        "PARSING" | "RUNNING" | "PENDING" | "DRAFT" => status.cyan().to_string(),
        "FAILED" => status.red().bold().to_string(),
        _ => status.dimmed().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_is_preserved() {
        colored::control::set_override(false);
        assert_eq!(format_status("READY"), "READY");
        assert!(format_error("boom").contains("boom"));
    }
}
