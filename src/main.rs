// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use deepwiki_store::utils::logging::{
    format_error, format_info, format_status, format_success, format_warning, init_logger,
};
use deepwiki_store::{
    ChannelPublisher, Config, Importance, JobPriority, JobPublisher, JobReceiver, JobStatus,
    JobType, JobUpdate, NewJob, NewPage, NewRepository, OutboxPublisher, PageStatus, PageType,
    PageUpdate, Provider, RepositoryStatus, RepositoryUpdate, TocEntry, WikiService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "deepwiki_store")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Repository, job and wiki page store for documentation generation", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered repositories
    #[command(subcommand)]
    Repo(RepoCommand),

    /// Submit and track analysis jobs
    #[command(subcommand)]
    Job(JobCommand),

    /// Store and read generated wiki pages
    #[command(subcommand)]
    Page(PageCommand),

    /// Print the table of contents of a repository's wiki
    Toc { repository: String },

    /// Probe every table
    Health,
}

#[derive(Subcommand)]
enum RepoCommand {
    Register {
        #[arg(long)]
        provider: Provider,

        #[arg(long)]
        url: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        branch: Option<String>,
    },

    List {
        #[arg(long)]
        status: Option<RepositoryStatus>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    Show { id: String },

    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        branch: Option<String>,
    },

    Delete {
        id: String,

        /// Remove the record and its jobs and pages instead of flagging it
        #[arg(long)]
        physical: bool,
    },

    Status {
        id: String,

        status: RepositoryStatus,

        #[arg(long)]
        sha: Option<String>,
    },

    /// Counts by provider and by status
    Stats,

    Recent {
        #[arg(short, long)]
        count: Option<usize>,
    },
}

#[derive(Subcommand)]
enum JobCommand {
    Submit {
        repository: String,

        #[arg(long = "type", default_value = "FULL_PARSE")]
        job_type: JobType,

        #[arg(long)]
        priority: Option<JobPriority>,
    },

    List {
        repository: String,

        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    Show { id: String },

    Update {
        id: String,

        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(long, allow_hyphen_values = true)]
        progress: Option<i64>,

        #[arg(long)]
        processed: Option<u64>,

        #[arg(long)]
        total: Option<u64>,

        #[arg(long)]
        executor: Option<String>,

        #[arg(long)]
        error: Option<String>,
    },

    Stats {
        #[arg(long)]
        repository: Option<String>,
    },

    /// Remove jobs past their expiry
    Purge,
}

#[derive(Subcommand)]
enum PageCommand {
    Add {
        repository: String,

        source_path: String,

        #[arg(long)]
        title: String,

        /// File holding the page body
        #[arg(long, value_name = "FILE")]
        content: Option<PathBuf>,

        #[arg(long = "type")]
        page_type: Option<PageType>,

        #[arg(long)]
        importance: Option<Importance>,

        #[arg(long)]
        parent: Option<String>,
    },

    List {
        repository: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    Show { repository: String, page_id: String },

    Update {
        repository: String,

        page_id: String,

        #[arg(long)]
        title: Option<String>,

        /// File holding the new page body
        #[arg(long, value_name = "FILE")]
        content: Option<PathBuf>,

        #[arg(long)]
        summary: Option<String>,

        #[arg(long = "type")]
        page_type: Option<PageType>,

        #[arg(long)]
        status: Option<PageStatus>,

        #[arg(long)]
        importance: Option<Importance>,

        #[arg(long, conflicts_with = "detach")]
        parent: Option<String>,

        /// Make the page a root of the table of contents
        #[arg(long, action = ArgAction::SetTrue)]
        detach: bool,

        /// Replace the tags; repeat for several
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Stamp the page as analyzed now
        #[arg(long, action = ArgAction::SetTrue)]
        analyzed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logger(cli.color, cli.verbose);
    colored::control::set_override(cli.color);

    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::load(None).unwrap_or_else(|e| {
            warn!("Falling back to built-in defaults: {}", e);
            Config::default_config()
        })
    };

    let (publisher, _receiver) = build_publisher(&config);
    let service = WikiService::open(config, publisher)
        .await
        .context("Failed to open the store")?;

    match cli.command {
        Commands::Repo(command) => cmd_repo(&service, command).await?,
        Commands::Job(command) => cmd_job(&service, command).await?,
        Commands::Page(command) => cmd_page(&service, command).await?,
        Commands::Toc { repository } => cmd_toc(&service, &repository).await?,
        Commands::Health => cmd_health(&service).await?,
    }

    Ok(())
}

/// Outbox file when configured, otherwise an in-process queue whose receiver
/// lives only as long as this command.
fn build_publisher(config: &Config) -> (Arc<dyn JobPublisher>, Option<JobReceiver>) {
    match &config.queue.outbox_path {
        Some(path) => (Arc::new(OutboxPublisher::new(path)), None),
        None => {
            warn!("No job outbox configured; queued envelopes are dropped on exit");
            let (publisher, receiver) = ChannelPublisher::channel(config.queue.capacity);
            (Arc::new(publisher), Some(receiver))
        }
    }
}

fn limit_or_default(service: &WikiService, limit: Option<usize>) -> usize {
    limit.unwrap_or(service.config().listing.default_limit)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to render output")?
    );
    Ok(())
}

async fn cmd_repo(service: &WikiService, command: RepoCommand) -> Result<()> {
    let ctx = service.context();
    let repos = service.repositories();

    match command {
        RepoCommand::Register {
            provider,
            url,
            name,
            branch,
        } => {
            let mut request = NewRepository::new(provider, &url, &name);
            if let Some(branch) = branch {
                request = request.with_branch(&branch);
            }
            let repo = service
                .register_repository(&ctx, request)
                .await
                .context("Failed to register repository")?;
            println!("{}", format_success(&format!("Registered {} ({})", repo.id, repo.remote_url)));
        }
        RepoCommand::List { status, limit } => {
            let list = repos
                .list(&ctx, status, limit_or_default(service, limit))
                .await
                .context("Failed to list repositories")?;
            if list.is_empty() {
                println!("{}", format_info("No repositories"));
            }
            for repo in list {
                println!(
                    "{:<14} {:<10} {:<30} {}",
                    repo.id,
                    format_status(repo.status.as_str()),
                    repo.display_name,
                    repo.remote_url
                );
            }
        }
        RepoCommand::Show { id } => {
            let repo = repos.get(&ctx, &id).await.context("Failed to read repository")?;
            print_json(&repo)?;
        }
        RepoCommand::Update { id, name, branch } => {
            let update = RepositoryUpdate {
                display_name: name,
                default_branch: branch,
                metadata: None,
            };
            let repo = repos
                .update(&ctx, &id, update)
                .await
                .context("Failed to update repository")?;
            println!("{}", format_success(&format!("Updated {}", repo.id)));
        }
        RepoCommand::Delete { id, physical } => {
            let outcome = service
                .delete_repository(&ctx, &id, physical)
                .await
                .context("Failed to delete repository")?;
            if outcome.deleted {
                println!(
                    "{}",
                    format_success(&format!(
                        "Deleted {} ({} pages, {} jobs removed)",
                        id, outcome.pages.deleted, outcome.jobs.deleted
                    ))
                );
            } else if !outcome.is_complete() {
                println!(
                    "{}",
                    format_error(&format!(
                        "{} kept: {} page and {} job deletions failed",
                        id,
                        outcome.pages.failures.len(),
                        outcome.jobs.failures.len()
                    ))
                );
            } else {
                println!("{}", format_warning(&format!("{} not found", id)));
            }
        }
        RepoCommand::Status { id, status, sha } => {
            if repos
                .set_status(&ctx, &id, status, sha.as_deref())
                .await
                .context("Failed to set repository status")?
            {
                println!("{}", format_success(&format!("{} is now {}", id, status)));
            } else {
                println!("{}", format_warning(&format!("{} not found", id)));
            }
        }
        RepoCommand::Stats => {
            let by_provider = repos.count_by_provider(&ctx).await?;
            let by_status = repos.count_by_status(&ctx).await?;
            println!("By provider:");
            for (provider, count) in by_provider {
                println!("  {:<12} {}", provider, count);
            }
            println!("By status:");
            for (status, count) in by_status {
                println!("  {:<12} {}", format_status(status.as_str()), count);
            }
        }
        RepoCommand::Recent { count } => {
            let count = count.unwrap_or(service.config().listing.recent_count);
            for repo in repos.recently_updated(&ctx, count).await? {
                println!(
                    "{:<14} {}  {}",
                    repo.id,
                    repo.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    repo.display_name
                );
            }
        }
    }

    Ok(())
}

async fn cmd_job(service: &WikiService, command: JobCommand) -> Result<()> {
    let ctx = service.context();
    let jobs = service.jobs();

    match command {
        JobCommand::Submit {
            repository,
            job_type,
            priority,
        } => {
            let priority = match priority {
                Some(priority) => priority,
                None => service
                    .default_priority()
                    .context("Invalid jobs.default_priority")?,
            };
            let job = service
                .submit_job(&ctx, NewJob::new(&repository, job_type).with_priority(priority))
                .await
                .context("Failed to submit job")?;
            println!(
                "{}",
                format_success(&format!(
                    "Submitted {} ({}, expires {})",
                    job.id,
                    job.job_type,
                    job.expires_at.format("%Y-%m-%d")
                ))
            );
        }
        JobCommand::List {
            repository,
            status,
            limit,
        } => {
            let list = jobs
                .list_for_repository(&ctx, &repository, status, limit_or_default(service, limit))
                .await
                .context("Failed to list jobs")?;
            for job in list {
                println!(
                    "{:<18} {:<18} {:<10} {:>3}%  {}",
                    job.id,
                    job.job_type,
                    format_status(job.status.as_str()),
                    job.progress,
                    job.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        JobCommand::Show { id } => {
            let job = jobs.get(&ctx, &id).await.context("Failed to read job")?;
            print_json(&job)?;
        }
        JobCommand::Update {
            id,
            status,
            progress,
            processed,
            total,
            executor,
            error,
        } => {
            let update = JobUpdate {
                status,
                progress,
                processed_files: processed,
                total_files: total,
                executor,
                error_message: error,
                ..JobUpdate::default()
            };
            let job = jobs
                .update(&ctx, &id, update)
                .await
                .context("Failed to update job")?;
            println!(
                "{}",
                format_success(&format!("{} {} at {}%", job.id, job.status, job.progress))
            );
        }
        JobCommand::Stats { repository } => {
            let stats = jobs.statistics(&ctx, repository.as_deref()).await?;
            print_json(&stats)?;
        }
        JobCommand::Purge => {
            let removed = service.purge_expired_jobs(&ctx).await?;
            println!("{}", format_success(&format!("Removed {} expired jobs", removed)));
        }
    }

    Ok(())
}

async fn cmd_page(service: &WikiService, command: PageCommand) -> Result<()> {
    let ctx = service.context();

    match command {
        PageCommand::Add {
            repository,
            source_path,
            title,
            content,
            page_type,
            importance,
            parent,
        } => {
            let body = match content {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => String::new(),
            };
            let mut request = NewPage::new(&repository, &source_path, &title, &body);
            request.page_type = page_type;
            request.importance = importance;
            request.parent_page = parent;

            let page = service
                .add_page(&ctx, request)
                .await
                .context("Failed to store page")?;
            println!(
                "{}",
                format_success(&format!(
                    "Stored {} ({}, {})",
                    page.page_id, page.page_type, page.importance
                ))
            );
        }
        PageCommand::List { repository, limit } => {
            let pages = service
                .pages()
                .list(&ctx, &repository, limit_or_default(service, limit))
                .await
                .context("Failed to list pages")?;
            for page in pages {
                println!(
                    "{:<28} {:<10} {:<7} {}",
                    page.page_id, page.page_type, page.importance, page.source_path
                );
            }
        }
        PageCommand::Show {
            repository,
            page_id,
        } => {
            let page = service
                .pages()
                .get(&ctx, &repository, &page_id)
                .await
                .context("Failed to read page")?;
            print_json(&page)?;
        }
        PageCommand::Update {
            repository,
            page_id,
            title,
            content,
            summary,
            page_type,
            status,
            importance,
            parent,
            detach,
            tags,
            analyzed,
        } => {
            let content = match content {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let parent_page = if detach { Some(None) } else { parent.map(Some) };
            let update = PageUpdate {
                title,
                content,
                summary,
                page_type,
                status,
                importance,
                parent_page,
                tags: (!tags.is_empty()).then_some(tags),
                mark_analyzed: analyzed,
                ..PageUpdate::default()
            };

            let page = service
                .pages()
                .update(&ctx, &repository, &page_id, update)
                .await
                .context("Failed to update page")?;
            println!(
                "{}",
                format_success(&format!("Updated {} ({})", page.page_id, page.status))
            );
        }
    }

    Ok(())
}

async fn cmd_toc(service: &WikiService, repository: &str) -> Result<()> {
    let ctx = service.context();
    let toc = service
        .table_of_contents(&ctx, repository)
        .await
        .context("Failed to build table of contents")?;

    println!("{} ({})", toc.repository_name, toc.repository_id);
    let mut pending: Vec<(&TocEntry, usize)> = toc.roots.iter().rev().map(|root| (root, 0)).collect();
    while let Some((entry, depth)) = pending.pop() {
        println!("{}- {} [{}]", "  ".repeat(depth), entry.title, entry.page_type);
        pending.extend(entry.children.iter().rev().map(|child| (child, depth + 1)));
    }
    if !toc.cycles.is_empty() {
        println!(
            "{}",
            format_warning(&format!("Parent cycle among: {}", toc.cycles.join(", ")))
        );
    }
    let updated = toc
        .last_updated
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{}",
        format_info(&format!("{} pages, last updated {}", toc.total_pages, updated))
    );

    Ok(())
}

async fn cmd_health(service: &WikiService) -> Result<()> {
    let report = service.health(&service.context()).await;
    print!("{}", report.format());
    if !report.is_healthy() {
        anyhow::bail!("Store is not healthy");
    }
    Ok(())
}
