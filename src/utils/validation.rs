// file: src/utils/validation.rs
// description: input validation run before any store call
// reference: input validation patterns

use crate::error::{Result, WikiError};
use crate::models::Provider;
use crate::utils::patterns;
use serde::Serialize;

pub const MAX_DISPLAY_NAME: usize = 100;
pub const MAX_TITLE: usize = 200;

/// Owner and name extracted from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteInfo {
    pub owner: String,
    pub name: String,
    pub full_name: String,
}

impl RemoteInfo {
    fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            full_name: format!("{}/{}", owner, name),
        }
    }
}

pub struct Validator;

impl Validator {
    pub fn validate_remote_url(provider: Provider, url: &str) -> Result<()> {
        let valid = match provider {
            Provider::Github => patterns::github_patterns().iter().any(|p| p.is_match(url)),
            Provider::Codecommit => patterns::codecommit_patterns()
                .iter()
                .any(|p| p.is_match(url)),
        };

        if !valid {
            return Err(WikiError::Validation(format!(
                "Invalid {} URL: {}",
                provider, url
            )));
        }
        Ok(())
    }

    pub fn parse_remote_url(provider: Provider, url: &str) -> Option<RemoteInfo> {
        match provider {
            Provider::Github => patterns::GITHUB_HTTPS_PARTS
                .captures(url)
                .or_else(|| patterns::GITHUB_SSH_PARTS.captures(url))
                .map(|caps| RemoteInfo::new(&caps[1], &caps[2])),
            Provider::Codecommit => {
                if let Some(caps) = patterns::CODECOMMIT_SHORT_PARTS.captures(url) {
                    return Some(RemoteInfo::new("codecommit", &caps[1]));
                }
                patterns::CODECOMMIT_REGIONAL_PARTS
                    .captures(url)
                    .or_else(|| patterns::CODECOMMIT_HTTPS_PARTS.captures(url))
                    .map(|caps| RemoteInfo::new(&format!("codecommit-{}", &caps[1]), &caps[2]))
            }
        }
    }

    /// Trimmed display name, 1 to 100 characters.
    pub fn validate_display_name(name: &str) -> Result<String> {
        Self::bounded_text("Display name", name, MAX_DISPLAY_NAME)
    }

    /// Trimmed page title, 1 to 200 characters.
    pub fn validate_title(title: &str) -> Result<String> {
        Self::bounded_text("Title", title, MAX_TITLE)
    }

    pub fn validate_branch(branch: &str) -> Result<String> {
        let branch = branch.trim();
        if branch.is_empty() || branch.chars().any(char::is_whitespace) {
            return Err(WikiError::Validation(format!("Invalid branch name: {:?}", branch)));
        }
        Ok(branch.to_string())
    }

    pub fn validate_progress(progress: i64) -> Result<u8> {
        u8::try_from(progress)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| {
                WikiError::Validation(format!("Progress must be within 0..=100, got {}", progress))
            })
    }

    /// Limits are required at the interface and capped by configuration.
    pub fn validate_limit(limit: usize, max: usize) -> Result<usize> {
        if limit == 0 {
            return Err(WikiError::Validation(
                "Limit must be greater than 0".to_string(),
            ));
        }

        if limit > max {
            return Err(WikiError::Validation(format!(
                "Limit too large (max {})",
                max
            )));
        }

        Ok(limit)
    }

    pub fn validate_source_path(path: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(WikiError::Validation("Source path is empty".to_string()));
        }
        Ok(())
    }

    fn bounded_text(field: &str, value: &str, max: usize) -> Result<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(WikiError::Validation(format!("{} is required", field)));
        }
        if trimmed.chars().count() > max {
            return Err(WikiError::Validation(format!(
                "{} must be at most {} characters",
                field, max
            )));
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_remote_url() {
        assert!(Validator::validate_remote_url(Provider::Github, "https://github.com/acme/widgets").is_ok());
        assert!(Validator::validate_remote_url(Provider::Github, "git@github.com:acme/widgets.git").is_ok());
        assert!(Validator::validate_remote_url(Provider::Github, "codecommit://widgets").is_err());
        assert!(Validator::validate_remote_url(Provider::Codecommit, "codecommit://widgets").is_ok());
        assert!(Validator::validate_remote_url(
            Provider::Codecommit,
            "https://github.com/acme/widgets"
        )
        .is_err());
    }

    #[test]
    fn test_parse_remote_url() {
        let info = Validator::parse_remote_url(Provider::Github, "git@github.com:acme/widgets.git")
            .unwrap();
        assert_eq!(info.full_name, "acme/widgets");

        let info = Validator::parse_remote_url(
            Provider::Codecommit,
            "https://git-codecommit.eu-west-1.amazonaws.com/v1/repos/widgets",
        )
        .unwrap();
        assert_eq!(info.owner, "codecommit-eu-west-1");
        assert_eq!(info.name, "widgets");

        let info = Validator::parse_remote_url(Provider::Codecommit, "codecommit://widgets").unwrap();
        assert_eq!(info.full_name, "codecommit/widgets");
    }

    #[test]
    fn test_validate_display_name() {
        assert_eq!(Validator::validate_display_name("  Widgets ").unwrap(), "Widgets");
        assert!(Validator::validate_display_name("   ").is_err());
        assert!(Validator::validate_display_name(&"x".repeat(101)).is_err());
        assert!(Validator::validate_display_name(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn test_validate_progress_bounds() {
        for p in [0, 1, 45, 99, 100] {
            assert_eq!(Validator::validate_progress(p).unwrap() as i64, p);
        }
        for p in [-1, 101, 150, i64::MIN, i64::MAX] {
            assert!(Validator::validate_progress(p).is_err());
        }
    }

    #[test]
    fn test_validate_limit() {
        assert_eq!(Validator::validate_limit(10, 100).unwrap(), 10);
        assert!(Validator::validate_limit(0, 100).is_err());
        assert!(Validator::validate_limit(101, 100).is_err());
    }
}
