// file: src/models/repository.rs
// description: source repository entity and its status lifecycle
// reference: status transitions validated before any conditional write

use crate::database::{Changes, Key};
use crate::error::{Result, WikiError};
use crate::models::{StoredEntity, now, timestamp};
use crate::utils::validation::{RemoteInfo, Validator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Codecommit,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Github, Provider::Codecommit];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Codecommit => "codecommit",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Provider::Github),
            "codecommit" => Ok(Provider::Codecommit),
            other => Err(WikiError::Validation(format!("Unknown provider: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepositoryStatus {
    Ready,
    Parsing,
    Failed,
}

impl RepositoryStatus {
    pub const ALL: [RepositoryStatus; 3] = [
        RepositoryStatus::Ready,
        RepositoryStatus::Parsing,
        RepositoryStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RepositoryStatus::Ready => "READY",
            RepositoryStatus::Parsing => "PARSING",
            RepositoryStatus::Failed => "FAILED",
        }
    }

    /// READY -> PARSING -> READY | FAILED, and FAILED -> PARSING on retry.
    pub fn can_transition_to(self, next: RepositoryStatus) -> bool {
        matches!(
            (self, next),
            (RepositoryStatus::Ready, RepositoryStatus::Parsing)
                | (RepositoryStatus::Parsing, RepositoryStatus::Ready)
                | (RepositoryStatus::Parsing, RepositoryStatus::Failed)
                | (RepositoryStatus::Failed, RepositoryStatus::Parsing)
        )
    }
}

impl fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryStatus {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "READY" => Ok(RepositoryStatus::Ready),
            "PARSING" => Ok(RepositoryStatus::Parsing),
            "FAILED" => Ok(RepositoryStatus::Failed),
            other => Err(WikiError::Validation(format!(
                "Unknown repository status: {}",
                other
            ))),
        }
    }
}

impl From<RepositoryStatus> for Value {
    fn from(status: RepositoryStatus) -> Self {
        Value::String(status.as_str().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(rename = "repo_id")]
    pub id: String,
    pub provider: Provider,
    pub remote_url: String,
    pub display_name: String,
    pub default_branch: String,
    pub status: RepositoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_sha: Option<String>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Repository {
    pub fn remote_info(&self) -> Option<RemoteInfo> {
        Validator::parse_remote_url(self.provider, &self.remote_url)
    }

    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

impl StoredEntity for Repository {
    const KIND: &'static str = "repository";

    fn key(&self) -> Key {
        Key::partition(&self.id)
    }
}

/// Registration request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRepository {
    pub provider: Option<Provider>,
    pub remote_url: String,
    pub display_name: String,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NewRepository {
    pub fn new(provider: Provider, remote_url: &str, display_name: &str) -> Self {
        Self {
            provider: Some(provider),
            remote_url: remote_url.to_string(),
            display_name: display_name.to_string(),
            default_branch: None,
            metadata: Map::new(),
        }
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.default_branch = Some(branch.to_string());
        self
    }

    /// Validate and build a READY repository under a fresh id.
    pub fn into_repository(self, id: String) -> Result<Repository> {
        let provider = self
            .provider
            .ok_or_else(|| WikiError::Validation("Provider is required".to_string()))?;
        Validator::validate_remote_url(provider, &self.remote_url)?;
        let display_name = Validator::validate_display_name(&self.display_name)?;
        let default_branch =
            Validator::validate_branch(self.default_branch.as_deref().unwrap_or(DEFAULT_BRANCH))?;

        let created = now();
        Ok(Repository {
            id,
            provider,
            remote_url: self.remote_url,
            display_name,
            default_branch,
            status: RepositoryStatus::Ready,
            last_scan_sha: None,
            last_scan_at: None,
            created_at: created,
            updated_at: created,
            deleted: false,
            metadata: self.metadata,
        })
    }
}

/// Editable repository fields. The remote URL and provider are fixed at
/// registration; status moves through `set_status` and `transition`.
#[derive(Debug, Clone, Default)]
pub struct RepositoryUpdate {
    pub display_name: Option<String>,
    pub default_branch: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl RepositoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.default_branch.is_none() && self.metadata.is_none()
    }

    pub fn into_changes(self) -> Result<Changes> {
        let mut changes = Changes::new();
        if let Some(name) = self.display_name {
            changes.insert("display_name", Validator::validate_display_name(&name)?);
        }
        if let Some(branch) = self.default_branch {
            changes.insert("default_branch", Validator::validate_branch(&branch)?);
        }
        if let Some(metadata) = self.metadata {
            changes.insert("metadata", Value::Object(metadata));
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_machine() {
        use RepositoryStatus::*;
        assert!(Ready.can_transition_to(Parsing));
        assert!(Parsing.can_transition_to(Ready));
        assert!(Parsing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Parsing));
        assert!(!Ready.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Ready));
    }

    #[test]
    fn test_registration_defaults() {
        let repo = NewRepository::new(Provider::Github, "https://github.com/acme/widgets", " Widgets ")
            .into_repository("repo-00000001".to_string())
            .unwrap();

        assert_eq!(repo.status, RepositoryStatus::Ready);
        assert_eq!(repo.default_branch, "main");
        assert_eq!(repo.display_name, "Widgets");
        assert_eq!(repo.created_at, repo.updated_at);
        assert_eq!(repo.remote_info().unwrap().full_name, "acme/widgets");
    }

    #[test]
    fn test_record_attribute_names() {
        let repo = NewRepository::new(Provider::Codecommit, "codecommit://widgets", "Widgets")
            .into_repository("repo-00000002".to_string())
            .unwrap();
        let record = repo.to_record().unwrap();

        assert_eq!(record.get("repo_id"), Some(&Value::from("repo-00000002")));
        assert_eq!(record.get("provider"), Some(&Value::from("codecommit")));
        assert_eq!(record.get("status"), Some(&Value::from("READY")));
        assert!(!record.contains_key("last_scan_sha"));

        let back = Repository::from_record(record).unwrap();
        assert_eq!(back, repo);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = NewRepository::new(Provider::Github, "https://gitlab.com/acme/widgets", "Widgets")
            .into_repository("repo-00000003".to_string());
        assert!(matches!(result, Err(WikiError::Validation(_))));
    }
}
