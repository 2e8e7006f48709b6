// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{Result, WikiError};
use crate::models::JobPriority;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub jobs: JobConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    pub sqlite_path: PathBuf,
    pub project_name: String,
    pub environment: String,
    pub request_timeout_secs: Option<u64>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            sqlite_path: PathBuf::from("data/deepwiki.db"),
            project_name: "deepwiki".to_string(),
            environment: "dev".to_string(),
            request_timeout_secs: Some(10),
            max_connections: 4,
        }
    }
}

impl StorageConfig {
    /// Prefix shared by the three entity tables, e.g. `deepwiki-dev`.
    pub fn table_prefix(&self) -> String {
        format!("{}-{}", self.project_name, self.environment)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JobConfig {
    pub ttl_days: i64,
    pub default_priority: String,
}

impl JobConfig {
    /// Priority for submissions that do not name one.
    pub fn priority(&self) -> Result<JobPriority> {
        self.default_priority.parse().map_err(|_| {
            WikiError::Config(format!(
                "default_priority must be HIGH, NORMAL or LOW, got '{}'",
                self.default_priority
            ))
        })
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            ttl_days: 30,
            default_priority: "NORMAL".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListingConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub recent_count: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 1000,
            recent_count: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub outbox_path: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            outbox_path: Some(PathBuf::from("data/job-outbox.jsonl")),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder
                .add_source(config::File::from(Path::new("config/default.toml")).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DEEPWIKI")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| WikiError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| WikiError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Everything in memory, nothing written to disk. Used by tests.
    pub fn ephemeral() -> Self {
        let mut config = Self::default();
        config.storage.backend = Backend::Memory;
        config.storage.environment = "test".to_string();
        config.queue.outbox_path = None;
        config
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("project_name", &self.storage.project_name),
            ("environment", &self.storage.environment),
        ] {
            if value.is_empty()
                || !value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(WikiError::Config(format!(
                    "{} must be non-empty and contain only letters, digits, '-' or '_'",
                    name
                )));
            }
        }

        if self.storage.max_connections == 0 {
            return Err(WikiError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.jobs.ttl_days <= 0 {
            return Err(WikiError::Config(
                "ttl_days must be greater than 0".to_string(),
            ));
        }

        self.jobs.priority()?;

        if self.listing.default_limit == 0 || self.listing.default_limit > self.listing.max_limit {
            return Err(WikiError::Config(
                "default_limit must be between 1 and max_limit".to_string(),
            ));
        }

        if self.queue.capacity == 0 {
            return Err(WikiError::Config(
                "queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
