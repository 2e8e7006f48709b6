// file: src/database/client.rs
// description: opens the three entity tables on the configured backend
// reference: https://docs.rs/sqlx

use crate::config::{Backend, StorageConfig};
use crate::database::context::RequestContext;
use crate::database::memory::MemoryStore;
use crate::database::schema::TableSchema;
use crate::database::sqlite::{SqliteStore, open_pool};
use crate::database::store::ConditionalStore;
use crate::error::StoreResult;
use crate::utils::telemetry::HealthCheck;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Handles to the repositories, jobs and pages tables.
#[derive(Clone)]
pub struct StoreSet {
    pub repos: Arc<dyn ConditionalStore>,
    pub jobs: Arc<dyn ConditionalStore>,
    pub pages: Arc<dyn ConditionalStore>,
}

impl StoreSet {
    pub async fn open(config: &StorageConfig) -> StoreResult<Self> {
        let prefix = config.table_prefix();

        match config.backend {
            Backend::Memory => {
                info!("Using in-memory tables with prefix {}", prefix);
                Ok(Self::in_memory(&prefix))
            }
            Backend::Sqlite => {
                let pool = open_pool(&config.sqlite_path, config.max_connections).await?;
                let repos = SqliteStore::new(pool.clone(), TableSchema::repositories(&prefix)).await?;
                let jobs = SqliteStore::new(pool.clone(), TableSchema::jobs(&prefix)).await?;
                let pages = SqliteStore::new(pool, TableSchema::pages(&prefix)).await?;

                info!(
                    "Opened SQLite tables {}, {} and {}",
                    repos.schema().name,
                    jobs.schema().name,
                    pages.schema().name
                );
                Ok(Self {
                    repos: Arc::new(repos),
                    jobs: Arc::new(jobs),
                    pages: Arc::new(pages),
                })
            }
        }
    }

    pub fn in_memory(prefix: &str) -> Self {
        Self {
            repos: Arc::new(MemoryStore::new(TableSchema::repositories(prefix))),
            jobs: Arc::new(MemoryStore::new(TableSchema::jobs(prefix))),
            pages: Arc::new(MemoryStore::new(TableSchema::pages(prefix))),
        }
    }

    /// Probe every table, one health check per table.
    pub async fn ping_all(&self, ctx: &RequestContext) -> Vec<HealthCheck> {
        let mut checks = Vec::with_capacity(3);
        for store in [&self.repos, &self.jobs, &self.pages] {
            let started = Instant::now();
            let outcome = store.ping(ctx).await;
            let name = &store.schema().name;
            debug!("Probed {} in {:?}", name, started.elapsed());
            checks.push(HealthCheck::from_probe(name, outcome, started.elapsed()));
        }
        checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::utils::telemetry::HealthStatus;

    #[tokio::test]
    async fn test_memory_tables_are_prefixed() {
        let config = Config::ephemeral();
        let stores = StoreSet::open(&config.storage).await.unwrap();
        let prefix = config.storage.table_prefix();
        assert_eq!(stores.repos.schema().name, format!("{}-repos", prefix));
        assert_eq!(stores.jobs.schema().ttl_attribute.as_deref(), Some("ttl"));
        assert_eq!(stores.pages.schema().sort_key.as_deref(), Some("page_id"));
    }

    #[tokio::test]
    async fn test_sqlite_tables_answer_pings() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::ephemeral().storage;
        config.backend = Backend::Sqlite;
        config.sqlite_path = dir.path().join("nested").join("wiki.db");

        let stores = StoreSet::open(&config).await.unwrap();
        let checks = stores.ping_all(&RequestContext::new()).await;
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|c| c.status != HealthStatus::Unhealthy));
        assert!(config.sqlite_path.exists());
    }
}
