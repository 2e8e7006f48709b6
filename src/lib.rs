// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns

pub mod config;
pub mod database;
pub mod error;
pub mod managers;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use config::{Backend, Config, JobConfig, ListingConfig, QueueConfig, StorageConfig};
pub use database::{
    BatchOutcome, Changes, Condition, ConditionalStore, Key, MemoryStore, QueryRequest, Record,
    RequestContext, SqliteStore, StoreSet, TableSchema,
};
pub use error::{Result, StoreError, StoreResult, WikiError};
pub use managers::{JobManager, PageManager, RepositoryManager};
pub use models::{
    Importance, Job, JobEnvelope, JobPriority, JobStatistics, JobStatus, JobType, JobUpdate,
    NewJob, NewPage, NewRepository, Page, PageStatus, PageType, PageUpdate, Provider, Repository,
    RepositoryStatus, RepositoryUpdate, StoredEntity, TableOfContents, TocEntry,
};
pub use pipeline::{
    ChannelPublisher, JobPublisher, JobReceiver, OutboxPublisher, RepositoryDeletion, WikiService,
};
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, Validator};
