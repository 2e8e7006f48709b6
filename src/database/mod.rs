// file: src/database/mod.rs
// description: conditional store abstraction, backends and table wiring
// reference: internal module structure

pub mod client;
pub mod condition;
pub mod context;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use client::StoreSet;
pub use condition::{Changes, Condition, Key, Record};
pub use context::RequestContext;
pub use memory::MemoryStore;
pub use schema::{IndexSchema, TableSchema};
pub use sqlite::SqliteStore;
pub use store::{BatchFailure, BatchOutcome, ConditionalStore, QueryRequest};
