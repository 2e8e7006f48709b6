// file: src/managers/mod.rs
// description: entity managers layered over the conditional store
// reference: internal module structure

pub mod job;
pub mod page;
pub mod repository;

pub use job::JobManager;
pub use page::PageManager;
pub use repository::RepositoryManager;

use crate::database::Record;
use crate::error::Result;
use crate::models::StoredEntity;

fn decode_all<T: StoredEntity>(records: Vec<Record>) -> Result<Vec<T>> {
    records.into_iter().map(T::from_record).collect()
}
