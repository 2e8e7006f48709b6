// file: src/database/store.rs
// description: Conditional store contract shared by the memory and SQLite backends
// reference: https://docs.rs/async-trait

use crate::database::condition::{Changes, Condition, Key, Record};
use crate::database::context::RequestContext;
use crate::database::schema::TableSchema;
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Index-ordered retrieval by partition value.
///
/// With no `index` the table's own partition key and sort key are used.
/// `sort_value` narrows the result to one sort-key value, which is how the
/// repository+status index is read for a single status.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub partition_value: String,
    pub index: Option<String>,
    pub sort_value: Option<Value>,
    pub ascending: bool,
    pub limit: Option<usize>,
    pub filter: Option<Condition>,
}

impl QueryRequest {
    pub fn new(partition_value: impl Into<String>) -> Self {
        Self {
            partition_value: partition_value.into(),
            index: None,
            sort_value: None,
            ascending: true,
            limit: None,
            filter: None,
        }
    }

    pub fn on_index(mut self, index: &str) -> Self {
        self.index = Some(index.to_string());
        self
    }

    pub fn sort_equals(mut self, value: impl Into<Value>) -> Self {
        self.sort_value = Some(value.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[derive(Debug)]
pub enum BatchFailure {
    Put { key: Option<Key>, reason: String },
    Delete { key: Key, reason: String },
}

/// Per-entry result of a batch write. Entries are applied independently.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub written: usize,
    pub deleted: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Single-table persistence primitive with optimistic-concurrency writes.
///
/// Implementations must be safe for concurrent callers: every conditional write
/// checks its condition and applies its effect as one atomic step.
#[async_trait]
pub trait ConditionalStore: Send + Sync {
    fn schema(&self) -> &TableSchema;

    /// Point lookup. Soft-deleted records are returned like any other.
    async fn get(&self, ctx: &RequestContext, key: &Key) -> StoreResult<Option<Record>>;

    async fn put(
        &self,
        ctx: &RequestContext,
        record: Record,
        condition: Option<&Condition>,
    ) -> StoreResult<()>;

    /// Partial update returning the new record. Never creates a record.
    async fn update(
        &self,
        ctx: &RequestContext,
        key: &Key,
        changes: &Changes,
        condition: Option<&Condition>,
    ) -> StoreResult<Record>;

    /// Conditional removal. Deleting a missing key without a condition succeeds.
    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &Key,
        condition: Option<&Condition>,
    ) -> StoreResult<()>;

    async fn query(&self, ctx: &RequestContext, request: &QueryRequest)
    -> StoreResult<Vec<Record>>;

    /// Full-table read, O(table size). The limit counts matching records.
    async fn scan(
        &self,
        ctx: &RequestContext,
        filter: Option<&Condition>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Record>>;

    async fn batch_write(
        &self,
        ctx: &RequestContext,
        puts: Vec<Record>,
        deletes: Vec<Key>,
    ) -> StoreResult<BatchOutcome>;

    /// Remove records whose TTL attribute (epoch seconds) is at or before `now`.
    async fn purge_expired(&self, ctx: &RequestContext, now: DateTime<Utc>) -> StoreResult<usize>;

    async fn ping(&self, ctx: &RequestContext) -> StoreResult<()>;
}
