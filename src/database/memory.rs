// file: src/database/memory.rs
// description: In-process conditional store over an ordered map
// reference: https://docs.rs/tokio/latest/tokio/sync/struct.RwLock.html

use crate::database::condition::{Changes, Condition, Key, Record, check_attribute_name, compare_values};
use crate::database::context::RequestContext;
use crate::database::schema::TableSchema;
use crate::database::store::{BatchFailure, BatchOutcome, ConditionalStore, QueryRequest};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

type MapKey = (String, String);

/// Conditional store held in memory. Each write takes the table lock for the
/// duration of its condition check and mutation, which makes it atomic with
/// respect to every other task sharing the handle.
pub struct MemoryStore {
    schema: TableSchema,
    records: RwLock<BTreeMap<MapKey, Record>>,
}

impl MemoryStore {
    pub fn new(schema: TableSchema) -> Self {
        debug!("Creating in-memory table {}", schema.name);
        Self {
            schema,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn map_key(&self, key: &Key) -> StoreResult<MapKey> {
        self.schema.check_key(key)?;
        Ok((key.partition.clone(), key.sort.clone().unwrap_or_default()))
    }
}

fn check_condition(condition: Option<&Condition>) -> StoreResult<()> {
    if let Some(condition) = condition {
        for name in condition.attributes() {
            check_attribute_name(name)?;
        }
    }
    Ok(())
}

fn holds(condition: Option<&Condition>, current: Option<&Record>) -> bool {
    condition.is_none_or(|condition| condition.evaluate(current))
}

/// Shared validation for partial updates: names must be plain identifiers and
/// key attributes are immutable.
pub(crate) fn check_changes(schema: &TableSchema, changes: &Changes) -> StoreResult<()> {
    if changes.is_empty() {
        return Err(StoreError::InvalidRequest("Update has no changes".to_string()));
    }
    for (name, _) in changes.sets() {
        check_attribute_name(name)?;
    }
    for name in changes.removals() {
        check_attribute_name(name)?;
    }
    if let Some(name) = [Some(&schema.partition_key), schema.sort_key.as_ref()]
        .into_iter()
        .flatten()
        .find(|name| changes.touches(name))
    {
        return Err(StoreError::InvalidRequest(format!(
            "Key attribute {} cannot be updated",
            name
        )));
    }
    Ok(())
}

#[async_trait]
impl ConditionalStore for MemoryStore {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn get(&self, ctx: &RequestContext, key: &Key) -> StoreResult<Option<Record>> {
        let map_key = self.map_key(key)?;
        ctx.run("get", async {
            Ok(self.records.read().await.get(&map_key).cloned())
        })
        .await
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        record: Record,
        condition: Option<&Condition>,
    ) -> StoreResult<()> {
        let key = self.schema.key_of(&record)?;
        let map_key = self.map_key(&key)?;
        check_condition(condition)?;

        ctx.run("put", async {
            let mut records = self.records.write().await;
            if !holds(condition, records.get(&map_key)) {
                return Err(StoreError::ConditionFailed);
            }
            records.insert(map_key, record);
            Ok(())
        })
        .await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        key: &Key,
        changes: &Changes,
        condition: Option<&Condition>,
    ) -> StoreResult<Record> {
        let map_key = self.map_key(key)?;
        check_changes(&self.schema, changes)?;
        check_condition(condition)?;

        ctx.run("update", async {
            let mut records = self.records.write().await;
            let current = records.get_mut(&map_key);

            match current {
                None => match condition {
                    Some(condition) if !condition.evaluate(None) => {
                        Err(StoreError::ConditionFailed)
                    }
                    _ => Err(StoreError::NotFound(key.to_string())),
                },
                Some(record) => {
                    if !holds(condition, Some(&*record)) {
                        return Err(StoreError::ConditionFailed);
                    }
                    changes.apply(record);
                    Ok(record.clone())
                }
            }
        })
        .await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &Key,
        condition: Option<&Condition>,
    ) -> StoreResult<()> {
        let map_key = self.map_key(key)?;
        check_condition(condition)?;

        ctx.run("delete", async {
            let mut records = self.records.write().await;
            if !holds(condition, records.get(&map_key)) {
                return Err(StoreError::ConditionFailed);
            }
            records.remove(&map_key);
            Ok(())
        })
        .await
    }

    async fn query(
        &self,
        ctx: &RequestContext,
        request: &QueryRequest,
    ) -> StoreResult<Vec<Record>> {
        let (partition_attr, sort_attr) = match &request.index {
            Some(name) => {
                let index = self.schema.index(name)?;
                (index.partition_key.clone(), index.sort_key.clone())
            }
            None => (self.schema.partition_key.clone(), self.schema.sort_key.clone()),
        };
        if request.sort_value.is_some() && sort_attr.is_none() {
            return Err(StoreError::InvalidRequest(
                "Sort value given for an access path without a sort key".to_string(),
            ));
        }
        check_condition(request.filter.as_ref())?;

        ctx.run("query", async {
            let records = self.records.read().await;
            let partition = Value::String(request.partition_value.clone());

            let mut matches: Vec<(&MapKey, &Record)> = records
                .iter()
                .filter(|(_, record)| record.get(&partition_attr) == Some(&partition))
                .filter(|(_, record)| match (&request.sort_value, &sort_attr) {
                    (Some(value), Some(attr)) => record.get(attr) == Some(value),
                    _ => true,
                })
                .filter(|(_, record)| holds(request.filter.as_ref(), Some(*record)))
                .collect();

            matches.sort_by(|(a_key, a), (b_key, b)| {
                let by_sort = match &sort_attr {
                    Some(attr) => compare_values(a.get(attr), b.get(attr)),
                    None => std::cmp::Ordering::Equal,
                };
                by_sort.then_with(|| a_key.cmp(b_key))
            });
            if !request.ascending {
                matches.reverse();
            }

            let limit = request.limit.unwrap_or(usize::MAX);
            Ok(matches
                .into_iter()
                .take(limit)
                .map(|(_, record)| record.clone())
                .collect())
        })
        .await
    }

    async fn scan(
        &self,
        ctx: &RequestContext,
        filter: Option<&Condition>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Record>> {
        check_condition(filter)?;

        ctx.run("scan", async {
            let records = self.records.read().await;
            Ok(records
                .values()
                .filter(|record| holds(filter, Some(*record)))
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect())
        })
        .await
    }

    async fn batch_write(
        &self,
        ctx: &RequestContext,
        puts: Vec<Record>,
        deletes: Vec<Key>,
    ) -> StoreResult<BatchOutcome> {
        ctx.run("batch_write", async {
            let mut outcome = BatchOutcome::default();
            let mut records = self.records.write().await;

            for record in puts {
                match self.schema.key_of(&record).and_then(|key| self.map_key(&key)) {
                    Ok(map_key) => {
                        records.insert(map_key, record);
                        outcome.written += 1;
                    }
                    Err(err) => outcome.failures.push(BatchFailure::Put {
                        key: None,
                        reason: err.to_string(),
                    }),
                }
            }

            for key in deletes {
                match self.map_key(&key) {
                    Ok(map_key) => {
                        records.remove(&map_key);
                        outcome.deleted += 1;
                    }
                    Err(err) => outcome.failures.push(BatchFailure::Delete {
                        key,
                        reason: err.to_string(),
                    }),
                }
            }

            Ok(outcome)
        })
        .await
    }

    async fn purge_expired(&self, ctx: &RequestContext, now: DateTime<Utc>) -> StoreResult<usize> {
        let Some(ttl_attr) = self.schema.ttl_attribute.clone() else {
            return Ok(0);
        };
        let cutoff = now.timestamp();

        ctx.run("purge_expired", async {
            let mut records = self.records.write().await;
            let before = records.len();
            records.retain(|_, record| {
                record
                    .get(&ttl_attr)
                    .and_then(Value::as_i64)
                    .is_none_or(|expires| expires > cutoff)
            });
            Ok(before - records.len())
        })
        .await
    }

    async fn ping(&self, ctx: &RequestContext) -> StoreResult<()> {
        ctx.check("ping")
    }
}
