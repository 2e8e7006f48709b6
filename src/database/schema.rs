// file: src/database/schema.rs
// description: Table layouts for the repository, job and page tables
// reference: one logical table per entity kind with named secondary indexes

use crate::database::condition::{Key, Record};
use crate::error::{StoreError, StoreResult};
use serde_json::Value;

pub const REPOS_TABLE: &str = "repos";
pub const JOBS_TABLE: &str = "jobs";
pub const PAGES_TABLE: &str = "pages";

pub const STATUS_INDEX: &str = "status-index";
pub const REPO_STATUS_INDEX: &str = "repo-status-index";

/// Named alternate access path: partition attribute plus optional sort attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl IndexSchema {
    pub fn new(name: &str, partition_key: &str, sort_key: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            partition_key: partition_key.to_string(),
            sort_key: sort_key.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
    pub indexes: Vec<IndexSchema>,
    pub ttl_attribute: Option<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, partition_key: &str) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.to_string(),
            sort_key: None,
            indexes: Vec::new(),
            ttl_attribute: None,
        }
    }

    pub fn with_sort_key(mut self, sort_key: &str) -> Self {
        self.sort_key = Some(sort_key.to_string());
        self
    }

    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_ttl(mut self, attribute: &str) -> Self {
        self.ttl_attribute = Some(attribute.to_string());
        self
    }

    /// Repositories: keyed by `repo_id`, listed by status ordered by update time.
    pub fn repositories(prefix: &str) -> Self {
        Self::new(table_name(prefix, REPOS_TABLE), "repo_id").with_index(IndexSchema::new(
            STATUS_INDEX,
            "status",
            Some("updated_at"),
        ))
    }

    /// Jobs: keyed by `job_id`, listed per repository and status, expiring on `ttl`.
    pub fn jobs(prefix: &str) -> Self {
        Self::new(table_name(prefix, JOBS_TABLE), "job_id")
            .with_index(IndexSchema::new(REPO_STATUS_INDEX, "repo_id", Some("status")))
            .with_ttl("ttl")
    }

    /// Pages: composite key of owning repository and derived page id.
    pub fn pages(prefix: &str) -> Self {
        Self::new(table_name(prefix, PAGES_TABLE), "repo_id").with_sort_key("page_id")
    }

    pub fn index(&self, name: &str) -> StoreResult<&IndexSchema> {
        self.indexes
            .iter()
            .find(|index| index.name == name)
            .ok_or_else(|| {
                StoreError::InvalidRequest(format!("Unknown index {} on {}", name, self.name))
            })
    }

    pub fn is_key_attribute(&self, attribute: &str) -> bool {
        attribute == self.partition_key || self.sort_key.as_deref() == Some(attribute)
    }

    /// Extract the primary key from a record, rejecting records that lack it.
    pub fn key_of(&self, record: &Record) -> StoreResult<Key> {
        let partition = key_component(record, &self.partition_key)?;
        let sort = match &self.sort_key {
            Some(attribute) => Some(key_component(record, attribute)?),
            None => None,
        };
        Ok(Key { partition, sort })
    }

    /// Check that a key has exactly the components this table expects.
    pub fn check_key(&self, key: &Key) -> StoreResult<()> {
        match (&self.sort_key, &key.sort) {
            (Some(_), None) => Err(StoreError::InvalidRequest(format!(
                "Table {} requires a sort key",
                self.name
            ))),
            (None, Some(_)) => Err(StoreError::InvalidRequest(format!(
                "Table {} has no sort key",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

pub fn table_name(prefix: &str, kind: &str) -> String {
    format!("{}-{}", prefix, kind)
}

fn key_component(record: &Record, attribute: &str) -> StoreResult<String> {
    match record.get(attribute) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        Some(_) => Err(StoreError::InvalidRequest(format!(
            "Key attribute {} must be a non-empty string",
            attribute
        ))),
        None => Err(StoreError::InvalidRequest(format!(
            "Record is missing key attribute {}",
            attribute
        ))),
    }
}
