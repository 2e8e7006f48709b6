// file: src/models/mod.rs
// description: entity models, record conversion and timestamp encoding
// reference: internal module structure

pub mod classifier;
pub mod job;
pub mod page;
pub mod repository;
pub mod toc;

pub use classifier::PageClassifier;
pub use job::{
    Job, JobEnvelope, JobPriority, JobStatistics, JobStatus, JobType, JobUpdate, NewJob,
};
pub use page::{Importance, NewPage, Page, PageStatus, PageType, PageUpdate};
pub use repository::{NewRepository, Provider, Repository, RepositoryStatus, RepositoryUpdate};
pub use toc::{TableOfContents, TocEntry};

use crate::database::{Key, Record};
use crate::error::{Result, WikiError};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Current time at the precision records store.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Record representation of a timestamp: RFC 3339, UTC, fixed microseconds,
/// so string order in the store is chronological order.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Conversion between an entity and its raw store record.
pub trait StoredEntity: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn key(&self) -> Key;

    fn to_record(&self) -> Result<Record> {
        match serde_json::to_value(self)? {
            Value::Object(record) => Ok(record),
            other => Err(WikiError::Serialization(format!(
                "{} serialized to a non-object: {}",
                Self::KIND,
                other
            ))),
        }
    }

    fn from_record(record: Record) -> Result<Self> {
        serde_json::from_value(Value::Object(record)).map_err(|e| {
            WikiError::Serialization(format!("Undecodable {} record: {}", Self::KIND, e))
        })
    }
}

pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match at {
                Some(at) => super::serialize(at, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .map(|at| Some(at.with_timezone(&Utc)))
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
