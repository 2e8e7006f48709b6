// file: src/error.rs
// description: Store and domain error types with result type aliases
// reference: https://docs.rs/thiserror

use thiserror::Error;
use tracing::{error, warn};

pub type Result<T> = std::result::Result<T, WikiError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures surfaced by a conditional store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Condition check failed")]
    ConditionFailed,

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store call interrupted: {0}")]
    Interrupted(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Invalid store request: {0}")]
    InvalidRequest(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::ConnectionFailure(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum WikiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend unavailable: {0}")]
    Connection(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Request interrupted: {0}")]
    Interrupted(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for WikiError {
    fn from(err: serde_json::Error) -> Self {
        WikiError::Serialization(err.to_string())
    }
}

impl WikiError {
    /// Translate a store failure into a domain error, logging the entity kind,
    /// key and operation so the failure can be diagnosed from the logs alone.
    ///
    /// Managers handle `ConditionFailed` themselves where it carries a specific
    /// meaning; anything that reaches this point is reported as a conflict.
    pub fn from_store(err: StoreError, entity: &str, key: &str, operation: &str) -> Self {
        match err {
            StoreError::ConnectionFailure(message) => {
                error!(entity, key, operation, "Store connection failure: {}", message);
                WikiError::Connection(message)
            }
            StoreError::ConditionFailed => {
                warn!(entity, key, operation, "Precondition not met");
                WikiError::Conflict(format!("{} {}: precondition not met", entity, key))
            }
            StoreError::NotFound(_) => WikiError::NotFound(format!("{} {}", entity, key)),
            StoreError::Interrupted(message) => {
                warn!(entity, key, operation, "Store call interrupted: {}", message);
                WikiError::Interrupted(message)
            }
            StoreError::Corrupt(message) => {
                error!(entity, key, operation, "Corrupt record: {}", message);
                WikiError::Serialization(message)
            }
            StoreError::InvalidRequest(message) => {
                error!(entity, key, operation, "Invalid store request: {}", message);
                WikiError::Validation(message)
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WikiError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_failure_maps_to_conflict() {
        let err = WikiError::from_store(StoreError::ConditionFailed, "job", "job-1", "update");
        assert!(matches!(err, WikiError::Conflict(_)));
    }

    #[test]
    fn test_connection_failure_is_preserved() {
        let err = WikiError::from_store(
            StoreError::ConnectionFailure("refused".to_string()),
            "repository",
            "repo-1",
            "get",
        );
        assert!(matches!(err, WikiError::Connection(ref m) if m == "refused"));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_transition_message() {
        let err = WikiError::InvalidTransition {
            entity: "job",
            from: "COMPLETED".to_string(),
            to: "RUNNING".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid job transition: COMPLETED -> RUNNING");
    }
}
