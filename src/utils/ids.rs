// file: src/utils/ids.rs
// description: entity identifier generation and page id derivation
// reference: https://docs.rs/uuid and https://docs.rs/sha2

use sha2::{Digest, Sha256};
use uuid::Uuid;

fn short_uuid(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_string()
}

/// `repo-` followed by 8 hex characters.
pub fn generate_repository_id() -> String {
    format!("repo-{}", short_uuid(8))
}

/// `job-` followed by 12 hex characters.
pub fn generate_job_id() -> String {
    format!("job-{}", short_uuid(12))
}

/// Hex SHA-256 of the input.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic page id for a source path within a repository.
///
/// Only the first 8 hex characters of the digest are kept, so two paths in
/// the same repository can collide; page creation checks for that.
pub fn derive_page_id(repository_id: &str, source_path: &str) -> String {
    format!("page-{}-{}", repository_id, &sha256_hex(source_path)[..8])
}
