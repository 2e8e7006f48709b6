// file: src/managers/repository.rs
// description: repository lifecycle over the conditional store
// reference: uniqueness check plus conditional put, soft delete, index-backed listing

use crate::database::schema::STATUS_INDEX;
use crate::database::{Changes, Condition, ConditionalStore, Key, QueryRequest, RequestContext};
use crate::error::{Result, StoreError, WikiError};
use crate::managers::decode_all;
use crate::models::{
    NewRepository, Provider, Repository, RepositoryStatus, RepositoryUpdate, StoredEntity, now,
    timestamp_value,
};
use crate::utils::ids::generate_repository_id;
use crate::utils::validation::Validator;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records without the flag, or with it set to anything but `true`.
fn not_deleted() -> Condition {
    Condition::not_equals("deleted", true)
}

fn live_record() -> Condition {
    Condition::Exists.and(not_deleted())
}

fn newest_first(repos: &mut [Repository]) {
    repos.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub struct RepositoryManager {
    store: Arc<dyn ConditionalStore>,
    max_limit: usize,
}

impl RepositoryManager {
    pub fn new(store: Arc<dyn ConditionalStore>, max_limit: usize) -> Self {
        Self { store, max_limit }
    }

    fn store_error(err: StoreError, key: &str, operation: &str) -> WikiError {
        WikiError::from_store(err, Repository::KIND, key, operation)
    }

    /// Register a repository. The URL check is a scan and is not atomic with
    /// the write; the conditional put only guards the generated id.
    pub async fn create(&self, ctx: &RequestContext, request: NewRepository) -> Result<Repository> {
        let repo = request.into_repository(generate_repository_id())?;

        if let Some(existing) = self.find_by_url(ctx, &repo.remote_url).await? {
            warn!(
                url = %repo.remote_url,
                existing = %existing.id,
                "Repository URL already registered"
            );
            return Err(WikiError::Duplicate(format!(
                "Repository with URL {} already exists ({})",
                repo.remote_url, existing.id
            )));
        }

        self.store
            .put(ctx, repo.to_record()?, Some(&Condition::NotExists))
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed => {
                    WikiError::Duplicate(format!("Repository id {} already exists", repo.id))
                }
                other => Self::store_error(other, &repo.id, "create"),
            })?;

        info!(id = %repo.id, url = %repo.remote_url, "Registered repository");
        Ok(repo)
    }

    /// Point lookup that hides soft-deleted repositories.
    pub async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Repository> {
        let record = self
            .store
            .get(ctx, &Key::partition(id))
            .await
            .map_err(|err| Self::store_error(err, id, "get"))?;

        match record.map(Repository::from_record).transpose()? {
            Some(repo) if !repo.deleted => Ok(repo),
            _ => Err(WikiError::NotFound(format!("repository {}", id))),
        }
    }

    /// Newest first. With a status this reads the status index; without one it
    /// scans the table and sorts client-side.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        status: Option<RepositoryStatus>,
        limit: usize,
    ) -> Result<Vec<Repository>> {
        let limit = Validator::validate_limit(limit, self.max_limit)?;

        match status {
            Some(status) => {
                let request = QueryRequest::new(status.as_str())
                    .on_index(STATUS_INDEX)
                    .descending()
                    .filter(not_deleted())
                    .limit(limit);
                let records = self
                    .store
                    .query(ctx, &request)
                    .await
                    .map_err(|err| Self::store_error(err, status.as_str(), "list"))?;
                decode_all(records)
            }
            None => {
                let mut repos = self.all_live(ctx, "list").await?;
                newest_first(&mut repos);
                repos.truncate(limit);
                Ok(repos)
            }
        }
    }

    /// Partial update of the editable fields. Absent or soft-deleted
    /// repositories are reported as not found and left untouched.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        update: RepositoryUpdate,
    ) -> Result<Repository> {
        if update.is_empty() {
            return Err(WikiError::Validation("Repository update has no changes".to_string()));
        }
        let changes = update.into_changes()?;
        self.apply(ctx, id, changes, live_record(), "update").await
    }

    /// Logical delete sets the flag; physical delete removes the record.
    /// Returns false when there was nothing to delete.
    pub async fn delete(&self, ctx: &RequestContext, id: &str, physical: bool) -> Result<bool> {
        let outcome = if physical {
            self.store
                .delete(ctx, &Key::partition(id), Some(&Condition::Exists))
                .await
                .map(|_| ())
        } else {
            let changes = Changes::new()
                .set("deleted", true)
                .set("updated_at", timestamp_value(now()));
            self.store
                .update(ctx, &Key::partition(id), &changes, Some(&live_record()))
                .await
                .map(|_| ())
        };

        match outcome {
            Ok(()) => {
                info!(id, physical, "Deleted repository");
                Ok(true)
            }
            Err(StoreError::ConditionFailed) | Err(StoreError::NotFound(_)) => {
                debug!(id, physical, "Repository already absent");
                Ok(false)
            }
            Err(err) => Err(Self::store_error(err, id, "delete")),
        }
    }

    /// Set the status, stamping the scan reference and time when one is given.
    /// Returns false when the repository does not exist.
    pub async fn set_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: RepositoryStatus,
        last_scan_sha: Option<&str>,
    ) -> Result<bool> {
        let mut changes = Changes::new().set("status", status);
        if let Some(sha) = last_scan_sha {
            changes.insert("last_scan_sha", sha);
            changes.insert("last_scan_at", timestamp_value(now()));
        }

        match self.apply(ctx, id, changes, live_record(), "set_status").await {
            Ok(_) => Ok(true),
            Err(WikiError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Guarded status change: the write only lands if the stored status is
    /// still `from`.
    pub async fn transition(
        &self,
        ctx: &RequestContext,
        id: &str,
        from: RepositoryStatus,
        to: RepositoryStatus,
        last_scan_sha: Option<&str>,
    ) -> Result<Repository> {
        if !from.can_transition_to(to) {
            return Err(WikiError::InvalidTransition {
                entity: Repository::KIND,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut changes = Changes::new().set("status", to);
        if let Some(sha) = last_scan_sha {
            changes.insert("last_scan_sha", sha);
            changes.insert("last_scan_at", timestamp_value(now()));
        }
        let guard = live_record().and(Condition::equals("status", from));

        match self.apply(ctx, id, changes, guard, "transition").await {
            Err(WikiError::NotFound(_)) => {
                // Either gone or the status moved underneath us.
                let current = self.get(ctx, id).await?;
                Err(WikiError::InvalidTransition {
                    entity: Repository::KIND,
                    from: current.status.to_string(),
                    to: to.to_string(),
                })
            }
            other => other,
        }
    }

    /// First non-deleted repository with this URL. Full scan.
    pub async fn find_by_url(&self, ctx: &RequestContext, url: &str) -> Result<Option<Repository>> {
        let filter = Condition::equals("remote_url", url).and(not_deleted());
        let records = self
            .store
            .scan(ctx, Some(&filter), Some(1))
            .await
            .map_err(|err| Self::store_error(err, url, "find_by_url"))?;

        records
            .into_iter()
            .next()
            .map(Repository::from_record)
            .transpose()
    }

    pub async fn count_by_provider(&self, ctx: &RequestContext) -> Result<BTreeMap<Provider, usize>> {
        let mut counts: BTreeMap<Provider, usize> =
            Provider::ALL.into_iter().map(|p| (p, 0)).collect();
        for repo in self.all_live(ctx, "count_by_provider").await? {
            *counts.entry(repo.provider).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// One index query per status value.
    pub async fn count_by_status(
        &self,
        ctx: &RequestContext,
    ) -> Result<BTreeMap<RepositoryStatus, usize>> {
        let mut counts = BTreeMap::new();
        for status in RepositoryStatus::ALL {
            let request = QueryRequest::new(status.as_str())
                .on_index(STATUS_INDEX)
                .filter(not_deleted());
            let records = self
                .store
                .query(ctx, &request)
                .await
                .map_err(|err| Self::store_error(err, status.as_str(), "count_by_status"))?;
            counts.insert(status, records.len());
        }
        Ok(counts)
    }

    pub async fn recently_updated(&self, ctx: &RequestContext, count: usize) -> Result<Vec<Repository>> {
        let count = Validator::validate_limit(count, self.max_limit)?;
        let mut repos = self.all_live(ctx, "recently_updated").await?;
        newest_first(&mut repos);
        repos.truncate(count);
        Ok(repos)
    }

    async fn all_live(&self, ctx: &RequestContext, operation: &str) -> Result<Vec<Repository>> {
        let records = self
            .store
            .scan(ctx, Some(&not_deleted()), None)
            .await
            .map_err(|err| Self::store_error(err, "*", operation))?;
        decode_all(records)
    }

    async fn apply(
        &self,
        ctx: &RequestContext,
        id: &str,
        mut changes: Changes,
        condition: Condition,
        operation: &str,
    ) -> Result<Repository> {
        changes.insert("updated_at", timestamp_value(now()));

        let record = self
            .store
            .update(ctx, &Key::partition(id), &changes, Some(&condition))
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed | StoreError::NotFound(_) => {
                    WikiError::NotFound(format!("repository {}", id))
                }
                other => Self::store_error(other, id, operation),
            })?;

        debug!(id, operation, "Updated repository");
        Repository::from_record(record)
    }
}
