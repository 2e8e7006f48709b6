// file: src/managers/job.rs
// description: job submission, state transitions and expiry over the conditional store
// reference: optimistic status guard on every job update

use crate::database::schema::REPO_STATUS_INDEX;
use crate::database::{BatchOutcome, Condition, ConditionalStore, Key, QueryRequest, RequestContext};
use crate::error::{Result, StoreError, WikiError};
use crate::managers::decode_all;
use crate::models::{Job, JobStatistics, JobStatus, JobUpdate, NewJob, StoredEntity, now};
use crate::utils::ids::generate_job_id;
use crate::utils::validation::Validator;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct JobManager {
    store: Arc<dyn ConditionalStore>,
    ttl: Duration,
    max_limit: usize,
}

impl JobManager {
    pub fn new(store: Arc<dyn ConditionalStore>, ttl: Duration, max_limit: usize) -> Self {
        Self {
            store,
            ttl,
            max_limit,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn store_error(err: StoreError, key: &str, operation: &str) -> WikiError {
        WikiError::from_store(err, Job::KIND, key, operation)
    }

    pub async fn create(&self, ctx: &RequestContext, request: NewJob) -> Result<Job> {
        let job = request.into_job(generate_job_id(), self.ttl)?;

        self.store
            .put(ctx, job.to_record()?, Some(&Condition::NotExists))
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed => {
                    WikiError::Duplicate(format!("Job id {} already exists", job.id))
                }
                other => Self::store_error(other, &job.id, "create"),
            })?;

        info!(
            id = %job.id,
            repository = %job.repository_id,
            job_type = %job.job_type,
            "Created job"
        );
        Ok(job)
    }

    pub async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Job> {
        let record = self
            .store
            .get(ctx, &Key::partition(id))
            .await
            .map_err(|err| Self::store_error(err, id, "get"))?;

        match record {
            Some(record) => Job::from_record(record),
            None => Err(WikiError::NotFound(format!("job {}", id))),
        }
    }

    /// Jobs of one repository, newest first, optionally narrowed to a status.
    pub async fn list_for_repository(
        &self,
        ctx: &RequestContext,
        repository_id: &str,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let limit = Validator::validate_limit(limit, self.max_limit)?;
        let mut jobs = self.all_for_repository(ctx, repository_id, status).await?;

        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Apply a consumer update. The write is conditioned on the status read
    /// beforehand, so a concurrent transition turns this call into a conflict.
    pub async fn update(&self, ctx: &RequestContext, id: &str, update: JobUpdate) -> Result<Job> {
        if let Some(progress) = update.progress {
            Validator::validate_progress(progress)?;
        }

        let current = self.get(ctx, id).await?;
        let changes = update.into_changes(&current, now())?;
        let guard = Condition::equals("status", current.status);

        let record = self
            .store
            .update(ctx, &Key::partition(id), &changes, Some(&guard))
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed => {
                    warn!(id, expected = %current.status, "Job changed concurrently");
                    WikiError::Conflict(format!(
                        "job {} is no longer {}",
                        id, current.status
                    ))
                }
                StoreError::NotFound(_) => WikiError::NotFound(format!("job {}", id)),
                other => Self::store_error(other, id, "update"),
            })?;

        let job = Job::from_record(record)?;
        debug!(id, status = %job.status, progress = job.progress, "Updated job");
        Ok(job)
    }

    /// Move a PENDING job to RUNNING under `executor`. Only one claimant wins.
    pub async fn claim(&self, ctx: &RequestContext, id: &str, executor: &str) -> Result<Job> {
        let current = self.get(ctx, id).await?;
        if current.status != JobStatus::Pending {
            return Err(WikiError::InvalidTransition {
                entity: Job::KIND,
                from: current.status.to_string(),
                to: JobStatus::Running.to_string(),
            });
        }

        let update = JobUpdate {
            status: Some(JobStatus::Running),
            executor: Some(executor.to_string()),
            ..JobUpdate::default()
        };
        self.update(ctx, id, update).await
    }

    pub async fn complete(
        &self,
        ctx: &RequestContext,
        id: &str,
        output_result: Option<Value>,
    ) -> Result<Job> {
        let update = JobUpdate {
            status: Some(JobStatus::Completed),
            output_result,
            ..JobUpdate::default()
        };
        self.update(ctx, id, update).await
    }

    pub async fn fail(&self, ctx: &RequestContext, id: &str, message: &str) -> Result<Job> {
        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            error_message: Some(message.to_string()),
            ..JobUpdate::default()
        };
        self.update(ctx, id, update).await
    }

    pub async fn cancel(&self, ctx: &RequestContext, id: &str) -> Result<Job> {
        self.update(ctx, id, JobUpdate::status(JobStatus::Cancelled))
            .await
    }

    /// Remove jobs past their expiry instant, whatever their status.
    pub async fn purge_expired(&self, ctx: &RequestContext, at: DateTime<Utc>) -> Result<usize> {
        let removed = self
            .store
            .purge_expired(ctx, at)
            .await
            .map_err(|err| Self::store_error(err, "*", "purge_expired"))?;

        if removed > 0 {
            info!(removed, "Purged expired jobs");
        }
        Ok(removed)
    }

    pub async fn statistics(
        &self,
        ctx: &RequestContext,
        repository_id: Option<&str>,
    ) -> Result<JobStatistics> {
        let jobs = match repository_id {
            Some(repository_id) => self.all_for_repository(ctx, repository_id, None).await?,
            None => {
                let records = self
                    .store
                    .scan(ctx, None, None)
                    .await
                    .map_err(|err| Self::store_error(err, "*", "statistics"))?;
                decode_all(records)?
            }
        };
        Ok(JobStatistics::from_jobs(&jobs))
    }

    /// Batch-remove every job of a repository. Entries fail independently.
    pub async fn delete_all_for_repository(
        &self,
        ctx: &RequestContext,
        repository_id: &str,
    ) -> Result<BatchOutcome> {
        let keys = self
            .all_for_repository(ctx, repository_id, None)
            .await?
            .iter()
            .map(StoredEntity::key)
            .collect();

        self.store
            .batch_write(ctx, Vec::new(), keys)
            .await
            .map_err(|err| Self::store_error(err, repository_id, "delete_all_for_repository"))
    }

    async fn all_for_repository(
        &self,
        ctx: &RequestContext,
        repository_id: &str,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>> {
        let mut request = QueryRequest::new(repository_id).on_index(REPO_STATUS_INDEX);
        if let Some(status) = status {
            request = request.sort_equals(status);
        }

        let records = self
            .store
            .query(ctx, &request)
            .await
            .map_err(|err| Self::store_error(err, repository_id, "list_for_repository"))?;
        decode_all(records)
    }
}
