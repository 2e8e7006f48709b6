// file: src/pipeline/orchestrator.rs
// description: coordinates repository, job and page lifecycles across the managers
// reference: job submission, execution reporting and cascade cleanup

use crate::config::Config;
use crate::database::{BatchOutcome, RequestContext, StoreSet};
use crate::error::{Result, WikiError};
use crate::managers::{JobManager, PageManager, RepositoryManager};
use crate::models::{
    Job, JobPriority, JobStatus, JobUpdate, NewJob, NewPage, NewRepository, Page, Repository,
    RepositoryStatus, TableOfContents, now,
};
use crate::pipeline::dispatch::JobPublisher;
use crate::utils::telemetry::{HealthReport, OperationTimer};
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of a repository delete, including the owned records removed with it.
#[derive(Debug, Default)]
pub struct RepositoryDeletion {
    pub deleted: bool,
    pub pages: BatchOutcome,
    pub jobs: BatchOutcome,
}

impl RepositoryDeletion {
    pub fn is_complete(&self) -> bool {
        self.pages.is_complete() && self.jobs.is_complete()
    }
}

pub struct WikiService {
    config: Config,
    stores: StoreSet,
    repositories: RepositoryManager,
    jobs: JobManager,
    pages: PageManager,
    publisher: Arc<dyn JobPublisher>,
}

impl WikiService {
    pub fn new(config: Config, stores: StoreSet, publisher: Arc<dyn JobPublisher>) -> Self {
        let max_limit = config.listing.max_limit;
        let ttl = Duration::days(config.jobs.ttl_days);

        Self {
            repositories: RepositoryManager::new(stores.repos.clone(), max_limit),
            jobs: JobManager::new(stores.jobs.clone(), ttl, max_limit),
            pages: PageManager::new(stores.pages.clone(), max_limit),
            config,
            stores,
            publisher,
        }
    }

    pub async fn open(config: Config, publisher: Arc<dyn JobPublisher>) -> Result<Self> {
        let stores = StoreSet::open(&config.storage)
            .await
            .map_err(|e| WikiError::Connection(e.to_string()))?;
        Ok(Self::new(config, stores, publisher))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    pub fn repositories(&self) -> &RepositoryManager {
        &self.repositories
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn pages(&self) -> &PageManager {
        &self.pages
    }

    /// Request context carrying the configured per-request timeout.
    pub fn context(&self) -> RequestContext {
        match self.config.storage.request_timeout_secs {
            Some(secs) => RequestContext::with_timeout(std::time::Duration::from_secs(secs)),
            None => RequestContext::new(),
        }
    }

    /// Priority applied when a submission does not name one. An unparsable
    /// configured value is a configuration error, never a silent NORMAL.
    pub fn default_priority(&self) -> Result<JobPriority> {
        self.config.jobs.priority()
    }

    pub async fn register_repository(
        &self,
        ctx: &RequestContext,
        request: NewRepository,
    ) -> Result<Repository> {
        self.repositories.create(ctx, request).await
    }

    /// Persist a PENDING job for a live repository and hand its envelope to
    /// the queue. A job that cannot be queued is cancelled so it does not
    /// linger as PENDING.
    pub async fn submit_job(&self, ctx: &RequestContext, request: NewJob) -> Result<Job> {
        self.repositories.get(ctx, &request.repository_id).await?;
        let job = self.jobs.create(ctx, request).await?;

        if let Err(err) = self.publisher.publish(&job.to_envelope()).await {
            error!(job = %job.id, "Failed to queue job: {}", err);
            if let Err(cancel_err) = self.jobs.cancel(ctx, &job.id).await {
                warn!(job = %job.id, "Could not cancel unqueued job: {}", cancel_err);
            }
            return Err(WikiError::Queue(format!("job {} was not queued: {}", job.id, err)));
        }

        info!(job = %job.id, repository = %job.repository_id, "Submitted job");
        Ok(job)
    }

    /// Claim a job for an executor and mark its repository as parsing.
    pub async fn start_job(&self, ctx: &RequestContext, job_id: &str, executor: &str) -> Result<Job> {
        let job = self.jobs.claim(ctx, job_id, executor).await?;
        self.move_repository(ctx, &job.repository_id, RepositoryStatus::Parsing, None)
            .await?;
        Ok(job)
    }

    pub async fn report_progress(
        &self,
        ctx: &RequestContext,
        job_id: &str,
        progress: i64,
        processed_files: Option<u64>,
        total_files: Option<u64>,
    ) -> Result<Job> {
        let update = JobUpdate {
            progress: Some(progress),
            processed_files,
            total_files,
            ..JobUpdate::default()
        };
        self.jobs.update(ctx, job_id, update).await
    }

    pub async fn complete_job(
        &self,
        ctx: &RequestContext,
        job_id: &str,
        output_result: Option<Value>,
        scan_sha: Option<&str>,
    ) -> Result<Job> {
        let job = self.jobs.complete(ctx, job_id, output_result).await?;
        self.move_repository(ctx, &job.repository_id, RepositoryStatus::Ready, scan_sha)
            .await?;
        Ok(job)
    }

    pub async fn fail_job(&self, ctx: &RequestContext, job_id: &str, message: &str) -> Result<Job> {
        let job = self.jobs.fail(ctx, job_id, message).await?;
        self.move_repository(ctx, &job.repository_id, RepositoryStatus::Failed, None)
            .await?;
        Ok(job)
    }

    /// Cancel a job. Cancelling a running job returns its repository to READY.
    pub async fn cancel_job(&self, ctx: &RequestContext, job_id: &str) -> Result<Job> {
        let was_running = self.jobs.get(ctx, job_id).await?.status == JobStatus::Running;
        let job = self.jobs.cancel(ctx, job_id).await?;
        if was_running {
            self.move_repository(ctx, &job.repository_id, RepositoryStatus::Ready, None)
                .await?;
        }
        Ok(job)
    }

    pub async fn add_page(&self, ctx: &RequestContext, request: NewPage) -> Result<Page> {
        self.repositories.get(ctx, &request.repository_id).await?;
        self.pages.create(ctx, request).await
    }

    pub async fn table_of_contents(
        &self,
        ctx: &RequestContext,
        repository_id: &str,
    ) -> Result<TableOfContents> {
        let repository = self.repositories.get(ctx, repository_id).await?;
        let toc = self.pages.table_of_contents(ctx, repository_id).await?;
        Ok(toc.with_repository(&repository))
    }

    /// Logical delete only flags the repository; its jobs and pages stay.
    /// Physical delete removes pages and jobs first, then the repository.
    pub async fn delete_repository(
        &self,
        ctx: &RequestContext,
        repository_id: &str,
        physical: bool,
    ) -> Result<RepositoryDeletion> {
        if !physical {
            let deleted = self.repositories.delete(ctx, repository_id, false).await?;
            return Ok(RepositoryDeletion {
                deleted,
                ..RepositoryDeletion::default()
            });
        }

        let timer = OperationTimer::new(&format!("purge repository {}", repository_id));
        let (pages, jobs) = futures::try_join!(
            self.pages.delete_all_for_repository(ctx, repository_id),
            self.jobs.delete_all_for_repository(ctx, repository_id),
        )?;

        let outcome = RepositoryDeletion {
            deleted: false,
            pages,
            jobs,
        };
        if !outcome.is_complete() {
            warn!(
                repository = repository_id,
                page_failures = outcome.pages.failures.len(),
                job_failures = outcome.jobs.failures.len(),
                "Owned records left behind; repository kept"
            );
            timer.finish_with_count(outcome.pages.deleted + outcome.jobs.deleted);
            return Ok(outcome);
        }

        let deleted = self.repositories.delete(ctx, repository_id, true).await?;
        timer.finish_with_count(outcome.pages.deleted + outcome.jobs.deleted + usize::from(deleted));
        Ok(RepositoryDeletion { deleted, ..outcome })
    }

    pub async fn purge_expired_jobs(&self, ctx: &RequestContext) -> Result<usize> {
        let timer = OperationTimer::new("purge expired jobs");
        let removed = self.jobs.purge_expired(ctx, now()).await?;
        timer.finish_with_count(removed);
        Ok(removed)
    }

    pub async fn health(&self, ctx: &RequestContext) -> HealthReport {
        let checks = self.stores.ping_all(ctx).await;
        HealthReport::new(checks, env!("CARGO_PKG_VERSION").to_string())
    }

    /// Move a repository along its state machine. A repository already in the
    /// target state only has its scan reference refreshed.
    async fn move_repository(
        &self,
        ctx: &RequestContext,
        repository_id: &str,
        target: RepositoryStatus,
        scan_sha: Option<&str>,
    ) -> Result<()> {
        let current = match self.repositories.get(ctx, repository_id).await {
            Ok(repo) => repo,
            Err(err) if err.is_not_found() => {
                warn!(repository = repository_id, "Job refers to a missing repository");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if current.status == target {
            self.repositories
                .set_status(ctx, repository_id, target, scan_sha)
                .await?;
            return Ok(());
        }

        match self
            .repositories
            .transition(ctx, repository_id, current.status, target, scan_sha)
            .await
        {
            Ok(_) => Ok(()),
            Err(WikiError::InvalidTransition { from, to, .. }) => {
                warn!(repository = repository_id, %from, %to, "Repository status not moved");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Importance, JobType, PageType, Provider};
    use crate::pipeline::dispatch::{ChannelPublisher, JobReceiver};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn service() -> (WikiService, JobReceiver) {
        let config = Config::ephemeral();
        let stores = StoreSet::in_memory(&config.storage.table_prefix());
        let (publisher, receiver) = ChannelPublisher::channel(16);
        (WikiService::new(config, stores, Arc::new(publisher)), receiver)
    }

    async fn widgets(service: &WikiService, ctx: &RequestContext) -> Repository {
        service
            .register_repository(
                ctx,
                NewRepository::new(Provider::Github, "https://github.com/acme/widgets", "Widgets"),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_twice_is_duplicate() {
        let (service, _rx) = service();
        let ctx = service.context();
        let repo = widgets(&service, &ctx).await;
        assert_eq!(repo.status, RepositoryStatus::Ready);

        let again = service
            .register_repository(
                &ctx,
                NewRepository::new(Provider::Github, "https://github.com/acme/widgets", "Other")
                    .with_branch("develop"),
            )
            .await;
        assert!(matches!(again, Err(WikiError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_job_lifecycle_moves_repository() {
        let (service, mut rx) = service();
        let ctx = service.context();
        let repo = widgets(&service, &ctx).await;

        let job = service
            .submit_job(&ctx, NewJob::new(&repo.id, JobType::FullParse))
            .await
            .unwrap();
        let envelope = rx.try_recv().unwrap().unwrap();
        assert_eq!(envelope.job_id, job.id);
        assert_eq!(envelope.repo_id, repo.id);

        service.start_job(&ctx, &job.id, "worker-1").await.unwrap();
        let parsing = service.repositories().get(&ctx, &repo.id).await.unwrap();
        assert_eq!(parsing.status, RepositoryStatus::Parsing);

        let progressed = service
            .report_progress(&ctx, &job.id, 45, Some(9), Some(20))
            .await
            .unwrap();
        assert_eq!(progressed.progress, 45);
        assert_eq!(progressed.total_files, 20);

        service
            .complete_job(&ctx, &job.id, None, Some("abc123"))
            .await
            .unwrap();
        let ready = service.repositories().get(&ctx, &repo.id).await.unwrap();
        assert_eq!(ready.status, RepositoryStatus::Ready);
        assert_eq!(ready.last_scan_sha.as_deref(), Some("abc123"));
        assert!(ready.last_scan_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_job_marks_repository_failed() {
        let (service, _rx) = service();
        let ctx = service.context();
        let repo = widgets(&service, &ctx).await;
        let job = service
            .submit_job(&ctx, NewJob::new(&repo.id, JobType::IncrementalParse))
            .await
            .unwrap();
        service.start_job(&ctx, &job.id, "worker-1").await.unwrap();

        let failed = service.fail_job(&ctx, &job.id, "clone failed").await.unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("clone failed"));
        let repo = service.repositories().get(&ctx, &repo.id).await.unwrap();
        assert_eq!(repo.status, RepositoryStatus::Failed);
    }

    #[tokio::test]
    async fn test_submit_requires_live_repository() {
        let (service, _rx) = service();
        let ctx = service.context();
        let result = service
            .submit_job(&ctx, NewJob::new("repo-missing", JobType::FullParse))
            .await;
        assert!(result.unwrap_err().is_not_found());
    }

    struct ClosedQueue;

    #[async_trait]
    impl JobPublisher for ClosedQueue {
        async fn publish(&self, _envelope: &crate::models::JobEnvelope) -> Result<()> {
            Err(WikiError::Queue("closed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_unqueued_job_is_cancelled() {
        let config = Config::ephemeral();
        let stores = StoreSet::in_memory(&config.storage.table_prefix());
        let service = WikiService::new(config, stores, Arc::new(ClosedQueue));
        let ctx = service.context();
        let repo = widgets(&service, &ctx).await;

        let result = service
            .submit_job(&ctx, NewJob::new(&repo.id, JobType::FullParse))
            .await;
        assert!(matches!(result, Err(WikiError::Queue(_))));

        let jobs = service
            .jobs()
            .list_for_repository(&ctx, &repo.id, None, 10)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_readme_page_and_toc() {
        let (service, _rx) = service();
        let ctx = service.context();
        let repo = widgets(&service, &ctx).await;
        let page = service
            .add_page(&ctx, NewPage::new(&repo.id, "README.md", "Widgets", "# Widgets"))
            .await
            .unwrap();
        assert_eq!(page.page_type, PageType::Readme);
        assert_eq!(page.importance, Importance::High);

        let toc = service.table_of_contents(&ctx, &repo.id).await.unwrap();
        assert_eq!(toc.page_count(), 1);
        assert_eq!(toc.repository_id, repo.id);
        assert_eq!(toc.repository_name, "Widgets");
        assert_eq!(toc.total_pages, 1);
        assert_eq!(toc.last_updated, Some(page.updated_at));

        let orphan = service
            .add_page(&ctx, NewPage::new("repo-missing", "README.md", "X", ""))
            .await;
        assert!(orphan.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_toc_of_empty_repository() {
        let (service, _rx) = service();
        let ctx = service.context();
        let repo = widgets(&service, &ctx).await;

        let toc = service.table_of_contents(&ctx, &repo.id).await.unwrap();
        assert_eq!(toc.repository_name, "Widgets");
        assert_eq!(toc.total_pages, 0);
        assert_eq!(toc.last_updated, None);
        assert!(toc.roots.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_default_priority_is_reported() {
        let mut config = Config::ephemeral();
        config.jobs.default_priority = "URGENT".to_string();
        let stores = StoreSet::in_memory(&config.storage.table_prefix());
        let (publisher, _rx) = ChannelPublisher::channel(1);
        let service = WikiService::new(config, stores, Arc::new(publisher));
        assert!(matches!(service.default_priority(), Err(WikiError::Config(_))));
    }

    #[tokio::test]
    async fn test_logical_then_physical_delete() {
        let (service, _rx) = service();
        let ctx = service.context();
        let repo = widgets(&service, &ctx).await;
        service
            .add_page(&ctx, NewPage::new(&repo.id, "src/lib.rs", "Library", ""))
            .await
            .unwrap();
        service
            .submit_job(&ctx, NewJob::new(&repo.id, JobType::FullParse))
            .await
            .unwrap();

        let logical = service.delete_repository(&ctx, &repo.id, false).await.unwrap();
        assert!(logical.deleted);
        assert!(service.repositories().get(&ctx, &repo.id).await.unwrap_err().is_not_found());
        assert_eq!(service.pages().list_all(&ctx, &repo.id).await.unwrap().len(), 1);

        let physical = service.delete_repository(&ctx, &repo.id, true).await.unwrap();
        assert!(physical.deleted);
        assert!(physical.is_complete());
        assert_eq!(physical.pages.deleted, 1);
        assert_eq!(physical.jobs.deleted, 1);
        assert!(service.pages().list_all(&ctx, &repo.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_every_table() {
        let (service, _rx) = service();
        let report = service.health(&service.context()).await;
        assert_eq!(report.checks.len(), 3);
        assert!(report.is_healthy());
    }
}
