// file: src/models/job.rs
// description: analysis job entity, state machine and dispatch envelope
// reference: https://docs.rs/chrono/latest/chrono/serde/ts_seconds

use crate::database::{Changes, Key, Record};
use crate::error::{Result, WikiError};
use crate::models::{StoredEntity, now, timestamp, timestamp_value};
use crate::utils::validation::Validator;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    FullParse,
    IncrementalParse,
    WebhookProcess,
    Cleanup,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::FullParse => "FULL_PARSE",
            JobType::IncrementalParse => "INCREMENTAL_PARSE",
            JobType::WebhookProcess => "WEBHOOK_PROCESS",
            JobType::Cleanup => "CLEANUP",
        }
    }
}

impl FromStr for JobType {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "FULL_PARSE" => Ok(JobType::FullParse),
            "INCREMENTAL_PARSE" => Ok(JobType::IncrementalParse),
            "WEBHOOK_PROCESS" => Ok(JobType::WebhookProcess),
            "CLEANUP" => Ok(JobType::Cleanup),
            other => Err(WikiError::Validation(format!("Unknown job type: {}", other))),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl FromStr for JobStatus {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| WikiError::Validation(format!("Unknown job status: {}", s)))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobStatus> for Value {
    fn from(status: JobStatus) -> Self {
        Value::String(status.as_str().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl FromStr for JobPriority {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HIGH" => Ok(JobPriority::High),
            "NORMAL" => Ok(JobPriority::Normal),
            "LOW" => Ok(JobPriority::Low),
            other => Err(WikiError::Validation(format!("Unknown priority: {}", other))),
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobPriority::High => "HIGH",
            JobPriority::Normal => "NORMAL",
            JobPriority::Low => "LOW",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: String,
    #[serde(rename = "repo_id")]
    pub repository_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: JobPriority,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Whole epoch seconds under `ttl`, the attribute the store expires on.
    #[serde(rename = "ttl", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub processed_files: u64,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub input_params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_result: Option<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Job {
    /// Time spent running: completion minus start, or now minus start while running.
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(self.completed_at.unwrap_or_else(now) - started)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_successful(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.expires_at <= at
    }

    pub fn to_envelope(&self) -> JobEnvelope {
        JobEnvelope {
            job_id: self.id.clone(),
            repo_id: self.repository_id.clone(),
            job_type: self.job_type,
            priority: self.priority,
            input_params: self.input_params.clone(),
            created_at: self.created_at,
        }
    }

    /// Rebuild a PENDING job from an envelope. Runtime state is not carried
    /// by the envelope; callers that need it read the job by id.
    pub fn from_envelope(envelope: JobEnvelope, ttl: Duration) -> Self {
        Self {
            id: envelope.job_id,
            repository_id: envelope.repo_id,
            job_type: envelope.job_type,
            status: JobStatus::Pending,
            priority: envelope.priority,
            started_at: None,
            completed_at: None,
            created_at: envelope.created_at,
            updated_at: envelope.created_at,
            expires_at: (envelope.created_at + ttl).trunc_subsecs(0),
            executor: None,
            error_message: None,
            progress: 0,
            processed_files: 0,
            total_files: 0,
            input_params: envelope.input_params,
            output_result: None,
            metadata: Map::new(),
        }
    }

    fn check_invariants(&self) -> Result<()> {
        if self.progress > 100 {
            return Err(WikiError::Serialization(format!(
                "job {} has progress {}",
                self.id, self.progress
            )));
        }
        if self.completed_at.is_some() && !self.is_terminal() {
            return Err(WikiError::Serialization(format!(
                "job {} has a completion time but status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

impl StoredEntity for Job {
    const KIND: &'static str = "job";

    fn key(&self) -> Key {
        Key::partition(&self.id)
    }

    fn from_record(record: Record) -> Result<Self> {
        let job: Job = serde_json::from_value(Value::Object(record)).map_err(|e| {
            WikiError::Serialization(format!("Undecodable {} record: {}", Self::KIND, e))
        })?;
        job.check_invariants()?;
        Ok(job)
    }
}

/// Minimal payload handed to the queue to start execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: String,
    pub repo_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub priority: JobPriority,
    #[serde(default)]
    pub input_params: Map<String, Value>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Submission request.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub repository_id: String,
    pub job_type: JobType,
    pub priority: JobPriority,
    pub input_params: Map<String, Value>,
    pub progress: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Map<String, Value>,
}

impl NewJob {
    pub fn new(repository_id: &str, job_type: JobType) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            job_type,
            priority: JobPriority::default(),
            input_params: Map::new(),
            progress: None,
            expires_at: None,
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.input_params = params;
        self
    }

    /// Validate and build a PENDING job. Expiry defaults to creation plus `ttl`.
    pub fn into_job(self, id: String, ttl: Duration) -> Result<Job> {
        if self.repository_id.trim().is_empty() {
            return Err(WikiError::Validation("Repository id is required".to_string()));
        }
        let progress = match self.progress {
            Some(progress) => Validator::validate_progress(progress)?,
            None => 0,
        };

        let created = now();
        Ok(Job {
            id,
            repository_id: self.repository_id,
            job_type: self.job_type,
            status: JobStatus::Pending,
            priority: self.priority,
            started_at: None,
            completed_at: None,
            created_at: created,
            updated_at: created,
            expires_at: self
                .expires_at
                .unwrap_or(created + ttl)
                .trunc_subsecs(0),
            executor: None,
            error_message: None,
            progress,
            processed_files: 0,
            total_files: 0,
            input_params: self.input_params,
            output_result: None,
            metadata: self.metadata,
        })
    }
}

/// Partial update reported by a consumer.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<i64>,
    pub processed_files: Option<u64>,
    pub total_files: Option<u64>,
    pub executor: Option<String>,
    pub error_message: Option<String>,
    pub output_result: Option<Value>,
    pub metadata: Option<Map<String, Value>>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: i64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    /// Check the update against the job's current state and produce the
    /// attribute changes, stamping start and completion times on transitions.
    pub fn into_changes(self, current: &Job, at: DateTime<Utc>) -> Result<Changes> {
        let mut changes = Changes::new();

        if let Some(progress) = self.progress {
            let progress = Validator::validate_progress(progress)?;
            changes.insert("progress", progress);
        }

        if current.is_terminal() {
            return Err(WikiError::InvalidTransition {
                entity: Job::KIND,
                from: current.status.to_string(),
                to: self
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| current.status.to_string()),
            });
        }

        if let Some(next) = self.status
            && next != current.status
        {
            if !current.status.can_transition_to(next) {
                return Err(WikiError::InvalidTransition {
                    entity: Job::KIND,
                    from: current.status.to_string(),
                    to: next.to_string(),
                });
            }
            changes.insert("status", next);
            if next == JobStatus::Running && current.started_at.is_none() {
                changes.insert("started_at", timestamp_value(at));
            }
            if next.is_terminal() {
                changes.insert("completed_at", timestamp_value(at));
            }
            if next == JobStatus::Completed && self.progress.is_none() {
                changes.insert("progress", 100u8);
            }
        }

        if let Some(count) = self.processed_files {
            changes.insert("processed_files", count);
        }
        if let Some(count) = self.total_files {
            changes.insert("total_files", count);
        }
        if let Some(executor) = self.executor {
            changes.insert("executor", executor);
        }
        if let Some(message) = self.error_message {
            changes.insert("error_message", message);
        }
        if let Some(result) = self.output_result {
            changes.insert("output_result", result);
        }
        if let Some(metadata) = self.metadata {
            changes.insert("metadata", Value::Object(metadata));
        }

        if changes.is_empty() {
            return Err(WikiError::Validation("Job update has no changes".to_string()));
        }
        changes.insert("updated_at", timestamp_value(at));
        Ok(changes)
    }
}

/// Aggregate view over a set of jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStatistics {
    pub total: usize,
    pub by_status: BTreeMap<JobStatus, usize>,
    /// Completed over completed plus failed, as a percentage.
    pub success_rate: Option<f64>,
    pub mean_duration_secs: Option<f64>,
}

impl JobStatistics {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        let mut durations = Vec::new();

        for job in jobs {
            stats.total += 1;
            *stats.by_status.entry(job.status).or_insert(0) += 1;
            if job.is_terminal()
                && let Some(elapsed) = job.elapsed()
            {
                durations.push(elapsed.num_milliseconds() as f64 / 1000.0);
            }
        }

        let completed = stats.count(JobStatus::Completed);
        let failed = stats.count(JobStatus::Failed);
        if completed + failed > 0 {
            stats.success_rate = Some(completed as f64 / (completed + failed) as f64 * 100.0);
        }
        if !durations.is_empty() {
            stats.mean_duration_secs = Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }

        stats
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pending() -> Job {
        NewJob::new("repo-1", JobType::FullParse)
            .into_job("job-000000000001".to_string(), Duration::days(DEFAULT_TTL_DAYS))
            .unwrap()
    }

    #[test]
    fn test_new_job_defaults() {
        let job = pending();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, JobPriority::Normal);
        assert_eq!(job.progress, 0);
        let ttl = job.expires_at - job.created_at;
        assert!(ttl <= Duration::days(30) && ttl > Duration::days(30) - Duration::seconds(1));
        assert!(!job.is_terminal());
        assert!(job.elapsed().is_none());
    }

    #[test]
    fn test_progress_validated_at_construction() {
        let mut draft = NewJob::new("repo-1", JobType::Cleanup);
        draft.progress = Some(150);
        assert!(draft.into_job("job-x".to_string(), Duration::days(1)).is_err());
    }

    #[test]
    fn test_update_rejects_out_of_range_progress() {
        let job = pending();
        for bad in [-1, 101, 150] {
            let result = JobUpdate::progress(bad).into_changes(&job, now());
            assert!(matches!(result, Err(WikiError::Validation(_))));
        }
    }

    #[test]
    fn test_running_update_stamps_start() {
        let job = pending();
        let update = JobUpdate {
            status: Some(JobStatus::Running),
            progress: Some(45),
            ..JobUpdate::default()
        };
        let mut record = job.to_record().unwrap();
        update.into_changes(&job, now()).unwrap().apply(&mut record);

        let running = Job::from_record(record).unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.progress, 45);
        assert!(running.started_at.is_some());
        assert!(!running.is_terminal());
    }

    #[test]
    fn test_terminal_jobs_do_not_transition() {
        let mut job = pending();
        job.status = JobStatus::Completed;
        job.completed_at = Some(now());

        let result = JobUpdate::status(JobStatus::Running).into_changes(&job, now());
        assert!(matches!(result, Err(WikiError::InvalidTransition { .. })));
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let result = JobUpdate::status(JobStatus::Completed).into_changes(&pending(), now());
        assert!(matches!(result, Err(WikiError::InvalidTransition { .. })));
    }

    #[test]
    fn test_envelope_carries_dispatch_fields_only() {
        let mut job = pending();
        job.progress = 60;
        job.executor = Some("worker-1".to_string());

        let body = job.to_envelope().to_json().unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["created_at", "input_params", "job_id", "priority", "repo_id", "type"]
        );

        let rebuilt = Job::from_envelope(JobEnvelope::from_json(&body).unwrap(), Duration::days(30));
        assert_eq!(rebuilt.id, job.id);
        assert_eq!(rebuilt.created_at, job.created_at);
        assert_eq!(rebuilt.progress, 0);
        assert!(rebuilt.executor.is_none());
    }

    #[test]
    fn test_ttl_stored_as_epoch_seconds() {
        let job = pending();
        let record = job.to_record().unwrap();
        assert_eq!(
            record.get("ttl").and_then(Value::as_i64),
            Some(job.expires_at.timestamp())
        );
    }

    #[test]
    fn test_corrupt_record_rejected() {
        let mut record = pending().to_record().unwrap();
        record.insert("completed_at".to_string(), timestamp_value(now()));
        assert!(matches!(Job::from_record(record), Err(WikiError::Serialization(_))));
    }

    #[test]
    fn test_statistics() {
        let base = pending();
        let start = now();
        let finished = |status, secs| Job {
            status,
            started_at: Some(start),
            completed_at: Some(start + Duration::seconds(secs)),
            ..base.clone()
        };
        let jobs = vec![
            finished(JobStatus::Completed, 10),
            finished(JobStatus::Completed, 20),
            finished(JobStatus::Failed, 30),
            base.clone(),
        ];

        let stats = JobStatistics::from_jobs(&jobs);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.count(JobStatus::Pending), 1);
        let rate = stats.success_rate.unwrap();
        assert!((rate - 66.666).abs() < 0.01);
        assert_eq!(stats.mean_duration_secs, Some(20.0));
    }
}
