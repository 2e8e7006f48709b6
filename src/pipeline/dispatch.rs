// file: src/pipeline/dispatch.rs
// description: hands job envelopes to the execution queue
// reference: https://docs.rs/tokio/latest/tokio/sync/mpsc

use crate::error::{Result, WikiError};
use crate::models::JobEnvelope;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

/// Port to the queue that starts out-of-process job execution.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, envelope: &JobEnvelope) -> Result<()>;
}

/// Bounded in-process queue. Messages travel as the JSON body a remote queue
/// would carry, so consumers decode exactly what an external worker would.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<String>,
}

pub struct JobReceiver {
    receiver: mpsc::Receiver<String>,
}

impl ChannelPublisher {
    pub fn channel(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, JobReceiver { receiver })
    }
}

#[async_trait]
impl JobPublisher for ChannelPublisher {
    async fn publish(&self, envelope: &JobEnvelope) -> Result<()> {
        let body = envelope.to_json()?;
        self.sender
            .send(body)
            .await
            .map_err(|_| WikiError::Queue("Job queue receiver has been dropped".to_string()))?;
        debug!(job = %envelope.job_id, "Queued job envelope");
        Ok(())
    }
}

impl JobReceiver {
    /// Next envelope, or `None` once every publisher is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<Result<JobEnvelope>> {
        let body = self.receiver.recv().await?;
        Some(JobEnvelope::from_json(&body))
    }

    pub fn try_recv(&mut self) -> Option<Result<JobEnvelope>> {
        self.receiver
            .try_recv()
            .ok()
            .map(|body| JobEnvelope::from_json(&body))
    }
}

/// Appends one JSON line per envelope to a file, for runs where no consumer
/// is attached to the process.
pub struct OutboxPublisher {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutboxPublisher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl JobPublisher for OutboxPublisher {
    async fn publish(&self, envelope: &JobEnvelope) -> Result<()> {
        let mut line = envelope.to_json()?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(job = %envelope.job_id, outbox = %self.path.display(), "Wrote job envelope to outbox");
        Ok(())
    }
}
