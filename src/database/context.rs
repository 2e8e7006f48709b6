// file: src/database/context.rs
// description: Request-scoped deadline and cancellation carried by every store call
// reference: https://docs.rs/tokio-util/latest/tokio_util/sync/struct.CancellationToken.html

use crate::error::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation scope for a single request.
///
/// The store does not impose its own timeouts; a context without a deadline
/// waits for the backend to answer or fail on its own.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fail fast when the request is already cancelled or past its deadline.
    pub fn check(&self, operation: &str) -> StoreResult<()> {
        if self.is_cancelled() {
            return Err(StoreError::Interrupted(format!("{}: cancelled", operation)));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(StoreError::Interrupted(format!(
                "{}: deadline exceeded",
                operation
            )));
        }
        Ok(())
    }

    /// Drive a store future under this context's deadline and cancellation.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.check(operation)?;

        let bounded = async {
            match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, future).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Interrupted(format!(
                        "{}: deadline exceeded",
                        operation
                    ))),
                },
                None => future.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                Err(StoreError::Interrupted(format!("{}: cancelled", operation)))
            }
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_through_result() {
        let ctx = RequestContext::new();
        let value = ctx.run("get", async { Ok::<_, StoreError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_context_rejects_calls() {
        let ctx = RequestContext::new();
        ctx.cancel();
        let result = ctx.run("put", async { Ok::<_, StoreError>(()) }).await;
        assert!(matches!(result, Err(StoreError::Interrupted(_))));
    }

    #[tokio::test]
    async fn test_deadline_interrupts_slow_call() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(10));
        let result = ctx
            .run("scan", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::Interrupted(ref m)) if m.contains("deadline")));
    }
}
