//! One-shot completion waits on top of the tracker.

use futures::future::try_join_all;
use tokio::time::{self, Duration};

use crate::{operation::OperationRecord, types::OperationId};

use super::handle::{RuntimeConfig, TrackerError, TrackerHandle};

/// Resolves when operations reach a terminal status.
///
/// A failed or cancelled operation still resolves `Ok`: callers inspect
/// the returned record. Only fetch errors and deadlines reject.
#[derive(Clone)]
pub struct Waiter {
    handle: TrackerHandle,
    interval: Duration,
    timeout: Option<Duration>,
}

impl Waiter {
    pub fn new(handle: TrackerHandle, config: &RuntimeConfig) -> Self {
        Self {
            handle,
            interval: config.poll_interval,
            timeout: config.wait_timeout,
        }
    }

    /// Rejects each single wait with [`TrackerError::TimedOut`] after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Removes any deadline.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn wait_for_one(&self, id: OperationId) -> Result<OperationRecord, TrackerError> {
        match self.timeout {
            Some(after) => time::timeout(after, self.poll_until_terminal(id))
                .await
                .map_err(|_| {
                    tracing::warn!(operation_id = id, timeout_ms = after.as_millis() as u64, "wait timed out");
                    TrackerError::TimedOut { id, after }
                })?,
            None => self.poll_until_terminal(id).await,
        }
    }

    /// Waits for every id concurrently. Records come back in input order;
    /// the first rejection wins and abandons the remaining waits.
    pub async fn wait_for_many(
        &self,
        ids: &[OperationId],
    ) -> Result<Vec<OperationRecord>, TrackerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        try_join_all(ids.iter().map(|id| self.wait_for_one(*id))).await
    }

    async fn poll_until_terminal(&self, id: OperationId) -> Result<OperationRecord, TrackerError> {
        loop {
            let record = self.handle.refresh(id).await?;
            if record.is_terminal() {
                tracing::debug!(operation_id = id, status = %record.status, "operation finished");
                return Ok(record);
            }
            time::sleep(self.interval).await;
        }
    }
}
