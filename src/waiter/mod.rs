//! Polls provider operations to completion.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::gateway::{GatewayError, OperationHandle, OperationStatus, SnapshotGateway};

/// Default delay between two polls of the same operation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default deadline for a single operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// How a successfully awaited operation ended.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationOutcome {
    /// The provider reported the operation done without error.
    Completed(OperationStatus),
    /// The provider no longer knows the operation; it finished before the
    /// poll landed.
    Vanished,
}

/// Errors raised while waiting for an operation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum WaitError {
    /// The operation finished with a provider error payload.
    #[error("operation {operation} failed: {error}")]
    Operation {
        /// Provider operation name.
        operation: String,
        /// Error payload exactly as reported by the provider.
        error: Value,
    },
    /// The operation was still running when the deadline passed.
    #[error("timeout after {waited:?} waiting for operation {operation}")]
    Timeout {
        /// Provider operation name.
        operation: String,
        /// Time spent waiting.
        waited: Duration,
    },
    /// Polling itself failed.
    #[error("failed to poll operation {operation}: {source}")]
    Gateway {
        /// Provider operation name.
        operation: String,
        /// Underlying gateway error.
        #[source]
        source: GatewayError,
    },
}

/// Fixed-interval poller with an optional deadline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OperationWaiter {
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl Default for OperationWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, Some(DEFAULT_OPERATION_TIMEOUT))
    }
}

impl OperationWaiter {
    /// Creates a waiter. A `timeout` of `None` polls until the operation ends.
    #[must_use]
    pub const fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Blocks until `handle` is done or gone.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Operation`] when the operation finished with an
    /// error payload, [`WaitError::Timeout`] when the deadline passes first,
    /// and [`WaitError::Gateway`] when a poll fails. Poll failures are not
    /// retried.
    pub async fn wait<G>(
        &self,
        gateway: &G,
        handle: &OperationHandle,
    ) -> Result<OperationOutcome, WaitError>
    where
        G: SnapshotGateway + ?Sized,
    {
        debug!(operation = %handle.name, "waiting for operation to finish");
        let started = Instant::now();
        loop {
            let polled =
                gateway
                    .get_operation(handle)
                    .await
                    .map_err(|source| WaitError::Gateway {
                        operation: handle.name.clone(),
                        source,
                    })?;
            let Some(status) = polled else {
                debug!(operation = %handle.name, "operation no longer exists; treating as done");
                return Ok(OperationOutcome::Vanished);
            };

            if status.is_done() {
                return match status.error {
                    Some(error) => Err(WaitError::Operation {
                        operation: handle.name.clone(),
                        error,
                    }),
                    None => Ok(OperationOutcome::Completed(status)),
                };
            }

            let waited = started.elapsed();
            if self.timeout.is_some_and(|limit| waited >= limit) {
                return Err(WaitError::Timeout {
                    operation: handle.name.clone(),
                    waited,
                });
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests;
