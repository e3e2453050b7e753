//! Completion polling.
//!
//! Drives an execution from QUEUED through RUNNING to a terminal state by
//! querying its status at a fixed interval. Status queries failing in
//! transit are retried; once more than `max_status_errors` fail in a row the
//! execution is reported as FAILED locally, without a service-provided
//! status. Any other failure ends polling at once.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{ClientManager, WorkerId};
use crate::config::PollingConfig;
use crate::error::{AuditError, Result};
use crate::service::{ExecutionHandle, ExecutionState, ExecutionStatus};

/// Waits for executions to finish.
#[derive(Debug, Clone)]
pub struct CompletionPoller {
    clients: Arc<ClientManager>,
    interval: Duration,
    max_status_errors: u32,
}

impl CompletionPoller {
    /// Creates a poller using the worker clients from `clients`.
    pub fn new(clients: Arc<ClientManager>, polling: &PollingConfig) -> Self {
        Self {
            clients,
            interval: polling.interval(),
            max_status_errors: polling.max_status_errors,
        }
    }

    /// Polls until `handle` reaches a terminal state.
    ///
    /// Never fails: a FAILED or CANCELLED execution, and an execution whose
    /// status could not be read, come back as a status with `success() == false`.
    pub async fn await_completion(
        &self,
        worker: WorkerId,
        handle: &ExecutionHandle,
    ) -> ExecutionStatus {
        let mut state = ExecutionState::Queued;
        let mut last_seen: Option<ExecutionStatus> = None;
        let mut errors = 0u32;

        loop {
            match self.query_status(worker, handle).await {
                Ok(status) => {
                    errors = 0;
                    if state.can_advance_to(status.state) {
                        state = status.state;
                    } else {
                        warn!(
                            "Execution {} reported {} after {}; keeping {}",
                            handle, status.state, state, state
                        );
                    }

                    if status.state.is_terminal() {
                        info!("Execution {} finished: {}", handle, status.state);
                        return status;
                    }
                    debug!("Execution {} is {}", handle, state);
                    last_seen = Some(status);
                }
                Err(err) if !err.is_transient() => {
                    warn!("Status of {} cannot be read: {}", handle, err);
                    return ExecutionStatus::unreadable(
                        handle.clone(),
                        last_seen.as_ref(),
                        err.to_string(),
                    );
                }
                Err(err) => {
                    errors += 1;
                    if errors > self.max_status_errors {
                        warn!(
                            "Giving up on execution {} after {} failed status queries: {}",
                            handle, errors, err
                        );
                        return ExecutionStatus::transport_exhausted(
                            handle.clone(),
                            errors,
                            last_seen.as_ref(),
                            err.to_string(),
                        );
                    }

                    if matches!(err, AuditError::CredentialExpired(_)) {
                        if let Err(refresh_err) = self.clients.refresh(worker).await {
                            warn!("Could not refresh client for {}: {}", worker, refresh_err);
                        }
                    } else {
                        warn!(
                            "Status query {}/{} for {} failed: {}",
                            errors, self.max_status_errors, handle, err
                        );
                    }
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    async fn query_status(
        &self,
        worker: WorkerId,
        handle: &ExecutionHandle,
    ) -> Result<ExecutionStatus> {
        let client = self.clients.handle_for(worker).await?;
        client.execution_status(handle).await
    }
}
