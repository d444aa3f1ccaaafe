//! Remote half of a job: submission and the status poll loop.

use std::sync::Arc;

use super::{blocking_remote, JobError, Orchestrator, Stop};
use crate::progress::{ProgressEvent, ProgressPhase};
use crate::remote::{RemoteJobHandle, RemotePhase, RemoteStatus};
use crate::retry::{classify, retry_remote, CeilingDecision, FailureCeiling, RetryStop};

impl Orchestrator {
    /// Submit the job, retrying transient failures.
    pub(super) async fn submit(&mut self) -> Result<RemoteJobHandle, Stop> {
        let body = self.request.submit_body();
        let remote = &self.deps.remote;
        let res = retry_remote(&self.deps.timing.retry, &self.cancel, "submit", || {
            let remote = Arc::clone(remote);
            let body = body.clone();
            blocking_remote(move || remote.submit(&body))
        })
        .await;
        match res {
            Ok(handle) => {
                tracing::debug!(job_id = self.id, task_id = %handle, "submitted");
                Ok(handle)
            }
            Err(RetryStop::Canceled) => Err(Stop::Canceled),
            Err(RetryStop::GaveUp(e)) => Err(Stop::Failed(JobError::Remote(e))),
        }
    }

    /// Poll until the remote is terminal. Returns the artifact filename.
    pub(super) async fn poll_until_terminal(&mut self, handle: &RemoteJobHandle) -> Result<String, Stop> {
        let mut ceiling = FailureCeiling::new(self.deps.timing.poll_failure_ceiling);
        loop {
            if self.cancel.is_canceled() {
                return Err(Stop::Canceled);
            }
            let remote = Arc::clone(&self.deps.remote);
            let h = handle.clone();
            match blocking_remote(move || remote.poll(&h)).await {
                Ok(status) => {
                    ceiling.reset();
                    if let Some(filename) = self.observe(status)? {
                        return Ok(filename);
                    }
                }
                Err(e) => {
                    let kind = classify(&e);
                    match ceiling.record(kind) {
                        CeilingDecision::Fatal => return Err(Stop::Failed(JobError::Remote(e))),
                        CeilingDecision::Exhausted { attempts } => {
                            return Err(Stop::Failed(JobError::PollCeiling { attempts, last: e }));
                        }
                        CeilingDecision::Tolerate => {
                            let failures = ceiling.consecutive();
                            tracing::debug!(job_id = self.id, failures, ?kind, "poll failed: {}", e);
                        }
                    }
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.deps.timing.poll_interval) => {}
                _ = self.cancel.cancelled() => return Err(Stop::Canceled),
            }
        }
    }

    /// Report one status. `Ok(Some(name))` when the artifact is ready.
    fn observe(&mut self, status: RemoteStatus) -> Result<Option<String>, Stop> {
        let percent = self.tracker.remote(status.percent);
        let mut event = ProgressEvent::new(self.id, ProgressPhase::Remote, percent);
        event.message = status.message.clone();
        event.transfer_rate = status.transfer_rate.clone();
        event.eta = status.eta.clone();
        self.deps.reporter.report(event);

        match status.phase {
            RemotePhase::Queued | RemotePhase::Processing | RemotePhase::Downloading => Ok(None),
            RemotePhase::Error => {
                self.remote_terminal = true;
                let message = status
                    .message
                    .unwrap_or_else(|| "remote reported an error".to_string());
                Err(Stop::Failed(JobError::RemoteReported(message)))
            }
            RemotePhase::Completed => {
                self.remote_terminal = true;
                match status.result_filename {
                    Some(name) => Ok(Some(name)),
                    None => Err(Stop::Failed(JobError::Contract(
                        "remote completed without a filename".to_string(),
                    ))),
                }
            }
        }
    }
}
