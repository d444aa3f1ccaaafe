//! Download orchestrator: the per-job state machine.
//!
//! `Created → RemoteSubmitting → RemotePolling → LocalTransferring → Finalized`.
//! One orchestrator drives one ledger entry; it owns the entry while it is
//! `downloading` and finalizes it exactly once.

mod polling;
mod transfer;


use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::RelayConfig;
use crate::control::CancelToken;
use crate::ledger::{EntryId, EntryStatus, Ledger};
use crate::progress::{ProgressEvent, ProgressPhase, ProgressReporter, ProgressTracker};
use crate::remote::{RemoteError, RemoteJobHandle, RemoteJobs};
use crate::request::{JobLabel, ValidatedRequest};
use crate::retry::RetryPolicy;
use crate::sink::{remove_artifact, ArtifactLocation, ArtifactSink, SinkError};

/// Polling cadence and retry limits.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorTiming {
    pub poll_interval: Duration,
    /// Consecutive transient poll failures before the job fails.
    pub poll_failure_ceiling: u32,
    /// Applied to submission and to opening the artifact stream.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorTiming {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl OrchestratorTiming {
    pub fn from_config(cfg: &RelayConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            poll_failure_ceiling: cfg.poll_failure_ceiling.max(1),
            retry: cfg.retry_policy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Created,
    RemoteSubmitting,
    RemotePolling,
    LocalTransferring,
    Finalized,
}

/// Why a job failed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Network or HTTP failure talking to the remote (after retries).
    #[error("remote request failed: {0}")]
    Remote(#[source] RemoteError),
    #[error("remote gave no answer after {attempts} consecutive polls: {last}")]
    PollCeiling {
        attempts: u32,
        #[source]
        last: RemoteError,
    },
    /// The remote reported `error`.
    #[error("remote job failed: {0}")]
    RemoteReported(String),
    /// The remote broke the protocol (e.g. completed without a filename).
    #[error("remote contract violation: {0}")]
    Contract(String),
    /// Writing the artifact failed, or the stream broke mid-copy.
    #[error("{0}")]
    Sink(#[source] SinkError),
    #[error("ledger update failed: {0}")]
    Ledger(String),
    #[error("background task failed: {0}")]
    Internal(String),
}

/// Terminal result of one job.
#[derive(Debug)]
pub enum JobOutcome {
    Completed { location: ArtifactLocation },
    Failed(JobError),
    Canceled,
}

impl JobOutcome {
    pub fn status(&self) -> EntryStatus {
        match self {
            JobOutcome::Completed { .. } => EntryStatus::Completed,
            JobOutcome::Failed(_) => EntryStatus::Failed,
            JobOutcome::Canceled => EntryStatus::Canceled,
        }
    }
}

/// Everything an orchestrator talks to. Cheap to clone.
#[derive(Clone)]
pub struct JobDeps {
    pub ledger: Ledger,
    pub remote: Arc<dyn RemoteJobs>,
    pub sink: Arc<dyn ArtifactSink>,
    pub reporter: ProgressReporter,
    pub timing: OrchestratorTiming,
}

/// Early exit from the drive loop.
pub(crate) enum Stop {
    Canceled,
    Failed(JobError),
}

pub struct Orchestrator {
    id: EntryId,
    request: ValidatedRequest,
    deps: JobDeps,
    cancel: Arc<CancelToken>,
    stage: JobStage,
    handle: Option<RemoteJobHandle>,
    remote_terminal: bool,
    tracker: ProgressTracker,
}

impl Orchestrator {
    /// Append the `downloading` ledger entry for this job and return the orchestrator in `Created`.
    pub async fn create(
        deps: JobDeps,
        request: ValidatedRequest,
        label: &JobLabel,
        job_token: &str,
        cancel: Arc<CancelToken>,
    ) -> Result<Self> {
        let id = deps
            .ledger
            .append(&label.to_new_entry(&request, job_token))
            .await?;
        deps.reporter
            .report(ProgressEvent::new(id, ProgressPhase::Starting, 0));
        tracing::debug!(job_id = id, job_token, url = %request.source_url, "job created");
        Ok(Self {
            id,
            request,
            deps,
            cancel,
            stage: JobStage::Created,
            handle: None,
            remote_terminal: false,
            tracker: ProgressTracker::new(),
        })
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    fn enter(&mut self, stage: JobStage) {
        tracing::debug!(job_id = self.id, from = ?self.stage, to = ?stage, "job stage");
        self.stage = stage;
    }

    /// Drive the job to its terminal state. Consumes the orchestrator.
    pub async fn run(mut self) -> JobOutcome {
        let result = self.drive().await;
        let outcome = match result {
            Ok(location) => JobOutcome::Completed { location },
            Err(Stop::Canceled) => JobOutcome::Canceled,
            // A cancel request wins over whatever failure it caused.
            Err(Stop::Failed(_)) if self.cancel.is_canceled() => JobOutcome::Canceled,
            Err(Stop::Failed(e)) => JobOutcome::Failed(e),
        };
        self.finalize(outcome).await
    }

    async fn drive(&mut self) -> Result<ArtifactLocation, Stop> {
        self.enter(JobStage::RemoteSubmitting);
        let handle = self.submit().await?;
        self.handle = Some(handle.clone());

        self.enter(JobStage::RemotePolling);
        let filename = self.poll_until_terminal(&handle).await?;

        self.enter(JobStage::LocalTransferring);
        self.transfer(&filename).await
    }

    async fn finalize(mut self, outcome: JobOutcome) -> JobOutcome {
        let ledger = &self.deps.ledger;
        let mut outcome = outcome;

        if matches!(outcome, JobOutcome::Canceled) && !self.remote_terminal {
            if let Some(handle) = self.handle.clone() {
                self.cancel_remote(handle).await;
            }
        }

        let written = match &outcome {
            JobOutcome::Completed { location } => {
                let location = location.to_string();
                ledger
                    .update_terminal(self.id, EntryStatus::Completed, Some(location.as_str()))
                    .await
            }
            other => ledger.update_status_only(self.id, other.status()).await,
        };
        let conflict = match written {
            Ok(true) => None,
            Ok(false) => {
                tracing::debug!(job_id = self.id, "ledger entry was already terminal");
                Some("entry was finalized elsewhere before the artifact was recorded".to_string())
            }
            Err(e) => {
                tracing::error!(job_id = self.id, "could not finalize ledger entry: {:#}", e);
                Some(format!("{:#}", e))
            }
        };
        // A committed artifact the ledger does not point to must not survive.
        let committed = match &outcome {
            JobOutcome::Completed { location } => Some(location.path().to_path_buf()),
            _ => None,
        };
        if let (Some(reason), Some(path)) = (conflict, committed) {
            if let Err(e) = remove_artifact(&path).await {
                tracing::warn!(job_id = self.id, "could not remove unrecorded artifact: {}", e);
            }
            outcome = JobOutcome::Failed(JobError::Ledger(reason));
        }

        let last = self
            .deps
            .reporter
            .latest(self.id)
            .map_or(0, |e| e.percent);
        let event = match &outcome {
            JobOutcome::Completed { location } => {
                tracing::info!(job_id = self.id, %location, "job completed");
                ProgressEvent::new(self.id, ProgressPhase::Completed, 100)
                    .with_message(location.to_string())
            }
            JobOutcome::Failed(e) => {
                tracing::warn!(job_id = self.id, "job failed: {}", e);
                ProgressEvent::new(self.id, ProgressPhase::Failed, last).with_message(e.to_string())
            }
            JobOutcome::Canceled => {
                tracing::warn!(job_id = self.id, "job canceled");
                ProgressEvent::new(self.id, ProgressPhase::Canceled, last)
            }
        };
        self.deps.reporter.report(event);
        self.enter(JobStage::Finalized);
        outcome
    }

    /// Single best-effort remote cancel; failures are only logged.
    async fn cancel_remote(&self, handle: RemoteJobHandle) {
        let remote = Arc::clone(&self.deps.remote);
        let res = tokio::task::spawn_blocking(move || remote.cancel(&handle)).await;
        match res {
            Ok(Ok(())) => tracing::debug!(job_id = self.id, "remote job canceled"),
            Ok(Err(e)) => tracing::warn!(job_id = self.id, "remote cancel failed: {}", e),
            Err(e) => tracing::warn!(job_id = self.id, "remote cancel task failed: {}", e),
        }
    }
}

/// Run a blocking remote call off the async runtime.
pub(crate) async fn blocking_remote<T, F>(f: F) -> Result<T, RemoteError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(r) => r,
        Err(e) => Err(RemoteError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("remote call task failed: {}", e),
        ))),
    }
}
