//! Download service: the command surface a UI talks to.
//!
//! Reads settings at job start, appends the ledger entry before returning,
//! and runs each job's orchestrator on its own tokio task registered in
//! [`JobControl`]. History views reconcile orphaned rows first.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::{normalize_base_url, ConfigError, RelayConfig, SettingKey, SettingsSource, TimeoutConfig};
use crate::control::{BindError, JobControl, LiveGuard};
use crate::ledger::{EntryId, Ledger, LedgerEntry};
use crate::orchestrator::{JobDeps, JobError, JobOutcome, Orchestrator, OrchestratorTiming};
use crate::progress::ProgressReporter;
use crate::remote::{CurlRemote, RemoteError, RemoteJobs, VideoMetadata};
use crate::request::{JobLabel, JobRequest, RequestError};
use crate::sink::{remove_artifact, sink_for_location, ArtifactSink, SinkError};

/// Builds the remote client for a base URL.
pub type RemoteFactory = Arc<dyn Fn(&Url, &TimeoutConfig) -> Arc<dyn RemoteJobs> + Send + Sync>;
/// Builds the artifact sink for the configured download location.
pub type SinkFactory =
    Arc<dyn Fn(Option<&str>) -> Result<Arc<dyn ArtifactSink>, SinkError> + Send + Sync>;

/// Why a job could not be started. No ledger entry exists in any of these cases.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Request(#[from] RequestError),
    #[error("{0}")]
    Sink(#[from] SinkError),
    #[error("{0}")]
    AlreadyActive(#[from] BindError),
    #[error("could not record job: {0:#}")]
    Ledger(anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Remote(#[from] RemoteError),
}

/// Handle returned by [`DownloadService::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedJob {
    pub id: EntryId,
    pub job_token: String,
}

pub struct DownloadService {
    ledger: Ledger,
    reporter: ProgressReporter,
    control: Arc<JobControl>,
    settings: Arc<dyn SettingsSource>,
    config: RelayConfig,
    remote_factory: RemoteFactory,
    sink_factory: SinkFactory,
    tasks: Mutex<HashMap<EntryId, JoinHandle<JobOutcome>>>,
}

impl DownloadService {
    pub fn new(ledger: Ledger, settings: Arc<dyn SettingsSource>, config: RelayConfig) -> Self {
        let reporter = ProgressReporter::new(config.progress_channel_capacity);
        Self {
            ledger,
            reporter,
            control: Arc::new(JobControl::new()),
            settings,
            config,
            remote_factory: Arc::new(|base: &Url, timeouts: &TimeoutConfig| {
                Arc::new(CurlRemote::new(base.clone(), timeouts.clone())) as Arc<dyn RemoteJobs>
            }),
            sink_factory: Arc::new(sink_for_location),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_remote_factory(mut self, factory: RemoteFactory) -> Self {
        self.remote_factory = factory;
        self
    }

    pub fn with_sink_factory(mut self, factory: SinkFactory) -> Self {
        self.sink_factory = factory;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    pub fn control(&self) -> &Arc<JobControl> {
        &self.control
    }

    /// Remote client for the currently configured base URL.
    pub fn remote(&self) -> Result<Arc<dyn RemoteJobs>, ConfigError> {
        let raw = self
            .settings
            .get(SettingKey::BaseUrl)
            .ok_or(ConfigError::MissingBaseUrl)?;
        let base = normalize_base_url(&raw)?;
        Ok((self.remote_factory)(&base, &self.config.timeouts))
    }

    pub async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, MetadataError> {
        let remote = self.remote()?;
        let url = url.trim().to_string();
        let meta = crate::orchestrator::blocking_remote(move || remote.fetch_metadata(&url)).await?;
        Ok(meta)
    }

    /// Validate, record the `downloading` entry, and launch the job in the background.
    pub async fn start(&self, request: &JobRequest, label: JobLabel) -> Result<StartedJob, StartError> {
        let request = request.validate()?;
        let remote = self.remote()?;
        let location = self.settings.get(SettingKey::DownloadLocation);
        let sink = (self.sink_factory)(location.as_deref())?;

        let job_token = uuid::Uuid::new_v4().to_string();
        let cancel = self.control.register(&job_token);
        let guard = LiveGuard::new(Arc::clone(&self.control), job_token.clone());

        let deps = JobDeps {
            ledger: self.ledger.clone(),
            remote,
            sink,
            reporter: self.reporter.clone(),
            timing: OrchestratorTiming::from_config(&self.config),
        };
        let orchestrator = Orchestrator::create(deps, request, &label, &job_token, cancel)
            .await
            .map_err(StartError::Ledger)?;
        let id = orchestrator.id();
        if let Err(e) = self.control.bind(&job_token, id) {
            // The row exists; close it out rather than leave it for reconciliation.
            if let Err(err) = self
                .ledger
                .update_status_only(id, crate::ledger::EntryStatus::Failed)
                .await
            {
                tracing::warn!(job_id = id, "could not mark unbound entry failed: {:#}", err);
            }
            return Err(e.into());
        }

        let task = tokio::spawn(async move {
            let _guard = guard;
            orchestrator.run().await
        });
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, task);
        tracing::info!(job_id = id, job_token = %job_token, "job started");
        Ok(StartedJob { id, job_token })
    }

    /// Request cancellation of a job running in this process.
    pub fn cancel(&self, id: EntryId) -> bool {
        let found = self.control.request_cancel(id);
        tracing::debug!(job_id = id, found, "cancel requested");
        found
    }

    /// Wait for a job started by this service. None if unknown or already joined.
    pub async fn join(&self, id: EntryId) -> Option<JobOutcome> {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)?;
        Some(match task.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed(JobError::Internal(e.to_string())),
        })
    }

    /// Ids of jobs still running in this process.
    pub fn live_jobs(&self) -> Vec<EntryId> {
        self.control.live_ids()
    }

    /// History, newest first, after reconciling orphaned `downloading` rows.
    /// `extra_live_tokens` are jobs alive in other processes.
    pub async fn history(&self, extra_live_tokens: &HashSet<String>) -> Result<Vec<LedgerEntry>> {
        let mut live = self.control.live_tokens();
        live.extend(extra_live_tokens.iter().cloned());
        self.ledger.reconcile_orphans(&live).await?;
        self.ledger.list().await
    }

    pub fn observe_history(&self) -> watch::Receiver<Vec<LedgerEntry>> {
        self.ledger.observe_all()
    }

    /// Delete a history row, optionally with its artifact. Live jobs must be canceled first.
    pub async fn delete(&self, id: EntryId, delete_artifact: bool) -> Result<bool> {
        if self.control.is_live(id) {
            anyhow::bail!("job {} is still running; cancel it first", id);
        }
        let Some(entry) = self.ledger.get(id).await? else {
            return Ok(false);
        };
        if delete_artifact {
            if let Some(location) = entry.artifact_location.as_deref() {
                remove_artifact(Path::new(location)).await?;
            }
        }
        self.reporter.forget(id);
        self.ledger.delete(id).await
    }

    pub async fn clear(&self) -> Result<u64> {
        self.ledger.clear().await
    }
}
