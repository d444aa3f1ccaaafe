//! `relaydl get <url>` – run one job in the foreground until it is final.
//!
//! While the job runs this process serves a control socket, so `relaydl
//! cancel` from another terminal reaches it. Ctrl-C cancels too.

use anyhow::{bail, Context, Result};
use relaydl_core::control::default_control_socket_dir;
use relaydl_core::ledger::EntryId;
use relaydl_core::orchestrator::JobOutcome;
use relaydl_core::progress::{spawn_sink, LogSink, ProgressEvent, ProgressPhase, ProgressSink};
use relaydl_core::remote::VideoMetadata;
use relaydl_core::request::{JobLabel, JobRequest};
use relaydl_core::service::DownloadService;

use crate::cli::control_socket::ControlSocket;

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub url: String,
    pub audio: bool,
    pub audio_format: Option<String>,
    pub format: Option<String>,
    pub height: Option<u32>,
}

impl GetOptions {
    /// True when the user picked neither a format, a height nor audio.
    fn needs_default_height(&self) -> bool {
        !self.audio && self.format.is_none() && self.height.is_none()
    }
}

/// Request for `opts`. Without an explicit choice the highest height in
/// `meta` is used; no heights at all leaves nothing selected, which
/// validation rejects.
pub fn build_request(opts: &GetOptions, meta: Option<&VideoMetadata>) -> JobRequest {
    let desired_height = if opts.needs_default_height() {
        meta.and_then(|m| m.available_heights().first().copied())
    } else {
        opts.height
    };
    JobRequest {
        source_url: opts.url.trim().to_string(),
        audio_only: opts.audio,
        format_selector: opts.format.clone(),
        desired_height,
        audio_format: opts.audio_format.clone(),
    }
}

pub async fn run_get(service: &DownloadService, opts: &GetOptions) -> Result<()> {
    let meta = match service.fetch_metadata(&opts.url).await {
        Ok(meta) => Some(meta),
        Err(e) if opts.needs_default_height() => return Err(e.into()),
        Err(e) => {
            tracing::warn!("metadata unavailable, starting without it: {}", e);
            None
        }
    };
    let request = build_request(opts, meta.as_ref());
    if let Some(h) = request.desired_height.filter(|_| opts.needs_default_height()) {
        println!("Selected {}p", h);
    }
    let label = meta.as_ref().map(JobLabel::from_metadata).unwrap_or_default();

    // Without a socket other processes would reconcile this job as orphaned.
    let socket = default_control_socket_dir()
        .and_then(|dir| ControlSocket::bind(std::sync::Arc::clone(service.control()), &dir))
        .context("control socket unavailable; not starting the job")?;
    tracing::debug!(path = %socket.path().display(), "control socket listening");

    let started = service.start(&request, label).await?;
    let id = started.id;
    println!("Started job {}", id);
    let printer = spawn_sink(service.reporter(), TerminalProgress::new(id));
    let logger = spawn_sink(service.reporter(), LogSink);

    let join = service.join(id);
    tokio::pin!(join);
    let mut canceling = false;
    let outcome = loop {
        tokio::select! {
            outcome = &mut join => break outcome,
            _ = tokio::signal::ctrl_c(), if !canceling => {
                println!("Canceling job {}...", id);
                service.cancel(id);
                canceling = true;
            }
        }
    };
    printer.abort();
    logger.abort();
    drop(socket);

    match outcome {
        Some(JobOutcome::Completed { location }) => {
            println!("Saved to {}", location);
            Ok(())
        }
        Some(JobOutcome::Canceled) => {
            println!("Canceled job {}", id);
            Ok(())
        }
        Some(JobOutcome::Failed(e)) => bail!("job {} failed: {}", id, e),
        None => bail!("job {} is not running in this process", id),
    }
}

/// Prints one line per change of phase or percent for a single job.
struct TerminalProgress {
    job_id: EntryId,
    last: Option<(ProgressPhase, u8)>,
}

impl TerminalProgress {
    fn new(job_id: EntryId) -> Self {
        Self { job_id, last: None }
    }

    fn line(&mut self, event: &ProgressEvent) -> Option<String> {
        if event.job_id != self.job_id || event.phase.is_final() {
            return None;
        }
        let key = (event.phase, event.percent);
        if self.last == Some(key) {
            return None;
        }
        self.last = Some(key);
        let mut line = if event.indeterminate {
            format!("  ---%  {}", event.phase.label())
        } else {
            format!("  {:>3}%  {}", event.percent, event.phase.label())
        };
        if let Some(rate) = &event.transfer_rate {
            line.push_str(&format!("  {}", rate));
        }
        if let Some(eta) = &event.eta {
            line.push_str(&format!("  ETA {}", eta));
        }
        Some(line)
    }
}

impl ProgressSink for TerminalProgress {
    fn on_event(&mut self, event: &ProgressEvent) {
        if let Some(line) = self.line(event) {
            println!("{}", line);
        }
    }
}
