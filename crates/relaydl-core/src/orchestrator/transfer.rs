//! Local half of a job: open the artifact stream and copy it through the sink.

use std::sync::Arc;

use super::{blocking_remote, JobError, Orchestrator, Stop};
use crate::progress::{ProgressEvent, ProgressPhase, ProgressTracker};
use crate::retry::{retry_remote, RetryStop};
use crate::sink::{ArtifactLocation, ArtifactWrite, SinkError};

impl Orchestrator {
    pub(super) async fn transfer(&mut self, filename: &str) -> Result<ArtifactLocation, Stop> {
        self.deps
            .reporter
            .report(ProgressEvent::new(self.id, ProgressPhase::Transferring, 50));

        let remote = &self.deps.remote;
        let opened = retry_remote(&self.deps.timing.retry, &self.cancel, "fetch artifact", || {
            let remote = Arc::clone(remote);
            let name = filename.to_string();
            blocking_remote(move || remote.fetch_artifact(&name))
        })
        .await;
        let mut stream = match opened {
            Ok(s) => s,
            Err(RetryStop::Canceled) => return Err(Stop::Canceled),
            Err(RetryStop::GaveUp(e)) => return Err(Stop::Failed(JobError::Remote(e))),
        };

        let artifact = ArtifactWrite {
            filename: filename.to_string(),
            mime_hint: self.request.mime_hint().to_string(),
            is_audio: self.request.is_audio(),
            expected_len: stream.content_length(),
        };
        tracing::debug!(
            job_id = self.id,
            filename,
            size = ?artifact.expected_len,
            sink = %self.deps.sink.describe(),
            "transferring artifact"
        );

        let sink = Arc::clone(&self.deps.sink);
        let cancel = Arc::clone(&self.cancel);
        let reporter = self.deps.reporter.clone();
        let id = self.id;
        let written = tokio::task::spawn_blocking(move || {
            let mut tracker = ProgressTracker::new();
            let mut last = (50u8, false);
            let total = artifact.expected_len;
            let mut on_progress = |copied: u64| {
                let now = tracker.transfer(copied, total);
                if now != last {
                    last = now;
                    let mut event = ProgressEvent::new(id, ProgressPhase::Transferring, now.0);
                    event.indeterminate = now.1;
                    reporter.report(event);
                }
            };
            sink.write(&artifact, &mut stream, &mut on_progress, &cancel)
        })
        .await;

        match written {
            Ok(Ok(location)) => Ok(location),
            Ok(Err(SinkError::Aborted)) => Err(Stop::Canceled),
            Ok(Err(e)) => Err(Stop::Failed(JobError::Sink(e))),
            Err(e) => Err(Stop::Failed(JobError::Internal(e.to_string()))),
        }
    }
}
