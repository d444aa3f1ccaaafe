//! Progress reporting: per-job bands, lossy fan-out, and a latest-event view.
//!
//! The orchestrator never blocks on observers. Intermediate events travel over
//! a `broadcast` channel (slow subscribers skip events); the most recent event
//! per job is also kept in a `watch`-backed map, so the final event of a job
//! stays observable even by a subscriber that lagged or joined late.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::ledger::EntryId;

/// Coarse phase label shown next to the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    Starting,
    Remote,
    Transferring,
    Completed,
    Failed,
    Canceled,
}

impl ProgressPhase {
    pub fn label(self) -> &'static str {
        match self {
            ProgressPhase::Starting => "starting",
            ProgressPhase::Remote => "processing",
            ProgressPhase::Transferring => "downloading",
            ProgressPhase::Completed => "completed",
            ProgressPhase::Failed => "failed",
            ProgressPhase::Canceled => "canceled",
        }
    }

    pub fn is_final(self) -> bool {
        matches!(
            self,
            ProgressPhase::Completed | ProgressPhase::Failed | ProgressPhase::Canceled
        )
    }
}

/// One progress update for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub job_id: EntryId,
    pub phase: ProgressPhase,
    /// Overall job progress, 0..=100.
    pub percent: u8,
    /// Transfer size unknown; `percent` is only a phase marker.
    pub indeterminate: bool,
    pub message: Option<String>,
    /// Display-only strings forwarded from the remote.
    pub transfer_rate: Option<String>,
    pub eta: Option<String>,
}

impl ProgressEvent {
    pub fn new(job_id: EntryId, phase: ProgressPhase, percent: u8) -> Self {
        Self {
            job_id,
            phase,
            percent: percent.min(100),
            indeterminate: false,
            message: None,
            transfer_rate: None,
            eta: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Maps raw remote and transfer progress into monotonic overall bands:
/// remote 0..=100 → 0..=50, transfer → 50..=99, completion → 100.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    remote_max: f64,
    transfer_last: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overall percent for a remote report. Decreases are clamped to the highest seen.
    pub fn remote(&mut self, remote_percent: f64) -> u8 {
        if remote_percent.is_finite() && remote_percent > self.remote_max {
            self.remote_max = remote_percent.min(100.0);
        }
        (self.remote_max / 2.0).floor() as u8
    }

    /// Overall percent for `copied` of `total` bytes, and whether it is indeterminate.
    pub fn transfer(&mut self, copied: u64, total: Option<u64>) -> (u8, bool) {
        match total {
            Some(total) if total > 0 => {
                let frac = (copied.min(total) as u128 * 50 / total as u128) as u8;
                let percent = (50 + frac).min(99).max(self.transfer_last).max(50);
                self.transfer_last = percent;
                (percent, false)
            }
            _ => (50, true),
        }
    }
}

/// Fans progress events out to subscribers. Cheap to clone.
#[derive(Clone)]
pub struct ProgressReporter {
    events: broadcast::Sender<ProgressEvent>,
    latest: Arc<watch::Sender<HashMap<EntryId, ProgressEvent>>>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (latest, _) = watch::channel(HashMap::new());
        Self {
            events,
            latest: Arc::new(latest),
        }
    }

    /// Publish an event. Never blocks; having no subscribers is fine.
    pub fn report(&self, event: ProgressEvent) {
        self.latest.send_modify(|map| {
            map.insert(event.job_id, event.clone());
        });
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Latest event of every job seen so far.
    pub fn watch_latest(&self) -> watch::Receiver<HashMap<EntryId, ProgressEvent>> {
        self.latest.subscribe()
    }

    pub fn latest(&self, job_id: EntryId) -> Option<ProgressEvent> {
        self.latest.borrow().get(&job_id).cloned()
    }

    /// Drop the retained event of a job (e.g. after its history row was deleted).
    pub fn forget(&self, job_id: EntryId) {
        self.latest.send_if_modified(|map| map.remove(&job_id).is_some());
    }
}

/// A consumer of progress events (terminal printer, notifier, UI state holder).
pub trait ProgressSink: Send + 'static {
    fn on_event(&mut self, event: &ProgressEvent);
}

/// Drive `sink` from the reporter on a background task until the reporter is dropped.
/// Skipped (lagged) events are tolerated.
pub fn spawn_sink<S: ProgressSink>(reporter: &ProgressReporter, mut sink: S) -> JoinHandle<()> {
    let mut rx = reporter.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => sink.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "progress sink lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Logs events through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_event(&mut self, event: &ProgressEvent) {
        if event.phase.is_final() {
            tracing::info!(job_id = event.job_id, phase = event.phase.label(), message = ?event.message, "job finished");
        } else {
            tracing::debug!(
                job_id = event.job_id,
                phase = event.phase.label(),
                percent = event.percent,
                indeterminate = event.indeterminate,
                "progress"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn remote_band_is_clamped_and_monotonic() {
        let mut t = ProgressTracker::new();
        assert_eq!(t.remote(0.0), 0);
        assert_eq!(t.remote(41.0), 20);
        assert_eq!(t.remote(30.0), 20);
        assert_eq!(t.remote(f64::NAN), 20);
        assert_eq!(t.remote(250.0), 50);
    }

    #[test]
    fn transfer_band() {
        let mut t = ProgressTracker::new();
        assert_eq!(t.transfer(0, Some(1000)), (50, false));
        assert_eq!(t.transfer(600, Some(1000)), (80, false));
        assert_eq!(t.transfer(1000, Some(1000)), (99, false));
        assert_eq!(t.transfer(10, None), (50, true));
        assert_eq!(t.transfer(10, Some(0)), (50, true));
    }

    #[test]
    fn latest_keeps_final_event() {
        let reporter = ProgressReporter::new(1);
        let mut rx = reporter.subscribe();
        reporter.report(ProgressEvent::new(1, ProgressPhase::Remote, 10));
        reporter.report(ProgressEvent::new(1, ProgressPhase::Transferring, 60));
        reporter.report(ProgressEvent::new(1, ProgressPhase::Completed, 100));

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
        assert_eq!(rx.try_recv().unwrap().phase, ProgressPhase::Completed);
        assert_eq!(reporter.latest(1).unwrap().percent, 100);

        reporter.forget(1);
        assert!(reporter.latest(1).is_none());
    }

    struct Collect(Arc<Mutex<Vec<u8>>>);

    impl ProgressSink for Collect {
        fn on_event(&mut self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.percent);
        }
    }

    #[tokio::test]
    async fn spawned_sink_stops_when_reporter_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reporter = ProgressReporter::new(16);
        let task = spawn_sink(&reporter, Collect(Arc::clone(&seen)));
        reporter.report(ProgressEvent::new(7, ProgressPhase::Starting, 0));
        reporter.report(ProgressEvent::new(7, ProgressPhase::Completed, 100));
        drop(reporter);
        task.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 100]);
    }
}
