//! Job control for cancellation: shared cancel tokens and the live-job registry.
//!
//! Every running orchestrator is registered here under its background job
//! token and bound to its ledger id. A control client (the CLI via a control
//! socket, or an embedding UI) requests cancellation by ledger id; the
//! orchestrator checks the token between poll ticks and at each copy chunk.
//! The set of registered tokens is what history reconciliation treats as
//! "still alive".

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;

use crate::ledger::EntryId;

/// Cooperative cancellation flag. Blocking code polls [`CancelToken::is_canceled`];
/// async code can additionally await [`CancelToken::cancelled`].
#[derive(Debug, Default)]
pub struct CancelToken {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; cancellation never resets.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

/// Why a job token could not be bound to a ledger id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("job {0} already has an active background task")]
    AlreadyActive(EntryId),
    #[error("job token {0} is not registered")]
    NotRegistered(String),
}

struct LiveJob {
    id: Option<EntryId>,
    cancel: Arc<CancelToken>,
}

/// Shared registry of live background jobs, keyed by job token.
///
/// A token is registered before its ledger row is appended and bound to the
/// row id afterwards, so reconciliation never sees a fresh row as orphaned.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<String, LiveJob>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job token as live; returns the cancel token for its orchestrator.
    pub fn register(&self, job_token: &str) -> Arc<CancelToken> {
        let cancel = Arc::new(CancelToken::new());
        self.jobs.write().unwrap_or_else(|e| e.into_inner()).insert(
            job_token.to_string(),
            LiveJob {
                id: None,
                cancel: Arc::clone(&cancel),
            },
        );
        cancel
    }

    /// Attach the ledger id. At most one live job per ledger id.
    pub fn bind(&self, job_token: &str, id: EntryId) -> Result<(), BindError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let taken = jobs
            .iter()
            .any(|(token, job)| job.id == Some(id) && token != job_token);
        if taken {
            return Err(BindError::AlreadyActive(id));
        }
        match jobs.get_mut(job_token) {
            Some(job) => {
                job.id = Some(id);
                Ok(())
            }
            None => Err(BindError::NotRegistered(job_token.to_string())),
        }
    }

    /// Unregister a job (call when the orchestrator has finalized).
    pub fn unregister(&self, job_token: &str) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_token);
    }

    /// Request cancellation for a job. Returns false if no such job is live here.
    pub fn request_cancel(&self, id: EntryId) -> bool {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        match jobs.values().find(|j| j.id == Some(id)) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Request cancellation for every live job (e.g. on Ctrl-C).
    pub fn cancel_all(&self) -> usize {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        for job in jobs.values() {
            job.cancel.cancel();
        }
        jobs.len()
    }

    pub fn is_live(&self, id: EntryId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .any(|j| j.id == Some(id))
    }

    /// Job tokens of every live job, for history reconciliation.
    pub fn live_tokens(&self) -> HashSet<String> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn live_ids(&self) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter_map(|j| j.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Unregisters a job from [`JobControl`] when dropped, so a panicking
/// orchestrator task never leaves a phantom live job behind.
pub struct LiveGuard {
    control: Arc<JobControl>,
    job_token: String,
}

impl LiveGuard {
    pub fn new(control: Arc<JobControl>, job_token: impl Into<String>) -> Self {
        Self {
            control,
            job_token: job_token.into(),
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.control.unregister(&self.job_token);
    }
}

/// Directory holding one control socket per process hosting jobs
/// (same XDG state dir as the ledger).
pub fn default_control_socket_dir() -> anyhow::Result<PathBuf> {
    Ok(crate::config::state_dir()?.join("control"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn register_cancel_unregister() {
        let control = JobControl::new();
        let token = control.register("tok-1");
        assert!(control.live_tokens().contains("tok-1"));
        assert!(!control.is_live(1));
        control.bind("tok-1", 1).unwrap();
        assert!(control.is_live(1));
        assert!(!token.is_canceled());

        assert!(control.request_cancel(1));
        assert!(token.is_canceled());
        assert!(!control.request_cancel(2));

        control.unregister("tok-1");
        assert!(!control.is_live(1));
        assert!(control.live_tokens().is_empty());
    }

    #[test]
    fn one_live_job_per_id() {
        let control = JobControl::new();
        control.register("a");
        control.bind("a", 5).unwrap();
        control.register("b");
        assert_eq!(control.bind("b", 5).unwrap_err(), BindError::AlreadyActive(5));
        control.bind("b", 6).unwrap();
        assert_eq!(
            control.bind("gone", 7).unwrap_err(),
            BindError::NotRegistered("gone".into())
        );
        let tokens = control.live_tokens();
        assert!(tokens.contains("a") && tokens.contains("b"));
        assert_eq!(control.live_ids(), vec![5, 6]);
        assert_eq!(control.cancel_all(), 2);
    }

    #[test]
    fn guard_unregisters_on_drop() {
        let control = Arc::new(JobControl::new());
        control.register("t");
        control.bind("t", 3).unwrap();
        {
            let _guard = LiveGuard::new(Arc::clone(&control), "t");
        }
        assert!(!control.is_live(3));
        assert!(control.live_tokens().is_empty());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let token = Arc::new(CancelToken::new());
        let waiter = {
            let token = Arc::clone(&token);
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
