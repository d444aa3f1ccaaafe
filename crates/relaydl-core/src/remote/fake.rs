//! Scripted in-process remote for orchestrator and service tests.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use super::{
    ArtifactStream, RemoteError, RemoteJobHandle, RemoteJobs, RemotePhase, RemoteStatus,
    SubmitBody, VideoMetadata,
};
use crate::control::CancelToken;

pub(crate) fn status(phase: RemotePhase, percent: f64) -> RemoteStatus {
    RemoteStatus {
        phase,
        percent,
        message: None,
        result_filename: None,
        transfer_rate: None,
        eta: None,
        total_bytes: None,
        downloaded_bytes: None,
    }
}

pub(crate) fn completed(filename: &str) -> RemoteStatus {
    RemoteStatus {
        result_filename: Some(filename.to_string()),
        ..status(RemotePhase::Completed, 100.0)
    }
}

pub(crate) fn refused() -> RemoteError {
    RemoteError::Io(io::Error::from(io::ErrorKind::ConnectionRefused))
}

/// How the artifact body behaves.
#[derive(Clone)]
pub(crate) enum ArtifactScript {
    Bytes(Vec<u8>),
    /// Announce `total` bytes, deliver `good`, then fail with a connection reset.
    FailAfter { total: u64, good: usize },
    /// Deliver bytes in small chunks, canceling the token after the first read.
    CancelDuring { data: Vec<u8>, cancel: Arc<CancelToken> },
}

#[derive(Default)]
pub(crate) struct FakeRemote {
    submits: Mutex<VecDeque<Result<RemoteJobHandle, RemoteError>>>,
    statuses: Mutex<VecDeque<Result<RemoteStatus, RemoteError>>>,
    artifact: Mutex<Option<ArtifactScript>>,
    pub(crate) metadata: Mutex<Option<VideoMetadata>>,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<SubmitBody>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn submit_ok(self, id: &str) -> Self {
        self.push_submit(Ok(RemoteJobHandle::new(id)));
        self
    }

    pub(crate) fn push_submit(&self, r: Result<RemoteJobHandle, RemoteError>) {
        self.submits.lock().unwrap().push_back(r);
    }

    pub(crate) fn statuses(self, script: Vec<Result<RemoteStatus, RemoteError>>) -> Self {
        self.statuses.lock().unwrap().extend(script);
        self
    }

    pub(crate) fn artifact(self, script: ArtifactScript) -> Self {
        *self.artifact.lock().unwrap() = Some(script);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub(crate) fn bodies(&self) -> Vec<SubmitBody> {
        self.bodies.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RemoteJobs for FakeRemote {
    fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, RemoteError> {
        self.record(format!("info {}", url));
        self.metadata
            .lock()
            .unwrap()
            .clone()
            .ok_or(RemoteError::Http {
                status: 404,
                body: String::new(),
            })
    }

    fn submit(&self, body: &SubmitBody) -> Result<RemoteJobHandle, RemoteError> {
        self.record("submit".to_string());
        self.bodies.lock().unwrap().push(body.clone());
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RemoteJobHandle::new("job")))
    }

    /// An exhausted script keeps answering `processing`.
    fn poll(&self, handle: &RemoteJobHandle) -> Result<RemoteStatus, RemoteError> {
        self.record(format!("poll {}", handle));
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(status(RemotePhase::Processing, 10.0)))
    }

    fn cancel(&self, handle: &RemoteJobHandle) -> Result<(), RemoteError> {
        self.record(format!("cancel {}", handle));
        Ok(())
    }

    fn fetch_artifact(&self, filename: &str) -> Result<ArtifactStream, RemoteError> {
        self.record(format!("fetch {}", filename));
        let script = self.artifact.lock().unwrap().clone();
        Ok(match script {
            None => return Err(RemoteError::Http { status: 404, body: String::new() }),
            Some(ArtifactScript::Bytes(data)) => {
                let len = data.len() as u64;
                ArtifactStream::from_reader(Box::new(io::Cursor::new(data)), Some(len))
            }
            Some(ArtifactScript::FailAfter { total, good }) => ArtifactStream::from_reader(
                Box::new(FailingReader { left: good }),
                Some(total),
            ),
            Some(ArtifactScript::CancelDuring { data, cancel }) => {
                let len = data.len() as u64;
                ArtifactStream::from_reader(
                    Box::new(CancelingReader {
                        data: io::Cursor::new(data),
                        cancel,
                        reads: 0,
                    }),
                    Some(len),
                )
            }
        })
    }
}

struct FailingReader {
    left: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.left == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let n = buf.len().min(self.left);
        buf[..n].fill(b'v');
        self.left -= n;
        Ok(n)
    }
}

struct CancelingReader {
    data: io::Cursor<Vec<u8>>,
    cancel: Arc<CancelToken>,
    reads: u32,
}

impl Read for CancelingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        if self.reads == 2 {
            self.cancel.cancel();
        }
        let n = buf.len().min(16);
        self.data.read(&mut buf[..n])
    }
}
