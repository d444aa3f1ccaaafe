//! Remote job client: thin protocol adapter for the media processing server.
//!
//! Every operation is a single blocking HTTP exchange and independently
//! retryable by the caller (call from `spawn_blocking` in async code). Only
//! the orchestrator submits, polls, cancels and fetches artifacts; the UI may
//! call [`RemoteJobs::fetch_metadata`] directly.

mod error;
#[cfg(test)]
pub(crate) mod fake;
mod http;
mod stream;
mod types;

pub use error::RemoteError;
pub use http::CurlRemote;
pub use stream::ArtifactStream;
pub use types::{
    RemoteJobHandle, RemotePhase, RemoteStatus, SubmitBody, TaskStatusWire, VideoFormat,
    VideoMetadata,
};

/// The operations the core consumes from the remote server.
pub trait RemoteJobs: Send + Sync + 'static {
    /// `POST info` – title, duration and available formats for a source URL.
    fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, RemoteError>;

    /// `POST download/start` – create a remote job; returns its handle.
    fn submit(&self, body: &SubmitBody) -> Result<RemoteJobHandle, RemoteError>;

    /// `GET task/{id}` – current remote status snapshot.
    fn poll(&self, handle: &RemoteJobHandle) -> Result<RemoteStatus, RemoteError>;

    /// `POST download/cancel/{id}` – best effort; the remote may already be terminal.
    fn cancel(&self, handle: &RemoteJobHandle) -> Result<(), RemoteError>;

    /// `GET files/{filename}` – streamed artifact bytes (never buffered whole).
    fn fetch_artifact(&self, filename: &str) -> Result<ArtifactStream, RemoteError>;
}
