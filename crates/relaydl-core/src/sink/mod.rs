//! Artifact sinks: where finished bytes end up.
//!
//! Both implementations share one contract: bytes are staged in a provisional
//! file and become visible under their final name only after the whole stream
//! has been copied and synced. Any failure removes the provisional file.

mod folder;
mod library;
pub mod naming;
mod staged;

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::control::CancelToken;

pub use folder::FolderSink;
pub use library::MediaLibrarySink;
pub use staged::TEMP_SUFFIX;

/// Describes the artifact being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactWrite {
    /// Name reported by the remote; sanitized by the sink.
    pub filename: String,
    pub mime_hint: String,
    pub is_audio: bool,
    /// Announced size, if any. A stream ending before it is a failure.
    pub expected_len: Option<u64>,
}

/// Absolute path of a finalized artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation(PathBuf);

impl ArtifactLocation {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn into_path(self) -> PathBuf {
        self.0
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// No usable target directory could be determined.
    #[error("no target folder: {0}")]
    NoTarget(String),
    /// Local write, sync or rename failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    /// Reading the artifact stream failed (network interruption mid-stream).
    #[error("artifact stream failed: {0}")]
    Stream(#[source] io::Error),
    #[error("artifact stream ended after {received} of {expected} bytes")]
    ShortStream { received: u64, expected: u64 },
    /// Cancellation was requested during the copy.
    #[error("transfer aborted")]
    Aborted,
}

impl SinkError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        SinkError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Destination for completed downloads. Blocking; call from `spawn_blocking`.
pub trait ArtifactSink: Send + Sync {
    /// Copy `source` to a provisional artifact and finalize it. `progress`
    /// receives the running byte count; `cancel` is checked at every chunk.
    fn write(
        &self,
        artifact: &ArtifactWrite,
        source: &mut dyn Read,
        progress: &mut dyn FnMut(u64),
        cancel: &CancelToken,
    ) -> Result<ArtifactLocation, SinkError>;

    /// Human description for logs.
    fn describe(&self) -> String;
}

/// Stage `source` into `dir` and commit it under the sanitized artifact name.
pub(crate) fn write_into_dir(
    dir: &Path,
    artifact: &ArtifactWrite,
    source: &mut dyn Read,
    progress: &mut dyn FnMut(u64),
    cancel: &CancelToken,
) -> Result<ArtifactLocation, SinkError> {
    let final_name = naming::artifact_file_name(&artifact.filename, &artifact.mime_hint);
    let mut staged = staged::StagedFile::create(dir)?;
    if let Some(len) = artifact.expected_len {
        staged.preallocate(len)?;
    }
    let copied = staged.copy_from(source, artifact.expected_len, progress, cancel)?;
    let location = staged.commit(&final_name)?;
    tracing::debug!(bytes = copied, location = %location, "artifact finalized");
    Ok(location)
}

/// Delete a finalized artifact. A file that is already gone is not an error.
pub async fn remove_artifact(path: &Path) -> Result<(), SinkError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::info!(path = %path.display(), "artifact deleted");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SinkError::io(format!("delete {}", path.display()), e)),
    }
}

fn absolute(dir: PathBuf) -> Result<PathBuf, SinkError> {
    if dir.is_absolute() {
        return Ok(dir);
    }
    let cwd = std::env::current_dir().map_err(|e| SinkError::io("resolve current directory", e))?;
    Ok(cwd.join(dir))
}

/// Sink for a job given the configured download location: the user folder when
/// set, platform media folders otherwise.
pub fn sink_for_location(location: Option<&str>) -> Result<Arc<dyn ArtifactSink>, SinkError> {
    match location.map(str::trim).filter(|l| !l.is_empty()) {
        Some(dir) => Ok(Arc::new(FolderSink::new(dir)?)),
        None => Ok(Arc::new(MediaLibrarySink::from_platform()?)),
    }
}
