//! User-designated folder target.

use std::io::Read;
use std::path::{Path, PathBuf};

use super::{absolute, write_into_dir, ArtifactLocation, ArtifactSink, ArtifactWrite, SinkError};
use crate::control::CancelToken;

/// Writes every artifact, audio or video, into one folder.
#[derive(Debug, Clone)]
pub struct FolderSink {
    dir: PathBuf,
}

impl FolderSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self {
            dir: absolute(dir.as_ref().to_path_buf())?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for FolderSink {
    fn write(
        &self,
        artifact: &ArtifactWrite,
        source: &mut dyn Read,
        progress: &mut dyn FnMut(u64),
        cancel: &CancelToken,
    ) -> Result<ArtifactLocation, SinkError> {
        write_into_dir(&self.dir, artifact, source, progress, cancel)
    }

    fn describe(&self) -> String {
        format!("folder {}", self.dir.display())
    }
}
