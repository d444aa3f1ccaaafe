//! Provisional artifact files.
//!
//! Bytes go to a hidden `.part` file in the target directory (preallocated
//! when the size is known), are fsynced, and only then linked under their final
//! name without overwriting anything. A staged file that is dropped without
//! being committed is deleted.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use super::naming::numbered_name;
use super::{ArtifactLocation, SinkError};
use crate::control::CancelToken;

/// Temporary file suffix used before the final link.
pub const TEMP_SUFFIX: &str = ".part";

const COPY_CHUNK: usize = 64 * 1024;
const MAX_CLASH_SUFFIX: u32 = 9999;

pub(crate) struct StagedFile {
    file: Option<File>,
    temp_path: PathBuf,
    dir: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Create a fresh provisional file inside `dir` (created if missing).
    pub(crate) fn create(dir: &Path) -> Result<Self, SinkError> {
        fs::create_dir_all(dir).map_err(|e| SinkError::io(format!("create {}", dir.display()), e))?;
        let temp_path = dir.join(format!(".relaydl-{}{}", uuid::Uuid::new_v4().simple(), TEMP_SUFFIX));
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| SinkError::io(format!("create {}", temp_path.display()), e))?;
        Ok(Self {
            file: Some(file),
            temp_path,
            dir: dir.to_path_buf(),
            committed: false,
        })
    }

    pub(crate) fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    fn file(&mut self) -> Result<&mut File, SinkError> {
        self.file
            .as_mut()
            .ok_or_else(|| SinkError::io("staged file", io::Error::from(io::ErrorKind::NotConnected)))
    }

    /// Reserve `size` bytes. On Unix tries `posix_fallocate` so a full disk fails
    /// up front; otherwise (or on failure) leaves the file sparse.
    pub(crate) fn preallocate(&mut self, size: u64) -> Result<(), SinkError> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let fd = self.file()?.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            match r {
                0 => return Ok(()),
                libc::ENOSPC => {
                    return Err(SinkError::io(
                        format!("reserve {} bytes", size),
                        io::Error::from_raw_os_error(r),
                    ))
                }
                _ => tracing::debug!(errno = r, "posix_fallocate failed, writing sparse"),
            }
        }
        Ok(())
    }

    /// Copy `source` into the file, checking `cancel` before every chunk and
    /// reporting the running byte count. Returns bytes copied.
    pub(crate) fn copy_from(
        &mut self,
        source: &mut dyn Read,
        expected_len: Option<u64>,
        progress: &mut dyn FnMut(u64),
        cancel: &CancelToken,
    ) -> Result<u64, SinkError> {
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut copied = 0u64;
        loop {
            if cancel.is_canceled() {
                return Err(SinkError::Aborted);
            }
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SinkError::Stream(e)),
            };
            self.file()?
                .write_all(&buf[..n])
                .map_err(|e| SinkError::io("write artifact", e))?;
            copied += n as u64;
            progress(copied);
        }
        if let Some(expected) = expected_len {
            if copied != expected {
                return Err(SinkError::ShortStream {
                    received: copied,
                    expected,
                });
            }
        }
        // Preallocation may have reserved more than arrived when no length was announced.
        self.file()?
            .set_len(copied)
            .map_err(|e| SinkError::io("truncate artifact", e))?;
        Ok(copied)
    }

    /// fsync, then publish under `final_name` (or `name (n).ext` if taken).
    pub(crate) fn commit(mut self, final_name: &str) -> Result<ArtifactLocation, SinkError> {
        let file = self
            .file
            .take()
            .ok_or_else(|| SinkError::io("staged file", io::Error::from(io::ErrorKind::NotConnected)))?;
        file.sync_all().map_err(|e| SinkError::io("sync artifact", e))?;
        drop(file);

        for n in 0..=MAX_CLASH_SUFFIX {
            let name = if n == 0 {
                final_name.to_string()
            } else {
                numbered_name(final_name, n)
            };
            let target = self.dir.join(&name);
            if link_no_clobber(&self.temp_path, &target)
                .map_err(|e| SinkError::io(format!("finalize {}", target.display()), e))?
            {
                self.committed = true;
                sync_dir(&self.dir);
                return Ok(ArtifactLocation::new(target));
            }
        }
        Err(SinkError::io(
            format!("finalize {}", final_name),
            io::Error::new(io::ErrorKind::AlreadyExists, "too many files with this name"),
        ))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        match fs::remove_file(&self.temp_path) {
            Ok(()) => tracing::debug!(path = %self.temp_path.display(), "discarded provisional artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.temp_path.display(), "could not remove provisional artifact: {}", e),
        }
    }
}

/// Place `temp` at `target` unless `target` exists. Returns false on a clash.
fn link_no_clobber(temp: &Path, target: &Path) -> io::Result<bool> {
    match fs::hard_link(temp, target) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(temp) {
                tracing::warn!(path = %temp.display(), "could not remove staged link: {}", e);
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => {
            // Filesystems without hard links (FAT, some FUSE mounts).
            tracing::debug!("hard link failed ({}), falling back to rename", e);
            if fs::symlink_metadata(target).is_ok() {
                return Ok(false);
            }
            fs::rename(temp, target)?;
            Ok(true)
        }
    }
}

fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), "directory fsync failed: {}", e);
    }
}
