//! Platform-managed media folders: videos and music kept apart.

use std::io::Read;
use std::path::{Path, PathBuf};

use super::{absolute, write_into_dir, ArtifactLocation, ArtifactSink, ArtifactWrite, SinkError};
use crate::control::CancelToken;

#[derive(Debug, Clone)]
pub struct MediaLibrarySink {
    videos_dir: PathBuf,
    music_dir: PathBuf,
}

impl MediaLibrarySink {
    pub fn new(videos_dir: impl AsRef<Path>, music_dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self {
            videos_dir: absolute(videos_dir.as_ref().to_path_buf())?,
            music_dir: absolute(music_dir.as_ref().to_path_buf())?,
        })
    }

    /// XDG user dirs (`XDG_VIDEOS_DIR`, `XDG_MUSIC_DIR`), else `~/Videos` and `~/Music`.
    pub fn from_platform() -> Result<Self, SinkError> {
        let home = dirs::home_dir();
        let videos = dirs::video_dir().or_else(|| home.as_ref().map(|h| h.join("Videos")));
        let music = dirs::audio_dir().or_else(|| home.as_ref().map(|h| h.join("Music")));
        match (videos, music) {
            (Some(v), Some(m)) => Self::new(v, m),
            _ => Err(SinkError::NoTarget(
                "no home directory to place Videos/Music under".to_string(),
            )),
        }
    }

    /// Folder an artifact of this kind goes to.
    pub fn dir_for(&self, is_audio: bool) -> &Path {
        if is_audio {
            &self.music_dir
        } else {
            &self.videos_dir
        }
    }
}

impl ArtifactSink for MediaLibrarySink {
    fn write(
        &self,
        artifact: &ArtifactWrite,
        source: &mut dyn Read,
        progress: &mut dyn FnMut(u64),
        cancel: &CancelToken,
    ) -> Result<ArtifactLocation, SinkError> {
        write_into_dir(self.dir_for(artifact.is_audio), artifact, source, progress, cancel)
    }

    fn describe(&self) -> String {
        format!(
            "media library (videos: {}, music: {})",
            self.videos_dir.display(),
            self.music_dir.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn audio_and_video_go_to_separate_folders() {
        let root = tempfile::tempdir().unwrap();
        let sink = MediaLibrarySink::new(root.path().join("Videos"), root.path().join("Music")).unwrap();
        let song = ArtifactWrite {
            filename: "song".into(),
            mime_hint: "audio/mpeg".into(),
            is_audio: true,
            expected_len: None,
        };
        let loc = sink
            .write(&song, &mut Cursor::new(b"id3"), &mut |_| {}, &CancelToken::new())
            .unwrap();
        assert_eq!(loc.path(), root.path().join("Music").join("song.mp3"));

        let clip = ArtifactWrite {
            filename: "clip.mp4".into(),
            mime_hint: "video/mp4".into(),
            is_audio: false,
            expected_len: Some(4),
        };
        let loc = sink
            .write(&clip, &mut Cursor::new(b"moov"), &mut |_| {}, &CancelToken::new())
            .unwrap();
        assert_eq!(loc.path(), root.path().join("Videos").join("clip.mp4"));
    }
}
