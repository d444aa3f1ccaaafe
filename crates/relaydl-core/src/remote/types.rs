//! Wire types of the remote protocol and their normalized counterparts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST info`.
#[derive(Debug, Serialize)]
pub(crate) struct InfoRequest<'a> {
    pub url: &'a str,
}

/// One format entry of a metadata response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub resolution: Option<String>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub fps: Option<f64>,
    pub filesize: Option<u64>,
}

impl VideoFormat {
    /// True when the format carries a video stream.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().map_or(true, |v| v != "none")
    }
}

/// Metadata returned by `POST info`. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoMetadata {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub channel_id: Option<String>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub is_live: Option<bool>,
    pub formats: Vec<VideoFormat>,
}

impl VideoMetadata {
    /// Distinct video heights offered by the remote, highest first.
    pub fn available_heights(&self) -> Vec<u32> {
        let mut heights: Vec<u32> = self
            .formats
            .iter()
            .filter(|f| f.has_video())
            .filter_map(|f| f.height)
            .filter(|h| *h > 0)
            .collect();
        heights.sort_unstable_by(|a, b| b.cmp(a));
        heights.dedup();
        heights
    }

    /// Uploader, falling back to the channel name.
    pub fn uploader_or_channel(&self) -> Option<&str> {
        self.uploader
            .as_deref()
            .or(self.channel.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Body of `POST download/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitBody {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub audio_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    /// Target video height in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
}

/// Response of `POST download/start`.
#[derive(Debug, Deserialize)]
pub(crate) struct TaskStartResponse {
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Opaque identifier the remote assigned to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteJobHandle(String);

impl RemoteJobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteJobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw `GET task/{id}` payload. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskStatusWire {
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub filename: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: Option<u64>,
}

/// Normalized remote job phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePhase {
    Queued,
    Processing,
    Downloading,
    Completed,
    Error,
}

impl RemotePhase {
    /// Missing status reads as queued; unrecognized values as processing.
    pub fn from_wire(status: Option<&str>) -> Self {
        let Some(s) = status.map(str::trim).filter(|s| !s.is_empty()) else {
            return RemotePhase::Queued;
        };
        match s.to_ascii_lowercase().as_str() {
            "queued" | "pending" => RemotePhase::Queued,
            "processing" => RemotePhase::Processing,
            "downloading" => RemotePhase::Downloading,
            "completed" | "finished" => RemotePhase::Completed,
            "error" | "failed" => RemotePhase::Error,
            _ => RemotePhase::Processing,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RemotePhase::Completed | RemotePhase::Error)
    }
}

/// One poll result, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStatus {
    pub phase: RemotePhase,
    /// Remote progress in [0, 100].
    pub percent: f64,
    pub message: Option<String>,
    /// Artifact name, present only when `phase == Completed`.
    pub result_filename: Option<String>,
    pub transfer_rate: Option<String>,
    pub eta: Option<String>,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: Option<u64>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl From<TaskStatusWire> for RemoteStatus {
    fn from(w: TaskStatusWire) -> Self {
        let phase = RemotePhase::from_wire(w.status.as_deref());
        let percent = match w.progress {
            Some(p) if p.is_finite() => p.clamp(0.0, 100.0),
            _ => 0.0,
        };
        let result_filename = if phase == RemotePhase::Completed {
            non_blank(w.filename)
        } else {
            None
        };
        Self {
            phase,
            percent,
            message: non_blank(w.message),
            result_filename,
            transfer_rate: non_blank(w.speed),
            eta: non_blank(w.eta),
            total_bytes: w.total_bytes,
            downloaded_bytes: w.downloaded_bytes,
        }
    }
}
