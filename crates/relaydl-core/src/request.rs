//! Job requests and format negotiation.
//!
//! A [`JobRequest`] is what the UI asks for; [`JobRequest::validate`] turns it
//! into exactly one [`FormatSelection`] and the wire body for `download/start`.

use crate::ledger::NewEntry;
use crate::remote::{SubmitBody, VideoMetadata};

const UNKNOWN_UPLOADER: &str = "Unknown";

/// Input to start a download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRequest {
    pub source_url: String,
    pub audio_only: bool,
    /// Explicit remote format id; excludes `desired_height`.
    pub format_selector: Option<String>,
    /// Target height in pixels, for video without an explicit format.
    pub desired_height: Option<u32>,
    /// Audio container/codec (e.g. `mp3`) for audio-only jobs.
    pub audio_format: Option<String>,
}

/// Ill-formed request; the job never starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("source URL is empty")]
    EmptyUrl,
    #[error("a format id and a height cannot both be selected")]
    FormatWithHeight,
    #[error("audio-only jobs cannot select a video height")]
    AudioWithHeight,
    #[error("height must be greater than zero")]
    ZeroHeight,
    #[error("format id is blank")]
    BlankFormat,
    #[error("no format selected: give a format id, a height, or audio-only")]
    NothingSelected,
}

/// The single, unambiguous way a job negotiates its remote format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSelection {
    /// Explicit format id. `audio_only` marks an audio format id.
    Explicit { format_id: String, audio_only: bool },
    Height(u32),
    Audio { audio_format: Option<String> },
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub source_url: String,
    pub selection: FormatSelection,
}

fn non_blank(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl JobRequest {
    pub fn validate(&self) -> Result<ValidatedRequest, RequestError> {
        let source_url = self.source_url.trim();
        if source_url.is_empty() {
            return Err(RequestError::EmptyUrl);
        }
        if let Some(f) = &self.format_selector {
            if f.trim().is_empty() {
                return Err(RequestError::BlankFormat);
            }
        }
        if self.desired_height == Some(0) {
            return Err(RequestError::ZeroHeight);
        }

        let selection = match (non_blank(&self.format_selector), self.desired_height, self.audio_only) {
            (Some(_), Some(_), _) => return Err(RequestError::FormatWithHeight),
            (None, Some(_), true) => return Err(RequestError::AudioWithHeight),
            (Some(format_id), None, audio_only) => FormatSelection::Explicit {
                format_id,
                audio_only,
            },
            (None, Some(h), false) => FormatSelection::Height(h),
            (None, None, true) => FormatSelection::Audio {
                audio_format: non_blank(&self.audio_format),
            },
            (None, None, false) => return Err(RequestError::NothingSelected),
        };
        Ok(ValidatedRequest {
            source_url: source_url.to_string(),
            selection,
        })
    }
}

impl ValidatedRequest {
    pub fn is_audio(&self) -> bool {
        match &self.selection {
            FormatSelection::Explicit { audio_only, .. } => *audio_only,
            FormatSelection::Height(_) => false,
            FormatSelection::Audio { .. } => true,
        }
    }

    /// Mime hint handed to the sink.
    pub fn mime_hint(&self) -> &'static str {
        if self.is_audio() {
            "audio/mpeg"
        } else {
            "video/mp4"
        }
    }

    /// Wire body for `download/start`.
    pub fn submit_body(&self) -> SubmitBody {
        let url = self.source_url.clone();
        match &self.selection {
            FormatSelection::Explicit {
                format_id,
                audio_only,
            } => SubmitBody {
                url,
                format: Some(format_id.clone()),
                audio_only: *audio_only,
                audio_format: None,
                quality: None,
            },
            FormatSelection::Height(h) => SubmitBody {
                url,
                format: None,
                audio_only: false,
                audio_format: None,
                quality: Some(*h),
            },
            FormatSelection::Audio { audio_format } => SubmitBody {
                url,
                format: None,
                audio_only: true,
                audio_format: audio_format.clone(),
                quality: None,
            },
        }
    }
}

/// Human metadata shown in history. Missing values fall back to the URL / "Unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobLabel {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
}

impl JobLabel {
    pub fn from_metadata(meta: &VideoMetadata) -> Self {
        Self {
            title: meta.title.clone(),
            uploader: meta.uploader_or_channel().map(str::to_string),
            thumbnail: meta.thumbnail.clone(),
        }
    }

    pub(crate) fn to_new_entry(&self, request: &ValidatedRequest, job_token: &str) -> NewEntry {
        NewEntry {
            source_url: request.source_url.clone(),
            title: non_blank(&self.title).unwrap_or_else(|| request.source_url.clone()),
            uploader: non_blank(&self.uploader).unwrap_or_else(|| UNKNOWN_UPLOADER.to_string()),
            thumbnail: non_blank(&self.thumbnail),
            is_audio: request.is_audio(),
            job_token: Some(job_token.to_string()),
        }
    }
}
