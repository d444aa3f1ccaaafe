//! libcurl-backed implementation of [`RemoteJobs`].

use std::cell::{Cell, RefCell};
use std::str;
use std::sync::mpsc::{self, SyncSender};
use std::time::Duration;

use curl::easy::{Easy, List};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::http_error;
use super::stream::{StreamMsg, STREAM_CHANNEL_DEPTH};
use super::types::{InfoRequest, TaskStartResponse, TaskStatusWire};
use super::{
    ArtifactStream, RemoteError, RemoteJobHandle, RemoteJobs, RemoteStatus, SubmitBody,
    VideoMetadata,
};
use crate::config::TimeoutConfig;

/// Remote job client speaking the JSON API under a normalized base URL.
#[derive(Debug, Clone)]
pub struct CurlRemote {
    base: Url,
    timeouts: TimeoutConfig,
}

/// Status line and length of the response currently being received.
#[derive(Debug, Default)]
struct ResponseHead {
    status: u32,
    content_length: Option<u64>,
}

impl ResponseHead {
    /// Feed one raw header line. A new status line (redirect hop) resets the state.
    fn observe(&mut self, raw: &[u8]) {
        let Ok(line) = str::from_utf8(raw) else {
            return;
        };
        let line = line.trim();
        if line.starts_with("HTTP/") {
            self.status = line
                .split_whitespace()
                .nth(1)
                .and_then(|c| c.parse().ok())
                .unwrap_or(0);
            self.content_length = None;
        } else if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse().ok();
            }
        }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

enum Method {
    Get,
    Post(Vec<u8>),
}

impl CurlRemote {
    /// `base` must already be normalized (trailing `/`); see `config::normalize_base_url`.
    pub fn new(base: Url, timeouts: TimeoutConfig) -> Self {
        Self { base, timeouts }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append path segments (percent-encoded) to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<String, RemoteError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Endpoint(format!("{} cannot be a base URL", self.base)))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url.into())
    }

    fn base_easy(&self, url: &str) -> Result<Easy, RemoteError> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(Duration::from_secs(self.timeouts.connect_secs))?;
        Ok(easy)
    }

    /// One JSON exchange; returns the raw 2xx body.
    fn exchange(&self, url: &str, method: Method) -> Result<Vec<u8>, RemoteError> {
        let mut easy = self.base_easy(url)?;
        easy.timeout(Duration::from_secs(self.timeouts.request_secs))?;
        let mut headers = List::new();
        headers.append("Accept: application/json")?;
        if let Method::Post(body) = &method {
            headers.append("Content-Type: application/json")?;
            easy.post(true)?;
            easy.post_fields_copy(body)?;
        }
        easy.http_headers(headers)?;

        let mut body = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }
        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(http_error(code, &body));
        }
        Ok(body)
    }

    fn decode<T: DeserializeOwned>(body: &[u8], what: &'static str) -> Result<T, RemoteError> {
        serde_json::from_slice(body).map_err(|e| RemoteError::Decode {
            what,
            message: e.to_string(),
        })
    }

    fn encode<T: serde::Serialize>(value: &T, what: &'static str) -> Result<Vec<u8>, RemoteError> {
        serde_json::to_vec(value).map_err(|e| RemoteError::Decode {
            what,
            message: e.to_string(),
        })
    }

    /// HEAD the artifact for its size. Any failure just means "unknown".
    fn head_size(&self, url: &str) -> Option<u64> {
        let lookup = || -> Result<Option<u64>, RemoteError> {
            let mut easy = self.base_easy(url)?;
            easy.nobody(true)?;
            easy.timeout(Duration::from_secs(self.timeouts.request_secs))?;
            let mut head = ResponseHead::default();
            {
                let mut transfer = easy.transfer();
                transfer.header_function(|line| {
                    head.observe(line);
                    true
                })?;
                transfer.perform()?;
            }
            Ok(head.is_success().then_some(head.content_length).flatten())
        };
        match lookup() {
            Ok(size) => size,
            Err(e) => {
                tracing::debug!(url, "artifact size lookup failed: {}", e);
                None
            }
        }
    }
}

impl RemoteJobs for CurlRemote {
    fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, RemoteError> {
        let endpoint = self.endpoint(&["info"])?;
        let body = Self::encode(&InfoRequest { url }, "info request")?;
        tracing::debug!(endpoint, "fetching metadata");
        let raw = self.exchange(&endpoint, Method::Post(body))?;
        Self::decode(&raw, "video info")
    }

    fn submit(&self, body: &SubmitBody) -> Result<RemoteJobHandle, RemoteError> {
        let endpoint = self.endpoint(&["download", "start"])?;
        let payload = Self::encode(body, "download request")?;
        let raw = self.exchange(&endpoint, Method::Post(payload))?;
        let resp: TaskStartResponse = Self::decode(&raw, "download start response")?;
        match resp.task_id.map(|t| t.trim().to_string()) {
            Some(id) if !id.is_empty() => {
                tracing::debug!(task_id = %id, "remote job created");
                Ok(RemoteJobHandle::new(id))
            }
            _ => Err(RemoteError::Decode {
                what: "download start response",
                message: "missing task_id".to_string(),
            }),
        }
    }

    fn poll(&self, handle: &RemoteJobHandle) -> Result<RemoteStatus, RemoteError> {
        let endpoint = self.endpoint(&["task", handle.as_str()])?;
        let raw = self.exchange(&endpoint, Method::Get)?;
        let wire: TaskStatusWire = Self::decode(&raw, "task status")?;
        Ok(wire.into())
    }

    fn cancel(&self, handle: &RemoteJobHandle) -> Result<(), RemoteError> {
        let endpoint = self.endpoint(&["download", "cancel", handle.as_str()])?;
        self.exchange(&endpoint, Method::Post(Vec::new()))?;
        Ok(())
    }

    fn fetch_artifact(&self, filename: &str) -> Result<ArtifactStream, RemoteError> {
        let endpoint = self.endpoint(&["files", filename])?;
        let size = self.head_size(&endpoint);
        let total_timeout = self.timeouts.artifact_timeout(size);
        tracing::debug!(endpoint, ?size, ?total_timeout, "opening artifact stream");

        let mut easy = self.base_easy(&endpoint)?;
        easy.low_speed_limit(self.timeouts.low_speed_bytes_per_sec)?;
        easy.low_speed_time(Duration::from_secs(self.timeouts.low_speed_secs))?;
        if let Some(t) = total_timeout {
            easy.timeout(t)?;
        }

        let (tx, rx) = mpsc::sync_channel(STREAM_CHANNEL_DEPTH);
        std::thread::Builder::new()
            .name("relaydl-artifact".to_string())
            .spawn(move || run_transfer(easy, tx))?;

        match rx.recv() {
            Ok(StreamMsg::Headers { content_length }) => {
                Ok(ArtifactStream::from_channel(rx, content_length.or(size)))
            }
            Ok(StreamMsg::End(Ok(code))) if (200..300).contains(&code) => {
                Ok(ArtifactStream::from_reader(Box::new(std::io::empty()), Some(0)))
            }
            Ok(StreamMsg::End(Ok(code))) => Err(http_error(code, &[])),
            Ok(StreamMsg::End(Err(e))) => Err(RemoteError::Curl(e)),
            Ok(StreamMsg::Chunk(_)) | Err(_) => Err(RemoteError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "artifact transfer thread exited without a response",
            ))),
        }
    }
}

/// Transfer loop on the dedicated thread. Error bodies are discarded; a
/// dropped receiver aborts the transfer at the next chunk.
fn run_transfer(mut easy: Easy, tx: SyncSender<StreamMsg>) {
    let head = RefCell::new(ResponseHead::default());
    let announced = Cell::new(false);
    let result = (|| -> Result<u32, curl::Error> {
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|line| {
                head.borrow_mut().observe(line);
                true
            })?;
            transfer.write_function(|data| {
                let head = head.borrow();
                if !head.is_success() {
                    return Ok(data.len());
                }
                if !announced.get() {
                    announced.set(true);
                    let msg = StreamMsg::Headers {
                        content_length: head.content_length,
                    };
                    if tx.send(msg).is_err() {
                        return Ok(0);
                    }
                }
                match tx.send(StreamMsg::Chunk(data.to_vec())) {
                    Ok(()) => Ok(data.len()),
                    Err(_) => Ok(0),
                }
            })?;
            transfer.perform()?;
        }
        easy.response_code()
    })();
    if let Err(e) = &result {
        tracing::debug!("artifact transfer ended: {}", e);
    }
    let _ = tx.send(StreamMsg::End(result));
}
