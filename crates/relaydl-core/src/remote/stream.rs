//! Streaming artifact body.
//!
//! The curl transfer runs on its own thread and pushes body chunks through a
//! bounded channel, so the sink reads at its own pace and memory stays bounded.
//! Dropping the stream makes the transfer thread abort at its next chunk.

use std::io::{self, Read};
use std::sync::mpsc::Receiver;

/// Chunks in flight between the transfer thread and the reader.
pub(crate) const STREAM_CHANNEL_DEPTH: usize = 32;

/// Message from the transfer thread.
pub(crate) enum StreamMsg {
    /// First body bytes are about to follow; sent once, after a 2xx status.
    Headers { content_length: Option<u64> },
    Chunk(Vec<u8>),
    /// Transfer finished: final HTTP status, or the curl error.
    End(Result<u32, curl::Error>),
}

/// Readable artifact body with its announced length, if any.
pub struct ArtifactStream {
    inner: Box<dyn Read + Send>,
    content_length: Option<u64>,
}

impl ArtifactStream {
    /// Wrap any reader (used by fakes and tests).
    pub fn from_reader(reader: Box<dyn Read + Send>, content_length: Option<u64>) -> Self {
        Self {
            inner: reader,
            content_length,
        }
    }

    pub(crate) fn from_channel(rx: Receiver<StreamMsg>, content_length: Option<u64>) -> Self {
        Self {
            inner: Box::new(ChannelReader {
                rx,
                buf: Vec::new(),
                pos: 0,
                received: 0,
                expected: content_length,
                done: false,
            }),
            content_length,
        }
    }

    /// Total size in bytes if the remote announced it.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

impl Read for ArtifactStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.inner.read(out)
    }
}

struct ChannelReader {
    rx: Receiver<StreamMsg>,
    buf: Vec<u8>,
    pos: usize,
    received: u64,
    expected: Option<u64>,
    done: bool,
}

impl ChannelReader {
    fn finish(&mut self, end: Result<u32, curl::Error>) -> io::Result<usize> {
        self.done = true;
        match end {
            Ok(status) if !(200..300).contains(&status) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("artifact transfer ended with HTTP {}", status),
            )),
            Ok(_) => match self.expected {
                Some(exp) if self.received != exp => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("partial transfer: received {} of {} bytes", self.received, exp),
                )),
                _ => Ok(0),
            },
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.buf.len() {
                let n = out.len().min(self.buf.len() - self.pos);
                out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(StreamMsg::Chunk(chunk)) => {
                    self.received += chunk.len() as u64;
                    self.buf = chunk;
                    self.pos = 0;
                }
                Ok(StreamMsg::Headers { .. }) => {}
                Ok(StreamMsg::End(end)) => return self.finish(end),
                Err(_) => {
                    self.done = true;
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "artifact transfer thread exited without finishing",
                    ));
                }
            }
        }
    }
}
