//! Control sockets: one per process hosting jobs (`relaydl get`), all in the
//! shared control dir so `relaydl cancel` and `relaydl history` can find them.
//!
//! Protocol, one command per line:
//! - `cancel <id>` answers `ok` or `unknown`
//! - `tokens` answers one live job token per line, then an empty line

use anyhow::{Context, Result};
use relaydl_core::control::JobControl;
use relaydl_core::ledger::EntryId;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);
const SOCKET_PREFIX: &str = "control-";
const SOCKET_SUFFIX: &str = ".sock";

pub fn socket_path_in(dir: &Path, pid: u32) -> PathBuf {
    dir.join(format!("{}{}{}", SOCKET_PREFIX, pid, SOCKET_SUFFIX))
}

/// This process's listening socket. The socket file is removed on drop.
pub struct ControlSocket {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl ControlSocket {
    /// Binds `control-<pid>.sock` in `dir` and serves `control` until dropped.
    pub fn bind(control: Arc<JobControl>, dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let path = socket_path_in(dir, std::process::id());
        let _ = std::fs::remove_file(&path);
        let listener =
            UnixListener::bind(&path).with_context(|| format!("bind {}", path.display()))?;
        let task = tokio::spawn(serve(listener, control));
        Ok(Self { path, task })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn serve(listener: UnixListener, control: Arc<JobControl>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let control = Arc::clone(&control);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, &control).await {
                        tracing::debug!("control client: {}", e);
                    }
                });
            }
            Err(e) => tracing::debug!("control socket accept: {}", e),
        }
    }
}

async fn handle_client(stream: UnixStream, control: &JobControl) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let reply = respond(control, line.trim());
        write.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

/// Newline-terminated reply to one command line.
fn respond(control: &JobControl, line: &str) -> String {
    if let Some(rest) = line.strip_prefix("cancel ") {
        return match rest.trim().parse::<EntryId>() {
            Ok(id) if control.request_cancel(id) => {
                tracing::info!(job_id = id, "cancel requested over control socket");
                "ok\n".to_string()
            }
            Ok(_) => "unknown\n".to_string(),
            Err(_) => "error bad id\n".to_string(),
        };
    }
    if line == "tokens" {
        let mut tokens: Vec<String> = control.live_tokens().into_iter().collect();
        tokens.sort();
        let mut out = String::new();
        for token in tokens {
            out.push_str(&token);
            out.push('\n');
        }
        out.push('\n');
        return out;
    }
    "error unknown command\n".to_string()
}

/// Control socket files currently in `dir`.
pub fn list_sockets(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SOCKET_PREFIX) && n.ends_with(SOCKET_SUFFIX))
        })
        .collect();
    paths.sort();
    paths
}

/// Result of talking to one peer socket.
enum Reply {
    Lines(Vec<String>),
    /// Socket file left by a dead process; removed.
    Stale,
    /// Something listens but did not answer in time.
    Unreachable,
}

/// Connects to a control socket. A socket nobody listens on is left over from
/// a dead process and gets removed.
async fn connect(path: &Path) -> Result<UnixStream, Reply> {
    match tokio::time::timeout(CLIENT_TIMEOUT, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e))
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            tracing::debug!(path = %path.display(), "removing stale control socket");
            let _ = std::fs::remove_file(path);
            Err(Reply::Stale)
        }
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), "control socket connect: {}", e);
            Err(Reply::Unreachable)
        }
        Err(_) => {
            tracing::warn!(path = %path.display(), "control socket connect timed out");
            Err(Reply::Unreachable)
        }
    }
}

/// Sends one command and collects reply lines up to an empty line (or just
/// the first line when `multi_line` is false).
async fn request(path: &Path, command: &str, multi_line: bool) -> Reply {
    let stream = match connect(path).await {
        Ok(stream) => stream,
        Err(reply) => return reply,
    };
    let exchange = async move {
        let (read, mut write) = stream.into_split();
        write.write_all(format!("{}\n", command).as_bytes()).await?;
        let mut lines = BufReader::new(read).lines();
        let mut reply = Vec::new();
        let mut terminated = false;
        while let Some(line) = lines.next_line().await? {
            if multi_line && line.is_empty() {
                terminated = true;
                break;
            }
            reply.push(line);
            if !multi_line {
                terminated = true;
                break;
            }
        }
        if !terminated {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "reply cut short"));
        }
        Ok::<_, io::Error>(reply)
    };
    match tokio::time::timeout(CLIENT_TIMEOUT, exchange).await {
        Ok(Ok(reply)) => Reply::Lines(reply),
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), "control request failed: {}", e);
            Reply::Unreachable
        }
        Err(_) => {
            tracing::warn!(path = %path.display(), "control request timed out");
            Reply::Unreachable
        }
    }
}

/// Asks every live process to cancel job `id`. True if one of them hosts it.
pub async fn send_cancel(dir: &Path, id: EntryId) -> bool {
    let command = format!("cancel {}", id);
    let mut found = false;
    for path in list_sockets(dir) {
        if let Reply::Lines(reply) = request(&path, &command, false).await {
            found |= reply.first().is_some_and(|l| l == "ok");
        }
    }
    found
}

/// Jobs hosted by other processes, as far as their sockets answered.
#[derive(Debug, Default)]
pub struct LiveTokens {
    pub tokens: HashSet<String>,
    /// Sockets of processes that did not answer. Their jobs are unknown.
    pub unreachable: Vec<PathBuf>,
}

impl LiveTokens {
    /// Whether every hosting process answered, so a token missing from
    /// `tokens` really belongs to no live job.
    pub fn is_complete(&self) -> bool {
        self.unreachable.is_empty()
    }
}

/// Job tokens of every job hosted by another live process.
pub async fn collect_live_tokens(dir: &Path) -> LiveTokens {
    let mut live = LiveTokens::default();
    for path in list_sockets(dir) {
        match request(&path, "tokens", true).await {
            Reply::Lines(reply) => live.tokens.extend(reply.into_iter().filter(|t| !t.is_empty())),
            Reply::Stale => {}
            Reply::Unreachable => live.unreachable.push(path),
        }
    }
    live
}
