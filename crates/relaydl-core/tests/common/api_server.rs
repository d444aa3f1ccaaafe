//! Minimal HTTP/1.1 server scripting the remote job API for integration tests.
//!
//! Serves `info`, `download/start`, `task/{id}`, `download/cancel/{id}` and
//! `files/{name}` (HEAD and GET). Every request is logged as
//! `"METHOD /path"` so tests can assert on the call sequence.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiScript {
    /// JSON body answered to `POST info`.
    pub info: String,
    /// Status code and JSON body for `POST download/start`.
    pub start: (u16, String),
    /// Successive `GET task/{id}` bodies; the last one repeats.
    pub statuses: Vec<String>,
    /// Artifacts by name.
    pub files: HashMap<String, Vec<u8>>,
    /// Announce the full length but close after this many body bytes.
    pub truncate_files_at: Option<usize>,
}

impl Default for ApiScript {
    fn default() -> Self {
        Self {
            info: r#"{"title":"untitled","formats":[]}"#.to_string(),
            start: (200, r#"{"task_id":"abc"}"#.to_string()),
            statuses: vec![r#"{"status":"processing","progress":0}"#.to_string()],
            files: HashMap::new(),
            truncate_files_at: None,
        }
    }
}

struct State {
    script: ApiScript,
    statuses: VecDeque<String>,
    log: Vec<String>,
    bodies: Vec<String>,
}

#[derive(Clone)]
pub struct ApiServer {
    pub base_url: String,
    state: Arc<Mutex<State>>,
}

impl ApiServer {
    /// Request lines seen so far, e.g. `"GET /task/abc"`.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|l| l.starts_with(prefix)).count()
    }

    /// Request bodies of POST calls, in order.
    pub fn bodies(&self) -> Vec<String> {
        self.state.lock().unwrap().bodies.clone()
    }
}

/// Starts the server on a background thread. Runs until the process exits.
pub fn start(script: ApiScript) -> ApiServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(State {
        statuses: script.statuses.iter().cloned().collect(),
        script,
        log: Vec::new(),
        bodies: Vec::new(),
    }));
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &state));
        }
    });
    ApiServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        state,
    }
}

/// A base URL nothing listens on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/", port)
}

struct Request {
    method: String,
    path: String,
    body: String,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = percent_decode(first.next()?);
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    Some(Request {
        method,
        path,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
            if let Ok(v) = u8::from_str_radix(hex, 16) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn respond(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        content_type,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    let mut st = state.lock().unwrap();
    st.log.push(format!("{} {}", req.method, req.path));
    if req.method == "POST" {
        st.bodies.push(req.body.clone());
    }
    let segments: Vec<&str> = req.path.trim_start_matches('/').split('/').collect();
    const JSON: &str = "application/json";

    match (req.method.as_str(), segments.as_slice()) {
        ("POST", ["info"]) => {
            let body = st.script.info.clone();
            drop(st);
            respond(&mut stream, 200, JSON, body.as_bytes());
        }
        ("POST", ["download", "start"]) => {
            let (code, body) = st.script.start.clone();
            drop(st);
            respond(&mut stream, code, JSON, body.as_bytes());
        }
        ("GET", ["task", _id]) => {
            let body = if st.statuses.len() > 1 {
                st.statuses.pop_front().unwrap_or_default()
            } else {
                st.statuses.front().cloned().unwrap_or_default()
            };
            drop(st);
            respond(&mut stream, 200, JSON, body.as_bytes());
        }
        ("POST", ["download", "cancel", _id]) => {
            drop(st);
            respond(&mut stream, 200, JSON, br#"{"ok":true}"#);
        }
        (method @ ("GET" | "HEAD"), ["files", name]) => {
            let file = st.script.files.get(*name).cloned();
            let truncate = st.script.truncate_files_at;
            drop(st);
            let Some(file) = file else {
                respond(&mut stream, 404, JSON, br#"{"detail":"not found"}"#);
                return;
            };
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                file.len()
            );
            let _ = stream.write_all(head.as_bytes());
            if method == "GET" {
                let end = truncate.unwrap_or(file.len()).min(file.len());
                let _ = stream.write_all(&file[..end]);
            }
        }
        _ => {
            drop(st);
            respond(&mut stream, 404, JSON, br#"{"detail":"no route"}"#);
        }
    }
}
