//! Remote client error type, classified by `retry::classify`.

/// Error returned by a remote call (transport failure, HTTP error, or bad payload).
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Curl reported an error (timeout, connection refused, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {status}{}", body_suffix(.body))]
    Http { status: u32, body: String },
    /// Body was not the JSON shape the protocol promises.
    #[error("could not decode {what}: {message}")]
    Decode { what: &'static str, message: String },
    /// The endpoint URL could not be built from the base URL.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    /// Local plumbing failure (e.g. transfer thread could not start).
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {}", body)
    }
}

const MAX_BODY_IN_ERROR: usize = 200;

/// Build an HTTP error keeping at most a short, printable prefix of the body.
pub(crate) fn http_error(status: u32, body: &[u8]) -> RemoteError {
    let text = String::from_utf8_lossy(body);
    let mut body: String = text.trim().chars().take(MAX_BODY_IN_ERROR).collect();
    if text.trim().chars().count() > MAX_BODY_IN_ERROR {
        body.push('…');
    }
    RemoteError::Http { status, body }
}
