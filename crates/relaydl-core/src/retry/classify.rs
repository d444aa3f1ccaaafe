//! Mapping of remote client errors onto [`ErrorKind`].

use std::io;

use crate::remote::RemoteError;
use crate::retry::policy::ErrorKind;

pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        ErrorKind::Timeout
    } else if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_send_error()
        || e.is_recv_error()
        || e.is_read_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        ErrorKind::Connection
    } else {
        ErrorKind::Other
    }
}

pub fn classify(e: &RemoteError) -> ErrorKind {
    match e {
        RemoteError::Curl(ce) => classify_curl_error(ce),
        RemoteError::Http { status, .. } => classify_http_status(*status),
        RemoteError::Io(io) if io.kind() == io::ErrorKind::TimedOut => ErrorKind::Timeout,
        RemoteError::Io(_) => ErrorKind::Connection,
        // A body we cannot read will not change on retry.
        RemoteError::Decode { .. } | RemoteError::Endpoint(_) => ErrorKind::Other,
    }
}
