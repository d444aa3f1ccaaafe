//! Retry and backoff policy.
//!
//! Remote errors are classified into [`ErrorKind`]s. Submission and artifact
//! opening go through [`retry_remote`]; the poll loop instead tolerates
//! transient failures up to a [`FailureCeiling`].

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{CeilingDecision, ErrorKind, FailureCeiling, RetryDecision, RetryPolicy};
pub use run::{retry_remote, RetryStop};
