//! Remote base URL validation and normalization.

use url::Url;

/// Configuration problems that prevent a job from starting at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("remote base URL is not set")]
    MissingBaseUrl,
    #[error("remote base URL {url:?} is invalid: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Parses the configured base URL and makes sure its path ends with `/`, so
/// endpoint paths (`info`, `task/{id}`, ...) are appended rather than replacing
/// the last segment.
pub fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingBaseUrl);
    }
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: trimmed.to_string(),
        reason,
    };

    let mut url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
