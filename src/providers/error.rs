use std::fmt;

/// Classified upstream error — tells the caller *why* the LLM call failed.
/// The gateway never retries; the classification feeds logging and the
/// status/body pair is copied through to the client.
#[derive(Debug)]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub status: Option<u16>,
    /// Raw response body (or transport error text), relayed verbatim to the
    /// client in the `details` field.
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// 401/403 — bad API key or permissions.
    Auth,
    /// 429 — rate limited.
    RateLimit,
    /// 404 or "model not found" — bad model name.
    NotFound,
    /// 408 or provider took too long.
    Timeout,
    /// Connection refused, DNS failure, reset, etc.
    Network,
    /// 500/502/503/504 — provider-side outage, or an unparseable 2xx body.
    ServerError,
    /// Anything else.
    Unknown,
}

impl UpstreamError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => UpstreamErrorKind::Auth,
            404 => UpstreamErrorKind::NotFound,
            408 => UpstreamErrorKind::Timeout,
            429 => UpstreamErrorKind::RateLimit,
            500 | 502 | 503 | 504 => UpstreamErrorKind::ServerError,
            _ => UpstreamErrorKind::Unknown,
        };
        Self {
            kind,
            status: Some(status),
            body: body.to_string(),
        }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            UpstreamErrorKind::Timeout
        } else {
            UpstreamErrorKind::Network
        };
        Self {
            kind,
            status: None,
            body: err.to_string(),
        }
    }

    /// A 2xx response whose body could not be understood.
    pub fn malformed(detail: &str) -> Self {
        Self {
            kind: UpstreamErrorKind::ServerError,
            status: Some(200),
            body: format!("Malformed response from upstream: {}", detail),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = crate::utils::truncate_str(&self.body, 300);
        if let Some(status) = self.status {
            write!(f, "Upstream error ({}, {:?}): {}", status, self.kind, summary)
        } else {
            write!(f, "Upstream error ({:?}): {}", self.kind, summary)
        }
    }
}

impl std::error::Error for UpstreamError {}
