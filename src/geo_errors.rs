//! # Geocoding Error Types Module
//!
//! This module defines the error types used by the geocoding gateway and
//! its upstream providers. Provider failures are classified once, at the
//! provider boundary, and the gateway folds them into the four outcomes
//! callers are allowed to see.

/// Errors returned by the geocoding gateway
#[derive(Debug, Clone, PartialEq)]
pub enum GeoError {
    /// Malformed input (empty address, out-of-range coordinates)
    InvalidArgument(String),
    /// Upstream had no match for the address
    NotFound,
    /// Transient upstream fault, the caller may retry
    UpstreamUnavailable(String),
    /// Bad credentials or exhausted quota, retrying will not help
    UpstreamConfigError(String),
}

impl GeoError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeoError::UpstreamUnavailable(_))
    }
}

impl std::fmt::Display for GeoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            GeoError::NotFound => write!(f, "No geocoding match"),
            GeoError::UpstreamUnavailable(msg) => write!(f, "Upstream unavailable: {msg}"),
            GeoError::UpstreamConfigError(msg) => write!(f, "Upstream configuration error: {msg}"),
        }
    }
}

impl std::error::Error for GeoError {}

/// Failure modes reported by an upstream provider
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Connection refused, reset, DNS failure
    Transport(String),
    /// No response within the configured timeout
    Timeout,
    /// Upstream answered with a server-side or throttling status
    Status(u16),
    /// Upstream rejected our credentials or request
    Rejected { status: u16, message: String },
    /// Response body did not have the expected shape
    MalformedResponse(String),
    /// No API key configured for an endpoint that needs one
    MissingApiKey,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "Transport error: {msg}"),
            ProviderError::Timeout => write!(f, "Upstream request timed out"),
            ProviderError::Status(code) => write!(f, "Upstream returned status {code}"),
            ProviderError::Rejected { status, message } => {
                write!(f, "Upstream rejected request with status {status}: {message}")
            }
            ProviderError::MalformedResponse(msg) => write!(f, "Malformed upstream response: {msg}"),
            ProviderError::MissingApiKey => write!(f, "No API key configured"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl From<ProviderError> for GeoError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transport(_)
            | ProviderError::Timeout
            | ProviderError::Status(_)
            | ProviderError::MalformedResponse(_) => GeoError::UpstreamUnavailable(err.to_string()),
            ProviderError::Rejected { .. } | ProviderError::MissingApiKey => {
                GeoError::UpstreamConfigError(err.to_string())
            }
        }
    }
}

/// Classify a non-success HTTP status from the upstream provider.
///
/// 5xx is transient, and so is 429: it signals short-term rate limiting.
/// An exhausted daily quota comes back from Yandex as 403 and, like a bad
/// key (401/403) or any other 4xx, is a configuration error that retrying
/// will not fix.
pub fn classify_status(status: u16, body: &str) -> ProviderError {
    if status >= 500 || status == 429 {
        ProviderError::Status(status)
    } else {
        let message: String = body.chars().take(200).collect();
        ProviderError::Rejected { status, message }
    }
}
