//! Request, response, and failure shapes exchanged with a [`Fetch`](super::Fetch)
//! implementation.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use thiserror::Error;

/// A single call into the fetch primitive.
///
/// Mirrors the primitive's argument list one-to-one so an implementation can
/// forward every field without interpretation.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub payload: Option<Bytes>,
    pub method: Method,
    pub headers: HeaderMap,
    pub allow_truncated: bool,
    pub follow_redirects: bool,
    /// `None` leaves the platform default in place.
    pub deadline: Option<Duration>,
    pub validate_certificate: bool,
}

/// What the fetch primitive hands back on success.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub content: Bytes,
}

/// Failure kinds reported by the fetch primitive.
///
/// Callers match on the variant instead of inspecting error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The server certificate did not validate.
    #[error("SSL certificate validation failed: {0}")]
    CertificateInvalid(String),
    /// No response arrived before the deadline.
    #[error("deadline exceeded while waiting for HTTP response: {0}")]
    DeadlineExceeded(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Network level failure: DNS, refused connection, redirect loop, broken body.
    #[error("download error: {0}")]
    Download(String),
    #[error("response too large: {0}")]
    ResponseTooLarge(String),
    #[error("{0}")]
    Other(String),
}

impl FetchFailure {
    /// The message carried by the failure, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            FetchFailure::CertificateInvalid(m)
            | FetchFailure::DeadlineExceeded(m)
            | FetchFailure::InvalidUrl(m)
            | FetchFailure::Download(m)
            | FetchFailure::ResponseTooLarge(m)
            | FetchFailure::Other(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_includes_kind() {
        let failure = FetchFailure::DeadlineExceeded("5s elapsed".to_string());
        assert_eq!(
            failure.to_string(),
            "deadline exceeded while waiting for HTTP response: 5s elapsed"
        );
    }

    #[test]
    fn test_failure_message_strips_kind() {
        let failure = FetchFailure::CertificateInvalid("self-signed".to_string());
        assert_eq!(failure.message(), "self-signed");
    }

    #[test]
    fn test_other_failure_displays_bare_message() {
        let failure = FetchFailure::Other("boom".to_string());
        assert_eq!(failure.to_string(), "boom");
    }
}
