//! Errors surfaced by a connection.

use bytes::Bytes;
use thiserror::Error;

use crate::fetch::FetchFailure;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything a connection can fail with.
///
/// Fetch failures keep the original [`FetchFailure`] as their source.
/// Status-derived variants keep the raw response body.
#[derive(Debug, Error)]
pub enum Error {
    /// Construction-time configuration problem. Not retryable.
    #[error("improperly configured: {0}")]
    ImproperlyConfigured(String),

    #[error("SSL error ({info}): {message}")]
    Ssl {
        info: &'static str,
        message: String,
        source: FetchFailure,
    },

    #[error("connection timeout ({info}): {message}")]
    ConnectionTimeout {
        info: &'static str,
        message: String,
        source: FetchFailure,
    },

    #[error("connection error ({info}): {message}")]
    Connection {
        info: &'static str,
        message: String,
        source: FetchFailure,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// 400
    #[error("request error ({status}): {error}")]
    Request { status: u16, error: String, body: Bytes },

    /// 401
    #[error("authentication error ({status}): {error}")]
    Authentication { status: u16, error: String, body: Bytes },

    /// 403
    #[error("authorization error ({status}): {error}")]
    Authorization { status: u16, error: String, body: Bytes },

    /// 404
    #[error("not found ({status}): {error}")]
    NotFound { status: u16, error: String, body: Bytes },

    /// 409
    #[error("conflict ({status}): {error}")]
    Conflict { status: u16, error: String, body: Bytes },

    /// Any other status outside 2xx.
    #[error("transport error ({status}): {error}")]
    Transport { status: u16, error: String, body: Bytes },
}

impl Error {
    /// The HTTP status behind a status-derived error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Request { status, .. }
            | Error::Authentication { status, .. }
            | Error::Authorization { status, .. }
            | Error::NotFound { status, .. }
            | Error::Conflict { status, .. }
            | Error::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The fetch failure behind a network-level error.
    pub fn fetch_failure(&self) -> Option<&FetchFailure> {
        match self {
            Error::Ssl { source, .. }
            | Error::ConnectionTimeout { source, .. }
            | Error::Connection { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The raw response body behind a status-derived error.
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Error::Request { body, .. }
            | Error::Authentication { body, .. }
            | Error::Authorization { body, .. }
            | Error::NotFound { body, .. }
            | Error::Conflict { body, .. }
            | Error::Transport { body, .. } => Some(body),
            _ => None,
        }
    }
}
