//! The base connection contract shared by every transport: the
//! [`Connection`] trait, url-prefix handling, request logging, and the
//! status-to-error mapping.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::fetch::FetchFailure;

/// Target for curl-style request traces.
pub const TRACE_TARGET: &str = "urlfetch::trace";

/// Status, headers, and raw body of a completed request.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn into_parts(self) -> (u16, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}

/// A blocking connection to one search node.
pub trait Connection: Send + Sync {
    /// `scheme://host:port/prefix`, prepended to every request path.
    fn base_url(&self) -> &str;

    /// Sends one request and returns its response.
    ///
    /// `params` are form-encoded onto the query string in order. A status
    /// outside `200..300` fails with a status-derived [`Error`] unless it is
    /// listed in `ignore`.
    ///
    /// # Errors
    ///
    /// [`Error::Ssl`], [`Error::ConnectionTimeout`] or [`Error::Connection`]
    /// when the request never produced a response; a status-derived error
    /// for an unexpected status.
    fn perform_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&[u8]>,
        timeout: Option<Duration>,
        ignore: &[u16],
    ) -> Result<Response>;

    /// Releases held resources.
    fn close(&self) {}
}

/// Trims slashes from both ends and puts back exactly one leading `/`.
/// An empty prefix stays empty.
pub fn normalize_url_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        return String::new();
    }
    format!("/{}", prefix.trim_matches('/'))
}

/// One request as the logging hooks see it.
#[derive(Debug, Clone, Copy)]
pub struct RequestLog<'a> {
    pub method: &'a Method,
    /// Full URL including scheme, host, and prefix.
    pub url: &'a str,
    /// Path and query as the caller supplied them.
    pub path: &'a str,
    pub body: Option<&'a [u8]>,
    pub duration: Duration,
}

pub fn log_request_success(request: &RequestLog<'_>, status: u16, response: &[u8]) {
    let secs = request.duration.as_secs_f64();
    info!(
        method = %request.method,
        url = request.url,
        status,
        duration_secs = secs,
        "{} {} [status:{} request:{:.3}s]",
        request.method,
        request.url,
        status,
        secs
    );

    if let Some(body) = request.body {
        debug!("> {}", String::from_utf8_lossy(body));
    }
    debug!("< {}", String::from_utf8_lossy(response));

    log_trace(request, Some(status), Some(response));
}

pub fn log_request_fail(
    request: &RequestLog<'_>,
    status: Option<u16>,
    response: Option<&[u8]>,
    failure: Option<&FetchFailure>,
) {
    // A missing document on HEAD is an answer, not a failure.
    if *request.method == Method::HEAD && status == Some(404) {
        return;
    }

    let secs = request.duration.as_secs_f64();
    let status_text = status.map_or_else(|| "N/A".to_string(), |s| s.to_string());
    match failure {
        Some(failure) => warn!(
            method = %request.method,
            url = request.url,
            duration_secs = secs,
            error = %failure,
            "{} {} [status:{} request:{:.3}s]",
            request.method,
            request.url,
            status_text,
            secs
        ),
        None => warn!(
            method = %request.method,
            url = request.url,
            status,
            duration_secs = secs,
            "{} {} [status:{} request:{:.3}s]",
            request.method,
            request.url,
            status_text,
            secs
        ),
    }

    if let Some(body) = request.body {
        debug!("> {}", String::from_utf8_lossy(body));
    }

    log_trace(request, status, response);

    if let Some(response) = response {
        debug!("< {}", String::from_utf8_lossy(response));
    }
}

/// Emits the request as a replayable curl command against localhost.
fn log_trace(request: &RequestLog<'_>, status: Option<u16>, response: Option<&[u8]>) {
    if !tracing::enabled!(target: TRACE_TARGET, tracing::Level::TRACE) {
        return;
    }

    trace!(target: TRACE_TARGET, "{}", curl_command(request.method, request.path, request.body));

    let status_text = status.map_or_else(|| "N/A".to_string(), |s| s.to_string());
    let rendered = response
        .filter(|r| !r.is_empty())
        .map(|r| pretty_json(r).replace('\n', "\n#"))
        .unwrap_or_default();
    trace!(
        target: TRACE_TARGET,
        "#[{}] ({:.3}s)\n#{}",
        status_text,
        request.duration.as_secs_f64(),
        rendered
    );
}

fn curl_command(method: &Method, path: &str, body: Option<&[u8]>) -> String {
    let path = match path.split_once('?') {
        Some((base, query)) => format!("{base}?pretty&{query}"),
        None => format!("{path}?pretty"),
    };

    match body.filter(|b| !b.is_empty()) {
        Some(body) => format!(
            "curl -H 'Content-Type: application/json' -X{method} 'http://localhost:9200{path}' -d '{}'",
            pretty_json(body)
        ),
        None => format!("curl -X{method} 'http://localhost:9200{path}' -d ''"),
    }
}

/// Pretty-prints JSON bodies, line by line for newline-delimited payloads.
fn pretty_json(data: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            return pretty.replace('\'', r"\u0027");
        }
    }

    let text = String::from_utf8_lossy(data);
    text.lines()
        .map(|line| {
            serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .and_then(|v| serde_json::to_string_pretty(&v).ok())
                .unwrap_or_else(|| line.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
        .replace('\'', r"\u0027")
}

/// Builds the error for a response whose status was not accepted.
///
/// The `error` field of a JSON body names the failure when present: a plain
/// string is used as is, an object contributes its `type`. Anything else
/// falls back to the raw body text.
pub fn status_error(status: u16, body: Bytes) -> Error {
    let error = error_message(&body);
    match status {
        400 => Error::Request { status, error, body },
        401 => Error::Authentication { status, error, body },
        403 => Error::Authorization { status, error, body },
        404 => Error::NotFound { status, error, body },
        409 => Error::Conflict { status, error, body },
        _ => Error::Transport { status, error, body },
    }
}

fn error_message(body: &[u8]) -> String {
    let raw = || String::from_utf8_lossy(body).into_owned();

    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return raw();
    };

    match value.get("error") {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(error @ serde_json::Value::Object(fields)) => match fields.get("type") {
            Some(serde_json::Value::String(kind)) => kind.clone(),
            _ => error.to_string(),
        },
        _ => raw(),
    }
}
