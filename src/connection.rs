//! [`UrlFetchConnection`]: a [`Connection`] that sends every request
//! through a [`Fetch`] primitive.

use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchFailure, FetchRequest};
use crate::transport::{
    Connection, RequestLog, Response, log_request_fail, log_request_success,
    normalize_url_prefix, status_error,
};

/// Connection backed by a synchronous fetch primitive.
///
/// Configuration is fixed at construction. Each request clones the header
/// map, so concurrent callers never observe each other's headers; whether
/// concurrent requests are safe beyond that is up to `F`.
pub struct UrlFetchConnection<F> {
    fetch: F,
    base_url: String,
    headers: HeaderMap,
    use_ssl: bool,
    verify_certs: bool,
}

impl<F: Fetch> UrlFetchConnection<F> {
    /// Validates `config` and builds a connection on top of `fetch`.
    ///
    /// # Errors
    ///
    /// [`Error::ImproperlyConfigured`] when `fetch` is unavailable here, when
    /// a CA bundle or client certificate/key is set, when `http_auth` is a
    /// string without a colon, or when a header is not valid HTTP.
    pub fn new(config: ConnectionConfig, fetch: F) -> Result<Self> {
        if !fetch.is_available() {
            return Err(Error::ImproperlyConfigured(
                "the urlfetch capability is not available in this environment".to_string(),
            ));
        }

        reject_unsupported("ca_certs", config.ca_certs.as_deref())?;
        reject_unsupported("client_key", config.client_key.as_deref())?;
        reject_unsupported("client_cert", config.client_cert.as_deref())?;

        let mut headers = HeaderMap::with_capacity(config.headers.len() + 1);
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::ImproperlyConfigured(format!("invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                Error::ImproperlyConfigured(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }

        if let Some(auth) = &config.http_auth {
            let credentials = auth.header_value().ok_or_else(|| {
                Error::ImproperlyConfigured(
                    "http_auth must be 'user:pass' or a (user, pass) pair".to_string(),
                )
            })?;
            let mut value = HeaderValue::from_str(&credentials).map_err(|e| {
                Error::ImproperlyConfigured(format!("invalid http_auth: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let scheme = if config.use_ssl { "https" } else { "http" };
        let base_url = format!(
            "{scheme}://{}:{}{}",
            config.host,
            config.port,
            normalize_url_prefix(&config.url_prefix)
        );

        if config.use_ssl && !config.verify_certs {
            warn!(
                base_url = %base_url,
                "Connecting to {base_url} using SSL with verify_certs=False is insecure."
            );
        }

        debug!(base_url = %base_url, headers = headers.len(), "Connection configured");

        Ok(Self {
            fetch,
            base_url,
            headers,
            use_ssl: config.use_ssl,
            verify_certs: config.verify_certs,
        })
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the fetch primitive is asked to validate server certificates.
    pub fn verify_certs(&self) -> bool {
        self.verify_certs
    }

    /// True when TLS is used without certificate validation.
    pub fn is_insecure(&self) -> bool {
        self.use_ssl && !self.verify_certs
    }
}

fn reject_unsupported(option: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !v.is_empty() => Err(Error::ImproperlyConfigured(format!(
            "{option} not supported by UrlFetchConnection."
        ))),
        _ => Ok(()),
    }
}

/// Maps a fetch failure onto the connection error it surfaces as.
fn failure_error(failure: FetchFailure) -> Error {
    let message = failure.message().to_string();
    match failure {
        source @ FetchFailure::CertificateInvalid(_) => Error::Ssl {
            info: "N/A",
            message,
            source,
        },
        source @ FetchFailure::DeadlineExceeded(_) => Error::ConnectionTimeout {
            info: "TIMEOUT",
            message,
            source,
        },
        source => Error::Connection {
            info: "N/A",
            message,
            source,
        },
    }
}

impl<F: Fetch> Connection for UrlFetchConnection<F> {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn perform_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&[u8]>,
        timeout: Option<Duration>,
        ignore: &[u16],
    ) -> Result<Response> {
        let mut target = path.to_string();
        if !params.is_empty() {
            let query = serde_urlencoded::to_string(params)
                .map_err(|e| Error::Serialization(format!("cannot encode query parameters: {e}")))?;
            target.push('?');
            target.push_str(&query);
        }
        let url = format!("{}{}", self.base_url, target);

        let start = Instant::now();
        let request = FetchRequest {
            url: url.clone(),
            payload: body.map(Bytes::copy_from_slice),
            method: method.clone(),
            headers: self.headers.clone(),
            allow_truncated: false,
            follow_redirects: true,
            deadline: timeout,
            validate_certificate: self.verify_certs,
        };

        let result = self.fetch.fetch(&request);
        let duration = start.elapsed();
        let log = RequestLog {
            method: &method,
            url: &url,
            path: &target,
            body,
            duration,
        };

        let response = match result {
            Ok(response) => response,
            Err(failure) => {
                log_request_fail(&log, None, None, Some(&failure));
                return Err(failure_error(failure));
            }
        };

        let status = response.status_code;
        if !(200..300).contains(&status) && !ignore.contains(&status) {
            log_request_fail(&log, Some(status), Some(&response.content), None);
            return Err(status_error(status, response.content));
        }

        log_request_success(&log, status, &response.content);

        Ok(Response {
            status,
            headers: response.headers,
            body: response.content,
        })
    }

    /// Nothing to release: the fetch primitive keeps no per-connection state.
    fn close(&self) {
        debug!(base_url = %self.base_url, "Connection closed");
    }
}

impl<F> fmt::Display for UrlFetchConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<UrlFetchConnection: {}>", self.base_url)
    }
}

impl<F> fmt::Debug for UrlFetchConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlFetchConnection")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("verify_certs", &self.verify_certs)
            .finish_non_exhaustive()
    }
}
