use std::io::Read;

use bytes::Bytes;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::debug;

use super::client::Fetch;
use super::types::{FetchFailure, FetchRequest, FetchResponse};

/// Redirect hops followed when `follow_redirects` is set.
const MAX_REDIRECTS: usize = 5;

/// Largest response body accepted before truncation or failure.
pub const MAX_RESPONSE_SIZE: usize = 32 * 1024 * 1024;

/// A [`Fetch`] backed by `reqwest`'s blocking client.
///
/// Stands in for the sandboxed primitive when running anywhere else. One
/// client is kept per (redirect, certificate validation) combination since
/// both are client-level settings in reqwest.
pub struct BasicFetch {
    clients: [Client; 4],
}

impl BasicFetch {
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self {
            clients: [
                build_client(false, false)?,
                build_client(false, true)?,
                build_client(true, false)?,
                build_client(true, true)?,
            ],
        })
    }

    fn client(&self, follow_redirects: bool, validate_certificate: bool) -> &Client {
        let index = (usize::from(follow_redirects) << 1) | usize::from(validate_certificate);
        &self.clients[index]
    }
}

fn build_client(follow_redirects: bool, validate_certificate: bool) -> reqwest::Result<Client> {
    let policy = if follow_redirects {
        Policy::limited(MAX_REDIRECTS)
    } else {
        Policy::none()
    };

    Client::builder()
        .redirect(policy)
        .danger_accept_invalid_certs(!validate_certificate)
        .build()
}

impl Fetch for BasicFetch {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchFailure> {
        let mut builder = self
            .client(request.follow_redirects, request.validate_certificate)
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers.clone());

        if let Some(payload) = &request.payload {
            builder = builder.body(payload.to_vec());
        }
        if let Some(deadline) = request.deadline {
            builder = builder.timeout(deadline);
        }

        let response = builder.send().map_err(classify)?;
        let status_code = response.status().as_u16();
        let headers = response.headers().clone();
        let content = read_capped(response, MAX_RESPONSE_SIZE, request.allow_truncated)?;

        debug!(url = %request.url, status_code, bytes = content.len(), "Fetch completed");

        Ok(FetchResponse {
            status_code,
            headers,
            content,
        })
    }
}

/// Reads at most `max + 1` bytes of the body, then applies the size limit:
/// truncating when the caller allows it, failing otherwise.
fn read_capped(reader: impl Read, max: usize, allow_truncated: bool) -> Result<Bytes, FetchFailure> {
    let mut content = Vec::new();
    reader
        .take(max as u64 + 1)
        .read_to_end(&mut content)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => FetchFailure::DeadlineExceeded(error_chain(&e)),
            _ => FetchFailure::Download(error_chain(&e)),
        })?;

    if content.len() <= max {
        return Ok(Bytes::from(content));
    }
    if allow_truncated {
        content.truncate(max);
        Ok(Bytes::from(content))
    } else {
        Err(FetchFailure::ResponseTooLarge(format!(
            "response exceeds the {max} byte limit"
        )))
    }
}

/// Maps a reqwest error onto the fetch failure kinds.
fn classify(err: reqwest::Error) -> FetchFailure {
    let message = error_chain(&err);

    if err.is_timeout() {
        FetchFailure::DeadlineExceeded(message)
    } else if mentions_certificate(&message) {
        FetchFailure::CertificateInvalid(message)
    } else if err.is_builder() {
        FetchFailure::InvalidUrl(message)
    } else if err.is_connect() || err.is_redirect() || err.is_body() || err.is_request() {
        FetchFailure::Download(message)
    } else {
        FetchFailure::Other(message)
    }
}

/// TLS stacks only surface certificate problems in their message text.
fn mentions_certificate(chain: &str) -> bool {
    chain.to_ascii_lowercase().contains("certificate")
}

/// Flattens an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn request(url: String) -> FetchRequest {
        FetchRequest {
            url,
            payload: None,
            method: Method::GET,
            headers: HeaderMap::new(),
            allow_truncated: false,
            follow_redirects: true,
            deadline: None,
            validate_certificate: true,
        }
    }

    #[test]
    fn test_fetch_returns_status_headers_and_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/_cluster/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"green"}"#)
            .create();

        let fetch = BasicFetch::new().unwrap();
        let response = fetch
            .fetch(&request(format!("{}/_cluster/health", server.url())))
            .unwrap();

        mock.assert();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.headers["content-type"], "application/json");
        assert_eq!(&response.content[..], br#"{"status":"green"}"#);
    }

    #[test]
    fn test_fetch_forwards_method_headers_and_payload() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/idx/_search")
            .match_header("x-opaque-id", "abc")
            .match_body(r#"{"query":{"match_all":{}}}"#)
            .with_status(200)
            .with_body("{}")
            .create();

        let mut req = request(format!("{}/idx/_search", server.url()));
        req.method = Method::POST;
        req.headers
            .insert("x-opaque-id", HeaderValue::from_static("abc"));
        req.payload = Some(Bytes::from_static(br#"{"query":{"match_all":{}}}"#));

        let fetch = BasicFetch::new().unwrap();
        let response = fetch.fetch(&req).unwrap();

        mock.assert();
        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn test_fetch_does_not_follow_redirects_when_disabled() {
        let mut server = mockito::Server::new();
        let redirect = server
            .mock("GET", "/old")
            .with_status(302)
            .with_header("location", "/new")
            .create();
        let target = server.mock("GET", "/new").with_status(200).expect(0).create();

        let mut req = request(format!("{}/old", server.url()));
        req.follow_redirects = false;

        let fetch = BasicFetch::new().unwrap();
        let response = fetch.fetch(&req).unwrap();

        redirect.assert();
        target.assert();
        assert_eq!(response.status_code, 302);
    }

    #[test]
    fn test_fetch_follows_redirects_when_enabled() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/old")
            .with_status(302)
            .with_header("location", "/new")
            .create();
        let target = server
            .mock("GET", "/new")
            .with_status(200)
            .with_body("moved")
            .create();

        let fetch = BasicFetch::new().unwrap();
        let response = fetch.fetch(&request(format!("{}/old", server.url()))).unwrap();

        target.assert();
        assert_eq!(response.status_code, 200);
        assert_eq!(&response.content[..], b"moved");
    }

    #[test]
    fn test_fetch_non_success_status_is_not_a_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body(r#"{"found":false}"#)
            .create();

        let fetch = BasicFetch::new().unwrap();
        let response = fetch
            .fetch(&request(format!("{}/missing", server.url())))
            .unwrap();

        assert_eq!(response.status_code, 404);
    }

    #[test]
    fn test_fetch_invalid_url() {
        let fetch = BasicFetch::new().unwrap();
        let result = fetch.fetch(&request("not a url".to_string()));
        assert!(matches!(result, Err(FetchFailure::InvalidUrl(_))));
    }

    #[test]
    fn test_fetch_refused_connection_is_download_failure() {
        let fetch = BasicFetch::new().unwrap();
        let result = fetch.fetch(&request("http://127.0.0.1:1/".to_string()));
        assert!(matches!(result, Err(FetchFailure::Download(_))));
    }

    #[test]
    fn test_fetch_deadline_is_deadline_exceeded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            thread::sleep(Duration::from_secs(2));
        });

        let mut req = request(format!("http://{addr}/_search"));
        req.deadline = Some(Duration::from_millis(200));

        let fetch = BasicFetch::new().unwrap();
        let result = fetch.fetch(&req);

        assert!(matches!(result, Err(FetchFailure::DeadlineExceeded(_))));
        server.join().unwrap();
    }

    #[test]
    fn test_mentions_certificate() {
        assert!(mentions_certificate(
            "error sending request: client error (Connect): error:0A000086:SSL routines: certificate verify failed"
        ));
        assert!(mentions_certificate("invalid peer Certificate: UnknownIssuer"));
        assert!(!mentions_certificate("tcp connect error: Connection refused"));
    }

    #[test]
    fn test_read_capped_within_limit() {
        let content = read_capped(Cursor::new(b"abcd".to_vec()), 4, false).unwrap();
        assert_eq!(&content[..], b"abcd");
    }

    #[test]
    fn test_read_capped_truncates_when_allowed() {
        let content = read_capped(Cursor::new(b"abcdef".to_vec()), 4, true).unwrap();
        assert_eq!(&content[..], b"abcd");
    }

    #[test]
    fn test_read_capped_rejects_when_truncation_disallowed() {
        let result = read_capped(Cursor::new(b"abcdef".to_vec()), 4, false);
        assert!(matches!(result, Err(FetchFailure::ResponseTooLarge(_))));
    }

    #[test]
    fn test_read_capped_stops_reading_past_limit() {
        let mut source = Cursor::new(vec![7u8; 64]);
        let result = read_capped(&mut source, 4, false);
        assert!(result.is_err());
        assert_eq!(source.position(), 5);
    }

    #[test]
    fn test_read_capped_timeout_is_deadline_exceeded() {
        struct Stalled;
        impl Read for Stalled {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"))
            }
        }

        let result = read_capped(Stalled, 4, false);
        assert!(matches!(result, Err(FetchFailure::DeadlineExceeded(_))));
    }

    #[test]
    fn test_error_chain_single_error() {
        let err = std::io::Error::other("refused");
        assert_eq!(error_chain(&err), "refused");
    }
}
