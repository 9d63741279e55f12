//! Connection settings.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fetch::auth::HttpAuth;

/// Everything a [`UrlFetchConnection`](crate::UrlFetchConnection) is built from.
///
/// Loadable from a JSON file where every field is optional:
/// ```json
/// {
///   "host": "es.example.com",
///   "port": 9243,
///   "use_ssl": true,
///   "http_auth": "elastic:changeme",
///   "headers": { "x-opaque-id": "batch-7" }
/// }
/// ```
///
/// `ca_certs`, `client_cert` and `client_key` exist only so they can be
/// rejected; the fetch primitive cannot present client certificates or use a
/// custom CA bundle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub http_auth: Option<HttpAuth>,
    pub use_ssl: bool,
    pub verify_certs: bool,
    pub ca_certs: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub url_prefix: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9200,
            http_auth: None,
            use_ssl: false,
            verify_certs: true,
            ca_certs: None,
            client_cert: None,
            client_key: None,
            headers: BTreeMap::new(),
            url_prefix: String::new(),
        }
    }
}

impl ConnectionConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read connection config '{path}'"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse connection config '{path}'"))
    }

    /// Overlays `ES_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlays `ES_HOST`, `ES_PORT`, `ES_USE_SSL`, `ES_VERIFY_CERTS`,
    /// `ES_HTTP_AUTH` and `ES_URL_PREFIX` as resolved by `lookup`.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ES_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("ES_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("ES_PORT is not a valid port: '{port}'"))?;
        }
        if let Some(flag) = lookup("ES_USE_SSL") {
            self.use_ssl = parse_flag("ES_USE_SSL", &flag)?;
        }
        if let Some(flag) = lookup("ES_VERIFY_CERTS") {
            self.verify_certs = parse_flag("ES_VERIFY_CERTS", &flag)?;
        }
        if let Some(auth) = lookup("ES_HTTP_AUTH") {
            self.http_auth = Some(HttpAuth::Joined(auth));
        }
        if let Some(prefix) = lookup("ES_URL_PREFIX") {
            self.url_prefix = prefix;
        }
        Ok(self)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow::anyhow!("{name} is not a boolean: '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9200);
        assert!(!config.use_ssl);
        assert!(config.verify_certs);
        assert!(config.headers.is_empty());
        assert!(config.http_auth.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"host": "es.example.com", "use_ssl": true}"#).unwrap();
        assert_eq!(config.host, "es.example.com");
        assert_eq!(config.port, 9200);
        assert!(config.use_ssl);
        assert!(config.verify_certs);
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_path("urlfetch_transport_test_config.json");
        fs::write(
            &path,
            r#"{"port": 9243, "http_auth": ["elastic", "pw"], "headers": {"x-a": "1"}}"#,
        )
        .unwrap();

        let config = ConnectionConfig::load(&path).unwrap();
        assert_eq!(config.port, 9243);
        assert_eq!(config.http_auth, Some(HttpAuth::pair("elastic", "pw")));
        assert_eq!(config.headers.get("x-a").map(String::as_str), Some("1"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = ConnectionConfig::load("/nonexistent/urlfetch_transport.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overlay() {
        let config = ConnectionConfig::default()
            .apply_env_from(lookup(&[
                ("ES_HOST", "search.internal"),
                ("ES_PORT", "9243"),
                ("ES_USE_SSL", "true"),
                ("ES_VERIFY_CERTS", "0"),
                ("ES_HTTP_AUTH", "alice:secret"),
                ("ES_URL_PREFIX", "/es"),
            ]))
            .unwrap();

        assert_eq!(config.host, "search.internal");
        assert_eq!(config.port, 9243);
        assert!(config.use_ssl);
        assert!(!config.verify_certs);
        assert_eq!(config.http_auth, Some(HttpAuth::Joined("alice:secret".to_string())));
        assert_eq!(config.url_prefix, "/es");
    }

    #[test]
    fn test_env_overlay_rejects_bad_port() {
        let result = ConnectionConfig::default().apply_env_from(lookup(&[("ES_PORT", "ninety")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overlay_rejects_bad_flag() {
        let result =
            ConnectionConfig::default().apply_env_from(lookup(&[("ES_USE_SSL", "maybe")]));
        assert!(result.is_err());
    }
}
