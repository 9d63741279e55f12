use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

/// HTTP basic-auth credentials as a caller supplies them.
///
/// Either a `"user:pass"` string or an explicit `(user, pass)` pair. In JSON
/// config this is a string or a two-element array.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HttpAuth {
    Pair(String, String),
    Joined(String),
}

impl HttpAuth {
    pub fn pair(user: impl Into<String>, pass: impl Into<String>) -> Self {
        HttpAuth::Pair(user.into(), pass.into())
    }

    /// Normalises to `(user, pass)`.
    ///
    /// A joined string is split on its first colon only, so a password may
    /// contain colons but a username may not. Returns `None` when a joined
    /// string has no colon at all.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match self {
            HttpAuth::Pair(user, pass) => Some((user, pass)),
            HttpAuth::Joined(joined) => joined.split_once(':'),
        }
    }

    /// Renders the `Authorization` header value, `Basic <base64(user:pass)>`.
    pub fn header_value(&self) -> Option<String> {
        let (user, pass) = self.credentials()?;
        Some(format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
    }
}

impl FromStr for HttpAuth {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(HttpAuth::Joined(s.to_string()))
    }
}

impl From<(&str, &str)> for HttpAuth {
    fn from((user, pass): (&str, &str)) -> Self {
        HttpAuth::pair(user, pass)
    }
}

// Keep passwords out of logs.
impl fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = self.credentials().map(|(user, _)| user).unwrap_or("?");
        f.debug_struct("HttpAuth")
            .field("user", &user)
            .field("pass", &"***")
            .finish()
    }
}
