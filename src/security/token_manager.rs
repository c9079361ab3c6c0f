//! Access token handling with memory-safe storage and masking
//!
//! Tokens returned by the auth endpoint are kept in a `SecretString` so
//! they never end up in `Debug` output or logs by accident.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Short-lived API token
pub struct AccessToken {
    value: SecretString,
    expires_at: Option<Instant>,
}

impl AccessToken {
    /// Wrap a token valid for `ttl` from now; `None` means no known expiry
    pub fn new(value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            value: SecretString::new(value.into().into_boxed_str()),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    /// Raw token for the request header
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Whether the token expires within `margin` from now
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() + margin >= expires_at)
    }

    /// Token masked for safe logging
    pub fn masked(&self) -> String {
        mask_token(self.expose())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &self.masked())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Masks a token for safe logging
///
/// Shows only the first 3 and last 3 characters for identification purposes.
/// Tokens shorter than 10 characters are fully masked as "****".
///
/// # Examples
///
/// ```
/// use rustore_publisher::security::mask_token;
///
/// assert_eq!(mask_token("abcdef123456"), "abc...456");
/// assert_eq!(mask_token("short"), "****");
/// ```
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }

    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

/// Replace every occurrence of `secret` in `text` with its masked form
pub fn mask_secret_in(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, &mask_token(secret))
}
