//! RuStore API credentials
//!
//! Credentials come either from a JSON file:
//!
//! ```json
//! {
//!   "key_id": "<KEY_ID>",
//!   "client_secret": "<CLIENT_SECRET>"
//! }
//! ```
//!
//! or directly from the CLI / `RUSTORE_KEY_ID` and `RUSTORE_CLIENT_SECRET`.

use crate::core::error::{PublishError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::debug;

pub const KEY_ID_ENV: &str = "RUSTORE_KEY_ID";
pub const CLIENT_SECRET_ENV: &str = "RUSTORE_CLIENT_SECRET";

/// API key id and client secret
pub struct Credentials {
    key_id: String,
    client_secret: SecretString,
}

impl Credentials {
    /// Build credentials, rejecting blank fields
    pub fn from_parts(key_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let key_id = key_id.into().trim().to_string();
        let client_secret = client_secret.into().trim().to_string();

        if key_id.is_empty() {
            return Err(PublishError::Credentials("`key_id` is empty".to_string()));
        }
        if client_secret.is_empty() {
            return Err(PublishError::Credentials(
                "`client_secret` is empty".to_string(),
            ));
        }

        Ok(Self {
            key_id,
            client_secret: SecretString::new(client_secret.into_boxed_str()),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    key_id: Option<String>,
    client_secret: Option<String>,
}

/// Loads credentials before any network activity
pub struct CredentialStore;

impl CredentialStore {
    /// Load credentials from a JSON file
    pub async fn load(path: &Path) -> Result<Credentials> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            PublishError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;

        let file: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
            PublishError::Credentials(format!("{} is not valid JSON: {}", path.display(), e))
        })?;

        let key_id = file.key_id.ok_or_else(|| {
            PublishError::Credentials(format!("`key_id` is missing in {}", path.display()))
        })?;
        let client_secret = file.client_secret.ok_or_else(|| {
            PublishError::Credentials(format!(
                "`client_secret` is missing in {}",
                path.display()
            ))
        })?;

        debug!("Loaded credentials for key {} from {}", key_id, path.display());
        Credentials::from_parts(key_id, client_secret)
    }

    /// Credentials from `RUSTORE_KEY_ID` / `RUSTORE_CLIENT_SECRET`
    ///
    /// Returns `None` when neither is set and an error when only one is.
    pub fn from_env(env: &HashMap<String, String>) -> Result<Option<Credentials>> {
        match (env.get(KEY_ID_ENV), env.get(CLIENT_SECRET_ENV)) {
            (Some(key_id), Some(secret)) => Credentials::from_parts(key_id.as_str(), secret.as_str()).map(Some),
            (None, None) => Ok(None),
            _ => Err(PublishError::Credentials(format!(
                "both {} and {} must be set",
                KEY_ID_ENV, CLIENT_SECRET_ENV
            ))),
        }
    }

    /// Resolve credentials by priority: explicit values, environment, file
    pub async fn resolve(
        explicit: Option<(String, String)>,
        env: &HashMap<String, String>,
        path: Option<&Path>,
    ) -> Result<Credentials> {
        if let Some((key_id, secret)) = explicit {
            return Credentials::from_parts(key_id, secret);
        }
        if let Some(credentials) = Self::from_env(env)? {
            return Ok(credentials);
        }
        match path {
            Some(path) => Self::load(path).await,
            None => Err(PublishError::Credentials(
                "no credentials given: set credentialsPath or pass --key-id/--client-secret"
                    .to_string(),
            )),
        }
    }
}
