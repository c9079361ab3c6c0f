//! HTTP client for the RuStore public API
//!
//! One method per endpoint, one exchange per call. Retries belong to the
//! orchestrator.

use super::models::{ApiResponse, AuthBody, AuthRequest, VersionPage, map_version_status};
use crate::core::config::{BuildFormat, ReleasePhase};
use crate::core::error::{PublishError, PublishStep, Result};
use crate::core::traits::{BuildArtifact, DraftId, DraftRequest, DraftStatus, StoreApi};
use crate::security::{AccessToken, Credentials, mask_secret_in};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha512};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Production API endpoint
pub const DEFAULT_BASE_URL: &str = "https://public-api.rustore.ru";

/// Header carrying the access token
const TOKEN_HEADER: &str = "Public-Token";

/// RuStore public API client
pub struct RustoreApiClient {
    client: Client,
    base_url: String,
}

impl RustoreApiClient {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rustore-publisher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::config("baseUrl", format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn auth_url(&self) -> String {
        format!("{}/public/auth/", self.base_url)
    }

    fn versions_url(&self, app_id: &str) -> String {
        format!("{}/public/v1/application/{}/version", self.base_url, app_id)
    }

    fn version_url(&self, app_id: &str, draft_id: DraftId) -> String {
        format!("{}/{}", self.versions_url(app_id), draft_id)
    }

    fn upload_url(&self, app_id: &str, draft_id: DraftId, format: BuildFormat) -> String {
        format!("{}/{}", self.version_url(app_id, draft_id), format.extension())
    }

    fn commit_url(&self, app_id: &str, draft_id: DraftId) -> String {
        format!("{}/commit", self.version_url(app_id, draft_id))
    }

    /// Send a request, mapping transport failures to `Network` errors
    async fn send(&self, step: PublishStep, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| PublishError::Network {
            step,
            message: e.to_string(),
        })
    }

    /// Read a response, failing with `Api` on a non-2xx status or a non-OK code
    async fn read_body<T: DeserializeOwned>(
        &self,
        step: PublishStep,
        response: Response,
    ) -> Result<Option<T>> {
        let status = response.status();
        let text = response.text().await.map_err(|e| PublishError::Network {
            step,
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(PublishError::Api {
                step,
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| PublishError::Api {
            step,
            status: status.as_u16(),
            body: format!("unexpected response ({}): {}", e, text),
        })?;

        if !envelope.is_ok() {
            return Err(PublishError::Api {
                step,
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(envelope.body)
    }
}

/// Lowercase hex SHA-512 of `key_id + timestamp + secret`
pub(crate) fn sign(key_id: &str, timestamp: &str, secret: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(key_id.as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Value of the `partialValue` query parameter
fn partial_value(phase: ReleasePhase) -> String {
    format!("{}", phase.percent)
}

fn mime_type(format: BuildFormat) -> &'static str {
    match format {
        BuildFormat::Apk => "application/vnd.android.package-archive",
        BuildFormat::Aab => "application/octet-stream",
    }
}

#[async_trait]
impl StoreApi for RustoreApiClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AccessToken> {
        let secret = credentials.client_secret().expose_secret();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string();
        let request = AuthRequest {
            key_id: credentials.key_id(),
            signature: sign(credentials.key_id(), &timestamp, secret),
            timestamp,
        };

        debug!("Authenticating key {}", credentials.key_id());
        let response = self
            .send(
                PublishStep::Authenticate,
                self.client.post(self.auth_url()).json(&request),
            )
            .await?;

        let status = response.status();
        let body = self
            .read_body::<AuthBody>(PublishStep::Authenticate, response)
            .await
            .map_err(|e| match e {
                PublishError::Api { status, body, .. } => PublishError::Auth {
                    status: Some(status),
                    message: mask_secret_in(&body, secret),
                },
                other => other,
            })?;

        let body = body.ok_or_else(|| PublishError::Auth {
            status: Some(status.as_u16()),
            message: "response has no body".to_string(),
        })?;
        let jwe = body.jwe.filter(|t| !t.is_empty()).ok_or_else(|| PublishError::Auth {
            status: Some(status.as_u16()),
            message: "response has no token".to_string(),
        })?;

        let token = AccessToken::new(jwe, body.ttl.map(Duration::from_secs));
        debug!("Received token {}", token.masked());
        Ok(token)
    }

    async fn create_draft(
        &self,
        token: &AccessToken,
        app_id: &str,
        draft: &DraftRequest,
    ) -> Result<DraftId> {
        let response = self
            .send(
                PublishStep::CreateDraft,
                self.client
                    .post(self.versions_url(app_id))
                    .header(TOKEN_HEADER, token.expose())
                    .json(draft),
            )
            .await?;
        let status = response.status().as_u16();

        let id = self
            .read_body::<i64>(PublishStep::CreateDraft, response)
            .await?
            .ok_or_else(|| PublishError::Api {
                step: PublishStep::CreateDraft,
                status,
                body: "response has no draft id".to_string(),
            })?;

        Ok(DraftId(id))
    }

    async fn upload_build_file(
        &self,
        token: &AccessToken,
        app_id: &str,
        draft_id: DraftId,
        artifact: &BuildArtifact,
    ) -> Result<()> {
        let io_error = |e: std::io::Error| PublishError::Upload {
            status: None,
            message: format!("cannot read {}: {}", artifact.path.display(), e),
        };

        let file = tokio::fs::File::open(&artifact.path).await.map_err(io_error)?;
        let length = file.metadata().await.map_err(io_error)?.len();
        let file_name = artifact
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app")
            .to_string();

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(file_name)
            .mime_str(mime_type(artifact.format))
            .map_err(|e| PublishError::Upload {
                status: None,
                message: format!("cannot build multipart body: {}", e),
            })?;
        let form = Form::new().part("file", part);

        let mut request = self
            .client
            .post(self.upload_url(app_id, draft_id, artifact.format))
            .header(TOKEN_HEADER, token.expose());
        if artifact.format == BuildFormat::Apk {
            request = request.query(&[
                ("servicesType", artifact.services_type.as_wire()),
                ("isMainApk", "true"),
            ]);
        }

        info!("Uploading {} ({} bytes)", artifact.path.display(), length);
        let response = request.multipart(form).send().await.map_err(|e| PublishError::Upload {
            status: None,
            message: e.to_string(),
        })?;

        self.read_body::<serde_json::Value>(PublishStep::Upload, response)
            .await
            .map_err(|e| match e {
                PublishError::Api { status, body, .. } => PublishError::Upload {
                    status: Some(status),
                    message: body,
                },
                PublishError::Network { message, .. } => PublishError::Upload {
                    status: None,
                    message,
                },
                other => other,
            })?;

        Ok(())
    }

    async fn submit_draft(
        &self,
        token: &AccessToken,
        app_id: &str,
        draft_id: DraftId,
        release_phase: Option<ReleasePhase>,
    ) -> Result<()> {
        let mut request = self
            .client
            .post(self.commit_url(app_id, draft_id))
            .header(TOKEN_HEADER, token.expose());
        if let Some(phase) = release_phase {
            request = request.query(&[("partialValue", partial_value(phase))]);
        }

        let response = self.send(PublishStep::Submit, request).await?;
        self.read_body::<serde_json::Value>(PublishStep::Submit, response)
            .await?;
        Ok(())
    }

    async fn check_status(
        &self,
        token: &AccessToken,
        app_id: &str,
        draft_id: DraftId,
    ) -> Result<DraftStatus> {
        let response = self
            .send(
                PublishStep::Poll,
                self.client
                    .get(self.versions_url(app_id))
                    .header(TOKEN_HEADER, token.expose())
                    .query(&[("ids", draft_id.to_string())]),
            )
            .await?;
        let status = response.status().as_u16();

        let page = self
            .read_body::<VersionPage>(PublishStep::Poll, response)
            .await?
            .unwrap_or(VersionPage { content: Vec::new() });

        let version = page
            .content
            .into_iter()
            .find(|v| v.version_id == draft_id.0)
            .ok_or_else(|| PublishError::Api {
                step: PublishStep::Poll,
                status,
                body: format!("version {} not found in response", draft_id),
            })?;

        debug!("Version {} status {}", draft_id, version.version_status);
        Ok(DraftStatus {
            state: map_version_status(&version.version_status),
            details: version.comment,
        })
    }
}
