//! Error handling for RuStore publishing
//!
//! This module provides the error taxonomy of the publish workflow with
//! retry classification and recovery guidance, using the thiserror crate.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Workflow step an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    Authenticate,
    CreateDraft,
    Upload,
    Submit,
    Poll,
}

impl PublishStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::CreateDraft => "create-draft",
            Self::Upload => "upload",
            Self::Submit => "submit",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for publishing operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Local input errors
    #[error("invalid configuration `{field}`: {message}")]
    Config { field: String, message: String },

    #[error("credentials error: {0}")]
    Credentials(String),

    // Remote errors
    #[error("[authenticate] authentication failed: {message}")]
    Auth {
        status: Option<u16>,
        message: String,
    },

    #[error("[{step}] API error {status}: {body}")]
    Api {
        step: PublishStep,
        status: u16,
        body: String,
    },

    #[error("[upload] build file upload failed: {message}")]
    Upload {
        status: Option<u16>,
        message: String,
    },

    #[error("[poll] draft processing failed: {details}")]
    RemoteFailed { details: String },

    #[error("[{step}] network error: {message}")]
    Network { step: PublishStep, message: String },

    #[error("[{step}] timed out after {}s", .elapsed.as_secs())]
    Timeout { step: PublishStep, elapsed: Duration },

    #[error("publishing cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PublishError>;

impl PublishError {
    /// Shorthand for a configuration error on `field`
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Workflow step this error came from, if it came from the remote side
    pub fn step(&self) -> Option<PublishStep> {
        match self {
            Self::Auth { .. } => Some(PublishStep::Authenticate),
            Self::Upload { .. } => Some(PublishStep::Upload),
            Self::RemoteFailed { .. } => Some(PublishStep::Poll),
            Self::Api { step, .. } | Self::Network { step, .. } | Self::Timeout { step, .. } => {
                Some(*step)
            }
            Self::Config { .. } | Self::Credentials(_) | Self::Cancelled => None,
        }
    }

    /// Remote HTTP status, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Auth { status, .. } | Self::Upload { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the remote side is at fault and the call may succeed later
    ///
    /// Only server errors and transport failures qualify. Client errors,
    /// bad credentials and local input errors never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => (500..600).contains(status),
            Self::Network { .. } => true,
            _ => false,
        }
    }

    /// Whether the error stems from local input rather than the remote side
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Credentials(_))
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::Config { .. } => vec![
                "Check the publish configuration file and CLI flags",
                "Run `rustore-publisher check` to validate the configuration",
            ],
            Self::Credentials(_) => vec![
                "Check that the credentials file exists and contains `key_id` and `client_secret`",
                "Or pass --key-id/--client-secret (RUSTORE_KEY_ID/RUSTORE_CLIENT_SECRET)",
            ],
            Self::Auth { .. } => vec![
                "Check the key id and client secret in the RuStore console",
                "Check that the API key has not been revoked",
            ],
            Self::Api { status, .. } if (400..500).contains(status) => vec![
                "Check the request parameters (application id, release notes, SEO tags)",
                "Check whether another draft of the application is already pending",
            ],
            Self::Api { .. } => vec![
                "The publishing service is failing, try again later",
            ],
            Self::Upload { .. } => vec![
                "Check that the build file is a signed package of the configured format",
                "Check the network connection and try again",
            ],
            Self::RemoteFailed { .. } => vec![
                "Check the draft in the RuStore console for processing errors",
                "Check that the build is signed with the expected key",
            ],
            Self::Network { .. } => vec![
                "Check the network connection",
                "Try again later",
            ],
            Self::Timeout { .. } => vec![
                "The draft may still complete on the server, check the RuStore console",
                "Increase --request-timeout for large builds",
            ],
            Self::Cancelled => vec![
                "A draft may have been created, check the RuStore console before re-running",
            ],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Credentials(_) => "CREDENTIALS_ERROR",
            Self::Auth { .. } => "AUTH_ERROR",
            Self::Api { .. } => "API_ERROR",
            Self::Upload { .. } => "UPLOAD_ERROR",
            Self::RemoteFailed { .. } => "REMOTE_FAILED",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }
}
