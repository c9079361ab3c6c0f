//! Wire models of the RuStore public API
//!
//! Every response is wrapped in the same envelope:
//!
//! ```json
//! { "code": "OK", "message": null, "body": { ... }, "timestamp": "..." }
//! ```

use crate::core::traits::RemoteState;
use serde::{Deserialize, Serialize};

/// `code` value of a successful response
pub const CODE_OK: &str = "OK";

/// Common response envelope
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub message: Option<String>,
    pub body: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// Body of `POST /public/auth/`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest<'a> {
    pub key_id: &'a str,
    pub timestamp: String,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthBody {
    pub jwe: Option<String>,
    /// Seconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Page of versions returned by the status query
#[derive(Debug, Deserialize)]
pub struct VersionPage {
    #[serde(default)]
    pub content: Vec<VersionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version_id: i64,
    pub version_status: String,
    #[serde(default, alias = "moderInfo")]
    pub comment: Option<String>,
}

/// Map a remote `versionStatus` onto the states the workflow knows
///
/// Unrecognized values are treated as still pending.
pub fn map_version_status(status: &str) -> RemoteState {
    match status.trim().to_ascii_uppercase().as_str() {
        "DRAFT" | "PREPARING" | "PENDING" => RemoteState::Pending,
        "MODERATION" | "IN_REVIEW" => RemoteState::InReview,
        "APPROVED" | "READY_FOR_PUBLICATION" | "PUBLICATION" => RemoteState::Approved,
        "ACTIVE" | "PUBLISHED" => RemoteState::Published,
        "REJECTED" | "REJECTED_BY_MODERATOR" => RemoteState::Rejected,
        "FAILED" | "ERROR" => RemoteState::Failed,
        _ => RemoteState::Pending,
    }
}
