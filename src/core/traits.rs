//! Core traits and types for publishing
//!
//! This module defines the contract between the publish orchestrator and
//! the store API, together with the wire entities passed across it.

use crate::core::config::{BuildFormat, ReleasePhase, ServicesType};
use crate::core::error::Result;
use crate::security::{AccessToken, Credentials};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Drafts
// ============================================================================

/// Server-side id of a draft version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub i64);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Body of the draft creation request
///
/// Field names are part of the store's wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRequest {
    #[serde(rename = "whatsNew")]
    pub whats_new: String,
    #[serde(rename = "publishType")]
    pub publish_type: String,
    #[serde(rename = "seoTagIds")]
    pub seo_tag_ids: Vec<u16>,
}

// ============================================================================
// Upload
// ============================================================================

/// Build file to upload, opened only by the upload call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub format: BuildFormat,
    pub services_type: ServicesType,
}

// ============================================================================
// Status
// ============================================================================

/// Review/publication state of a draft as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteState {
    Pending,
    InReview,
    Approved,
    Rejected,
    Published,
    Failed,
}

impl RemoteState {
    /// Whether polling can stop at this state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InReview)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Approved | Self::Published)
    }
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "PENDING",
            Self::InReview => "IN_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Published => "PUBLISHED",
            Self::Failed => "FAILED",
        };
        f.write_str(text)
    }
}

/// Result of a status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftStatus {
    pub state: RemoteState,
    /// Remote comment, e.g. the moderator's rejection reason
    pub details: Option<String>,
}

// ============================================================================
// Store API Trait
// ============================================================================

/// Stateless adapter to the publishing service
///
/// Each method performs exactly one exchange with the service and never
/// retries; retry policy belongs to the caller.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// Exchange the key id and secret for a short-lived token
    async fn authenticate(&self, credentials: &Credentials) -> Result<AccessToken>;

    /// Create a draft version of the application
    async fn create_draft(
        &self,
        token: &AccessToken,
        app_id: &str,
        draft: &DraftRequest,
    ) -> Result<DraftId>;

    /// Stream the build file into the draft
    async fn upload_build_file(
        &self,
        token: &AccessToken,
        app_id: &str,
        draft_id: DraftId,
        artifact: &BuildArtifact,
    ) -> Result<()>;

    /// Send the draft to review
    async fn submit_draft(
        &self,
        token: &AccessToken,
        app_id: &str,
        draft_id: DraftId,
        release_phase: Option<ReleasePhase>,
    ) -> Result<()>;

    /// Current review/publication state of the draft
    async fn check_status(
        &self,
        token: &AccessToken,
        app_id: &str,
        draft_id: DraftId,
    ) -> Result<DraftStatus>;
}
