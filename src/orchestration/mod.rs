//! Orchestration layer for RuStore publishing
//!
//! This module drives a publish run from validated configuration to a
//! terminal outcome.

pub mod draft;
pub mod publisher;
pub mod report;

pub use draft::{DraftBuilder, MAX_WHATS_NEW_CHARS, select_release_note};
pub use publisher::{DEFAULT_POLL_INTERVAL, PublishOrchestrator, TOKEN_REFRESH_MARGIN};
pub use report::{PublishEvent, PublishOutcome, PublishReport};
