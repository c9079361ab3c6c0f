//! Outcome and progress types of a publish run

use crate::core::error::{PublishError, PublishStep};
use crate::core::state_machine::{PublishState, StateTransition};
use crate::core::traits::{DraftId, RemoteState};
use serde_json::json;
use std::time::Duration;

/// How a publish run ended
#[derive(Debug)]
pub enum PublishOutcome {
    /// The store approved or published the version
    Published { state: RemoteState },
    /// Submitted for review with manual publication; not polled
    Submitted,
    /// The store rejected the version
    Rejected { reason: String },
    /// Polling ran out of time; the remote outcome is unknown
    TimedOut {
        elapsed: Duration,
        last_state: Option<RemoteState>,
    },
    Failed { error: PublishError },
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Published { .. } | Self::Submitted)
    }

    /// Process exit code for this outcome
    ///
    /// 0 published or submitted, 1 failed, 2 rejected, 3 timed out,
    /// 4 configuration or credentials error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Published { .. } | Self::Submitted => 0,
            Self::Failed { error } if error.is_local() => 4,
            Self::Failed { .. } => 1,
            Self::Rejected { .. } => 2,
            Self::TimedOut { .. } => 3,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::Submitted => "submitted",
            Self::Rejected { .. } => "rejected",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of [`PublishOrchestrator::run`](super::PublishOrchestrator::run)
#[derive(Debug)]
pub struct PublishReport {
    pub outcome: PublishOutcome,
    pub application_id: String,
    pub draft_id: Option<DraftId>,
    /// State of the workflow when the run ended
    pub final_state: PublishState,
    /// Last state reached before a terminal one, i.e. where a failed run stopped
    pub last_active_state: PublishState,
    pub transitions: Vec<StateTransition>,
    pub duration: Duration,
}

impl PublishReport {
    /// One-line human readable summary
    pub fn summary(&self) -> String {
        let draft = self
            .draft_id
            .map(|id| format!(" (draft {})", id))
            .unwrap_or_default();

        match &self.outcome {
            PublishOutcome::Published { state } => format!(
                "{}{}: {} after {}s",
                self.application_id,
                draft,
                state,
                self.duration.as_secs()
            ),
            PublishOutcome::Submitted => format!(
                "{}{}: submitted for review, publish it from the console once approved",
                self.application_id, draft
            ),
            PublishOutcome::Rejected { reason } => {
                format!("{}{}: rejected: {}", self.application_id, draft, reason)
            }
            PublishOutcome::TimedOut { elapsed, last_state } => format!(
                "{}{}: no final status after {}s (last status {})",
                self.application_id,
                draft,
                elapsed.as_secs(),
                last_state.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
            ),
            PublishOutcome::Failed { error } => format!(
                "{}{}: {} (stopped at {})",
                self.application_id, draft, error, self.last_active_state
            ),
        }
    }

    /// Machine readable form of the report
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "outcome": self.outcome.kind(),
            "applicationId": self.application_id,
            "draftId": self.draft_id,
            "finalState": self.final_state,
            "lastActiveState": self.last_active_state,
            "durationMs": self.duration.as_millis() as u64,
            "transitions": self.transitions,
        });

        let details = match &self.outcome {
            PublishOutcome::Published { state } => json!({ "remoteState": state }),
            PublishOutcome::Submitted => json!({}),
            PublishOutcome::Rejected { reason } => json!({ "reason": reason }),
            PublishOutcome::TimedOut { elapsed, last_state } => json!({
                "elapsedMs": elapsed.as_millis() as u64,
                "lastRemoteState": last_state,
            }),
            PublishOutcome::Failed { error } => json!({
                "code": error.code(),
                "step": error.step().map(|s| s.as_str()),
                "status": error.status(),
                "message": error.to_string(),
            }),
        };
        value["details"] = details;
        value
    }
}

/// Progress notification sent while a run is in flight
#[derive(Debug, Clone, PartialEq)]
pub enum PublishEvent {
    StateChanged {
        from: PublishState,
        to: PublishState,
    },
    Retrying {
        step: PublishStep,
        attempt: u32,
    },
    StatusPolled {
        state: RemoteState,
    },
}
