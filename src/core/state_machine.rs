//! State machine for tracking the publish workflow
//!
//! The machine lives in memory for a single run. A failed run is never
//! resumed; running again starts a new draft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{error, info};

/// Publishing state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishState {
    Init,
    Authenticated,
    DraftCreated,
    Uploaded,
    Submitted,
    Polling,
    Published,
    Rejected,
    TimedOut,
    Failed,
}

impl PublishState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Authenticated => "AUTHENTICATED",
            Self::DraftCreated => "DRAFT_CREATED",
            Self::Uploaded => "UPLOADED",
            Self::Submitted => "SUBMITTED",
            Self::Polling => "POLLING",
            Self::Published => "PUBLISHED",
            Self::Rejected => "REJECTED",
            Self::TimedOut => "TIMED_OUT",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Published | Self::Rejected | Self::TimedOut | Self::Failed
        )
    }

    /// Whether the workflow allows moving from `self` to `to`
    ///
    /// Any non-terminal state may fail.
    pub fn can_transition_to(&self, to: PublishState) -> bool {
        use PublishState::*;

        if self.is_terminal() {
            return false;
        }
        if to == Failed {
            return true;
        }

        matches!(
            (*self, to),
            (Init, Authenticated)
                | (Authenticated, DraftCreated)
                | (DraftCreated, Uploaded)
                | (Uploaded, Submitted)
                | (Submitted, Polling)
                | (Polling, Published)
                | (Polling, Rejected)
                | (Polling, TimedOut)
        )
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    /// From state
    pub from: PublishState,

    /// To state
    pub to: PublishState,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Additional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// State machine for tracking the publish workflow
pub struct PublishStateMachine {
    current_state: PublishState,
    transitions: Vec<StateTransition>,
}

impl Default for PublishStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: PublishState::Init,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state, logging the change
    pub fn transition(
        &mut self,
        to: PublishState,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) {
        let from = self.current_state;
        debug_assert!(
            from.can_transition_to(to),
            "illegal transition {} -> {}",
            from,
            to
        );

        match &metadata {
            Some(meta) => info!(
                "{} -> {} ({})",
                from,
                to,
                serde_json::to_string(meta).unwrap_or_default()
            ),
            None => info!("{} -> {}", from, to),
        }

        self.transitions.push(StateTransition {
            from,
            to,
            timestamp: Utc::now(),
            metadata,
        });
        self.current_state = to;
    }

    /// Transition to `FAILED`, recording the error detail in the transition
    pub fn fail(&mut self, detail: impl Into<String>) {
        let detail = detail.into();
        error!("{} failed: {}", self.current_state, detail);

        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), serde_json::Value::String(detail));
        self.transition(PublishState::Failed, Some(metadata));
    }

    /// Get current state
    pub fn state(&self) -> PublishState {
        self.current_state
    }

    /// Last non-terminal state reached before the run ended
    pub fn last_active_state(&self) -> PublishState {
        if !self.current_state.is_terminal() {
            return self.current_state;
        }
        self.transitions
            .last()
            .map(|t| t.from)
            .unwrap_or(PublishState::Init)
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }
}
