//! User-originated commands recorded against a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    Question,
    Challenge,
    EvidenceInjection,
    PauseRequest,
    ClarificationRequest,
    Resume,
    Stop,
    /// Advances a `step`-flow debate by one turn.
    Continue,
}

impl InterventionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InterventionKind::Question => "question",
            InterventionKind::Challenge => "challenge",
            InterventionKind::EvidenceInjection => "evidence_injection",
            InterventionKind::PauseRequest => "pause_request",
            InterventionKind::ClarificationRequest => "clarification_request",
            InterventionKind::Resume => "resume",
            InterventionKind::Stop => "stop",
            InterventionKind::Continue => "continue",
        }
    }

    /// Control-flow kinds need no content string.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            InterventionKind::PauseRequest
                | InterventionKind::Resume
                | InterventionKind::Stop
                | InterventionKind::Continue
        )
    }
}

impl fmt::Display for InterventionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status advances monotonically: `Queued → Processing → Completed|Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl InterventionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving to `next` respects the monotonic ordering.
    pub fn can_advance_to(self, next: Self) -> bool {
        use InterventionStatus::*;
        matches!(
            (self, next),
            (Queued, Processing) | (Processing, Completed) | (Processing, Failed) | (Queued, Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: String,
    pub kind: InterventionKind,
    pub content: String,
    /// Speaker the intervention is directed to, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directed_to: Option<crate::debate::Speaker>,
    pub status: InterventionStatus,
    /// Required non-empty when status is `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Client-supplied idempotency key; a second enqueue with the same key
    /// is a no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_advances_monotonically() {
        use InterventionStatus::*;
        assert!(Queued.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Completed));
        assert!(Processing.can_advance_to(Failed));
        assert!(Queued.can_advance_to(Failed));

        assert!(!Completed.can_advance_to(Processing));
        assert!(!Failed.can_advance_to(Queued));
        assert!(!Processing.can_advance_to(Queued));
    }

    #[test]
    fn control_kinds() {
        assert!(InterventionKind::PauseRequest.is_control());
        assert!(InterventionKind::Continue.is_control());
        assert!(!InterventionKind::Question.is_control());
        assert!(!InterventionKind::EvidenceInjection.is_control());
    }
}
