//! Published session events.
//!
//! Every event carries a per-session monotonic sequence number so that
//! subscribers can reconnect with a `last_seq` and replay. Heartbeats are
//! the one exception: they are keep-alive comments carrying `seq = 0` and
//! are never retained for replay.

use serde::{Deserialize, Serialize};

use crate::debate::{Phase, PromptKind, Speaker, TriggerKind};
use crate::utterance::Utterance;

/// The envelope delivered to subscribers: `{seq, ts, type, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub seq: u64,
    /// Milliseconds since session start.
    pub ts_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl SessionEvent {
    /// Heartbeats live outside the sequenced stream.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.kind, EventKind::Heartbeat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// First event a subscriber receives.
    Connected {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seq: Option<u64>,
    },
    PhaseTransition {
        from: Phase,
        to: Phase,
        #[serde(skip_serializing_if = "Option::is_none")]
        speaker: Option<Speaker>,
        elapsed_ms: u64,
    },
    TurnStarted {
        phase: Phase,
        turn_no: u32,
        speaker: Speaker,
        kind: PromptKind,
    },
    Token {
        speaker: Speaker,
        text: String,
    },
    /// A completed (persisted) utterance.
    Utterance {
        utterance: Utterance,
    },
    SpeakerCutoff {
        speaker: Speaker,
        partial_text: String,
    },
    InterruptScheduled {
        interrupter: Speaker,
        trigger: TriggerKind,
        score: f32,
    },
    InterruptFired {
        interrupter: Speaker,
    },
    Interjection {
        speaker: Speaker,
        text: String,
    },
    InterventionResponse {
        intervention_id: String,
        response: String,
    },
    Paused,
    Resumed {
        phase: Phase,
    },
    Completed,
    Error {
        reason: String,
    },
    Heartbeat,
    /// The requested `last_seq` is older than the replay window; the
    /// subscriber must refetch the transcript.
    ResyncRequired {
        oldest_retained: u64,
    },
    /// The model produced no content after the configured retries.
    EmptyResponse {
        speaker: Speaker,
    },
    /// A turn exceeded its hard ceiling and was abandoned.
    Timeout {
        speaker: Speaker,
    },
    /// A role's model is failing; surfaced so a client can reassign.
    ModelError {
        role: String,
        message: String,
    },
    Stopped {
        reason: String,
    },
}

impl EventKind {
    /// Event type tag as published on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::Connected { .. } => "connected",
            EventKind::PhaseTransition { .. } => "phase_transition",
            EventKind::TurnStarted { .. } => "turn_started",
            EventKind::Token { .. } => "token",
            EventKind::Utterance { .. } => "utterance",
            EventKind::SpeakerCutoff { .. } => "speaker_cutoff",
            EventKind::InterruptScheduled { .. } => "interrupt_scheduled",
            EventKind::InterruptFired { .. } => "interrupt_fired",
            EventKind::Interjection { .. } => "interjection",
            EventKind::InterventionResponse { .. } => "intervention_response",
            EventKind::Paused => "paused",
            EventKind::Resumed { .. } => "resumed",
            EventKind::Completed => "completed",
            EventKind::Error { .. } => "error",
            EventKind::Heartbeat => "heartbeat",
            EventKind::ResyncRequired { .. } => "resync_required",
            EventKind::EmptyResponse { .. } => "empty_response",
            EventKind::Timeout { .. } => "timeout",
            EventKind::ModelError { .. } => "model_error",
            EventKind::Stopped { .. } => "stopped",
        }
    }
}

/// Diagnostic record persisted via the store's best-effort event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub session_id: String,
    pub ts_ms: u64,
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_kind() {
        let ev = SessionEvent {
            seq: 7,
            ts_ms: 1234,
            kind: EventKind::PhaseTransition {
                from: Phase::Opening,
                to: Phase::Constructive,
                speaker: None,
                elapsed_ms: 9000,
            },
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["type"], "phase_transition");
        assert_eq!(json["from"], "opening");
        assert_eq!(json["to"], "constructive");
    }

    #[test]
    fn round_trips_through_json() {
        let ev = SessionEvent {
            seq: 3,
            ts_ms: 50,
            kind: EventKind::Token {
                speaker: Speaker::Pro,
                text: "hello".into(),
            },
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn heartbeat_detection() {
        let hb = SessionEvent {
            seq: 0,
            ts_ms: 0,
            kind: EventKind::Heartbeat,
        };
        assert!(hb.is_heartbeat());
    }
}
