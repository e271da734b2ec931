//! Persisted speech acts.

use serde::{Deserialize, Serialize};

use crate::debate::{Phase, Speaker, TriggerKind};
use crate::quality::{QualityEvaluation, ViolationKind};
use crate::stream::Usage;

/// A single completed speech act. Immutable once appended; ordered by
/// `(session, ts_ms, index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub session_id: String,
    /// Monotonically assigned per-session index.
    pub index: u64,
    /// Milliseconds since session start, excluding paused intervals.
    pub ts_ms: u64,
    pub phase: Phase,
    pub speaker: Speaker,
    pub content: String,
    #[serde(default)]
    pub metadata: UtteranceMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtteranceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Usage>,
    /// The model that produced the content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Set when the speaker was cut off mid-stream.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    /// Index of the utterance this one responds to (cross-exam answers,
    /// resumptions, interjections).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responds_to: Option<u64>,
    /// Trigger that caused this interjection, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerKind>,
    /// Violation named by an arbiter correction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<ViolationKind>,
    /// Arbiter evaluation summary, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityEvaluation>,
}
