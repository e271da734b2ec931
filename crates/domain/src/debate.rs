//! The debate model: modes, phases, speakers, and planned turns.

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mode / Flow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the debate is conducted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The structured six-phase protocol, strictly turn-by-turn.
    #[default]
    TurnBased,
    /// Six-phase protocol with opportunistic mid-stream interruptions.
    Lively,
    /// Free-form rotation over N participants.
    Informal,
    /// Philosophical chairs with an arbiter enforcing debate principles.
    Duelogic,
}

/// Whether the orchestrator advances on its own or waits for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    #[default]
    Auto,
    /// Await a `continue` intervention between turns.
    Step,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phase
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Debate lifecycle phase.
///
/// The six protocol phases (`Opening` … `Synthesis`) apply to structured
/// debates; `Informal`/`Wrapup` to free-form discussion. `Paused`,
/// `Completed` and `Error` are utility states. Legal successors are
/// enforced by the engine's state machine, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Opening,
    Constructive,
    CrossExam,
    Rebuttal,
    Closing,
    Synthesis,
    Informal,
    Wrapup,
    Paused,
    Completed,
    Error,
}

impl Phase {
    /// Terminal phases accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::Opening => "opening",
            Phase::Constructive => "constructive",
            Phase::CrossExam => "cross_exam",
            Phase::Rebuttal => "rebuttal",
            Phase::Closing => "closing",
            Phase::Synthesis => "synthesis",
            Phase::Informal => "informal",
            Phase::Wrapup => "wrapup",
            Phase::Paused => "paused",
            Phase::Completed => "completed",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frameworks and speakers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Philosophical framework a duelogic chair argues from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    Utilitarian,
    VirtueEthics,
    Deontological,
    Pragmatic,
    Libertarian,
    Communitarian,
    Cosmopolitan,
    Precautionary,
    AutonomyCentered,
    CareEthics,
}

impl Framework {
    pub fn as_str(self) -> &'static str {
        match self {
            Framework::Utilitarian => "utilitarian",
            Framework::VirtueEthics => "virtue_ethics",
            Framework::Deontological => "deontological",
            Framework::Pragmatic => "pragmatic",
            Framework::Libertarian => "libertarian",
            Framework::Communitarian => "communitarian",
            Framework::Cosmopolitan => "cosmopolitan",
            Framework::Precautionary => "precautionary",
            Framework::AutonomyCentered => "autonomy_centered",
            Framework::CareEthics => "care_ethics",
        }
    }

    /// Human-readable name, for prompts.
    pub fn display_name(self) -> &'static str {
        match self {
            Framework::Utilitarian => "utilitarian",
            Framework::VirtueEthics => "virtue ethics",
            Framework::Deontological => "deontological",
            Framework::Pragmatic => "pragmatic",
            Framework::Libertarian => "libertarian",
            Framework::Communitarian => "communitarian",
            Framework::Cosmopolitan => "cosmopolitan",
            Framework::Precautionary => "precautionary",
            Framework::AutonomyCentered => "autonomy-centered",
            Framework::CareEthics => "care ethics",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is speaking (or acting) in a debate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Speaker {
    Moderator,
    Pro,
    Con,
    /// User interventions surfaced into the transcript.
    User,
    /// Meta events (retries, cutoff markers, diagnostics).
    System,
    /// The duelogic referee.
    Arbiter,
    /// A duelogic chair, keyed by position and framework.
    Chair {
        position: String,
        framework: Framework,
    },
    /// An indexed free-form participant (`participant_1..participant_N`).
    Participant { index: u8 },
}

impl Speaker {
    /// Stable routing key for model/persona assignment
    /// (`pro`, `chair.skeptic`, `participant.2`, …).
    pub fn route_key(&self) -> String {
        match self {
            Speaker::Moderator => "moderator".into(),
            Speaker::Pro => "pro".into(),
            Speaker::Con => "con".into(),
            Speaker::User => "user".into(),
            Speaker::System => "system".into(),
            Speaker::Arbiter => "arbiter".into(),
            Speaker::Chair { position, .. } => format!("chair.{position}"),
            Speaker::Participant { index } => format!("participant.{index}"),
        }
    }

    /// Whether this speaker's turns are produced by a model (as opposed to
    /// user or system entries).
    pub fn is_agent(&self) -> bool {
        !matches!(self, Speaker::User | Speaker::System)
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Chair {
                position,
                framework,
            } => write!(f, "chair:{position}:{framework}"),
            Speaker::Participant { index } => write!(f, "participant_{index}"),
            other => f.write_str(&other.route_key()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planned turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The kind of speech act a planned turn asks for. Drives prompt selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Opening,
    Constructive,
    CrossExamQ,
    CrossExamA,
    Rebuttal,
    Closing,
    Synthesis,
    /// Mid-stream interruption or arbiter correction.
    Interjection,
    /// Duelogic chair exchange.
    Exchange,
    /// Re-entry turn for a speaker cut off mid-stream.
    Resumption,
    /// Free-form informal contribution.
    Remark,
    Wrapup,
}

impl PromptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Opening => "opening",
            PromptKind::Constructive => "constructive",
            PromptKind::CrossExamQ => "cross_exam_q",
            PromptKind::CrossExamA => "cross_exam_a",
            PromptKind::Rebuttal => "rebuttal",
            PromptKind::Closing => "closing",
            PromptKind::Synthesis => "synthesis",
            PromptKind::Interjection => "interjection",
            PromptKind::Exchange => "exchange",
            PromptKind::Resumption => "resumption",
            PromptKind::Remark => "remark",
            PromptKind::Wrapup => "wrapup",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single planned speech act, produced by the turn planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDescriptor {
    /// Turn number within the current phase, starting at 0.
    pub turn_no: u32,
    pub speaker: Speaker,
    pub kind: PromptKind,
    /// Expected duration budget for the turn.
    pub budget_ms: u64,
    /// Turn number (within the same phase) this turn responds to.
    /// Set for cross-exam answers and resumption turns.
    pub responds_to: Option<u32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Knobs shared between config and engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Arbiter strictness in duelogic mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Accountability {
    /// Heuristic-only evaluation; never interjects.
    Relaxed,
    #[default]
    Moderate,
    Strict,
}

/// Prompt tone for duelogic exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Academic,
    #[default]
    Respectful,
    Spirited,
    Heated,
}

impl Tone {
    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Academic => "academic",
            Tone::Respectful => "respectful",
            Tone::Spirited => "spirited",
            Tone::Heated => "heated",
        }
    }
}

/// Preset bundles for the interruption engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PacingMode {
    Slow,
    #[default]
    Medium,
    Fast,
    Frantic,
}

/// What tripped an interruption trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Contradiction,
    KeyPhrase,
    WeakPoint,
    BoldClaim,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Contradiction => "contradiction",
            TriggerKind::KeyPhrase => "key_phrase",
            TriggerKind::WeakPoint => "weak_point",
            TriggerKind::BoldClaim => "bold_claim",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
