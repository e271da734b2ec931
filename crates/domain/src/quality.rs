//! Arbiter quality evaluation results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A debate-principle violation the arbiter can name in a correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    StrawManning,
    MissingSteelMan,
    MissingSelfCritique,
    FrameworkInconsistency,
    RhetoricalEvasion,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::StrawManning => "straw_manning",
            ViolationKind::MissingSteelMan => "missing_steel_man",
            ViolationKind::MissingSelfCritique => "missing_self_critique",
            ViolationKind::FrameworkInconsistency => "framework_inconsistency",
            ViolationKind::RhetoricalEvasion => "rhetorical_evasion",
        }
    }

    /// How the violation is named in an arbiter correction.
    pub fn describe(self) -> &'static str {
        match self {
            ViolationKind::StrawManning => {
                "misrepresenting the opposing position instead of engaging its strongest form"
            }
            ViolationKind::MissingSteelMan => {
                "failing to present the opposing position in its strongest form"
            }
            ViolationKind::MissingSelfCritique => {
                "failing to acknowledge any weakness in one's own position"
            }
            ViolationKind::FrameworkInconsistency => {
                "arguing from premises outside the assigned framework"
            }
            ViolationKind::RhetoricalEvasion => {
                "deflecting the question with rhetoric instead of answering it"
            }
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-utterance evaluation of adherence to debate principles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEvaluation {
    /// Overall adherence, 0–100.
    pub adherence_score: u8,
    pub steel_man_attempted: bool,
    /// Quality of the steel-man when attempted, 0–100.
    pub steel_man_quality: u8,
    pub self_critique_attempted: bool,
    pub self_critique_quality: u8,
    /// How consistently the speaker argued from their framework, 0–100.
    pub framework_consistency: u8,
    pub intellectual_honesty: u8,
    pub requires_interjection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<ViolationKind>,
}

impl QualityEvaluation {
    /// A passing evaluation with nothing to flag.
    pub fn clean(score: u8) -> Self {
        Self {
            adherence_score: score,
            steel_man_attempted: true,
            steel_man_quality: score,
            self_critique_attempted: true,
            self_critique_quality: score,
            framework_consistency: score,
            intellectual_honesty: score,
            requires_interjection: false,
            violation: None,
        }
    }
}
