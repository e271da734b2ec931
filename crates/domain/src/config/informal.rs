//! Free-form (informal) discussion settings.

use serde::{Deserialize, Serialize};

use crate::debate::Mode;

use super::{err, ConfigIssue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InformalSettings {
    /// Number of rotating participants.
    #[serde(default = "d_participants")]
    pub participants: u8,
    /// Hard cap on total informal turns.
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    /// Consecutive sub-threshold-length turns that count as convergence.
    #[serde(default = "d_convergence_turns")]
    pub convergence_turns: u32,
    /// A turn shorter than this (chars) counts toward convergence.
    #[serde(default = "d_min_turn_chars")]
    pub min_turn_chars: usize,
}

impl Default for InformalSettings {
    fn default() -> Self {
        Self {
            participants: d_participants(),
            max_turns: d_max_turns(),
            convergence_turns: d_convergence_turns(),
            min_turn_chars: d_min_turn_chars(),
        }
    }
}

fn d_participants() -> u8 {
    3
}
fn d_max_turns() -> u32 {
    12
}
fn d_convergence_turns() -> u32 {
    3
}
fn d_min_turn_chars() -> usize {
    80
}

impl InformalSettings {
    pub(super) fn validate(&self, mode: Mode, issues: &mut Vec<ConfigIssue>) {
        if mode != Mode::Informal {
            return;
        }
        if self.participants < 2 {
            issues.push(err(
                "informal.participants",
                format!("need at least 2, got {}", self.participants),
            ));
        }
        if self.max_turns == 0 {
            issues.push(err("informal.max_turns", "must be at least 1"));
        }
    }
}
