//! Interruption engine settings (lively mode).

use serde::{Deserialize, Serialize};

use crate::debate::PacingMode;

use super::{err, ConfigIssue};

/// Bounds for the interruption engine. See the engine's budget accounting
/// for how the three timing floors compose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivelySettings {
    /// 1 (reluctant) .. 5 (eager); scales the trigger score.
    #[serde(default = "d_aggression")]
    pub aggression_level: u8,
    /// Rolling 60 s cap on fired interruptions, 0..=5.
    #[serde(default = "d_max_per_minute")]
    pub max_interrupts_per_minute: u32,
    /// Minimum spacing between consecutive interruptions.
    #[serde(default = "d_cooldown_ms")]
    pub interrupt_cooldown_ms: u64,
    /// Fairness floor: no interruption before the current speaker has held
    /// the floor this long.
    #[serde(default = "d_min_speaking_ms")]
    pub min_speaking_time_ms: u64,
    /// Trigger score needed to fire, 0..=1.
    #[serde(default = "d_relevance_threshold")]
    pub relevance_threshold: f32,
    #[serde(default)]
    pub pacing_mode: PacingMode,
    /// Extra phrases that arm the `key_phrase` trigger.
    #[serde(default)]
    pub key_phrases: Vec<String>,
    /// Score triggers with a cheap LLM call instead of the heuristic.
    #[serde(default)]
    pub llm_scoring: bool,
}

impl Default for LivelySettings {
    fn default() -> Self {
        Self::preset(PacingMode::Medium)
    }
}

fn d_aggression() -> u8 {
    3
}
fn d_max_per_minute() -> u32 {
    2
}
fn d_cooldown_ms() -> u64 {
    20_000
}
fn d_min_speaking_ms() -> u64 {
    8_000
}
fn d_relevance_threshold() -> f32 {
    0.6
}

impl LivelySettings {
    /// Expand a pacing mode into a concrete settings bundle.
    pub fn preset(pacing: PacingMode) -> Self {
        match pacing {
            PacingMode::Slow => Self {
                aggression_level: 2,
                max_interrupts_per_minute: 1,
                interrupt_cooldown_ms: 30_000,
                min_speaking_time_ms: 15_000,
                relevance_threshold: 0.75,
                pacing_mode: pacing,
                key_phrases: Vec::new(),
                llm_scoring: false,
            },
            PacingMode::Medium => Self {
                aggression_level: 3,
                max_interrupts_per_minute: 2,
                interrupt_cooldown_ms: 20_000,
                min_speaking_time_ms: 8_000,
                relevance_threshold: 0.6,
                pacing_mode: pacing,
                key_phrases: Vec::new(),
                llm_scoring: false,
            },
            PacingMode::Fast => Self {
                aggression_level: 4,
                max_interrupts_per_minute: 4,
                interrupt_cooldown_ms: 10_000,
                min_speaking_time_ms: 5_000,
                relevance_threshold: 0.5,
                pacing_mode: pacing,
                key_phrases: Vec::new(),
                llm_scoring: false,
            },
            PacingMode::Frantic => Self {
                aggression_level: 5,
                max_interrupts_per_minute: 5,
                interrupt_cooldown_ms: 4_000,
                min_speaking_time_ms: 2_000,
                relevance_threshold: 0.35,
                pacing_mode: pacing,
                key_phrases: Vec::new(),
                llm_scoring: false,
            },
        }
    }

    pub(super) fn validate(&self, issues: &mut Vec<ConfigIssue>) {
        if !(1..=5).contains(&self.aggression_level) {
            issues.push(err(
                "lively.aggression_level",
                format!("{} outside 1..=5", self.aggression_level),
            ));
        }
        if self.max_interrupts_per_minute > 5 {
            issues.push(err(
                "lively.max_interrupts_per_minute",
                format!("{} outside 0..=5", self.max_interrupts_per_minute),
            ));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            issues.push(err(
                "lively.relevance_threshold",
                format!("{} outside 0.0..=1.0", self.relevance_threshold),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_get_stricter_with_pace() {
        let slow = LivelySettings::preset(PacingMode::Slow);
        let frantic = LivelySettings::preset(PacingMode::Frantic);
        assert!(slow.max_interrupts_per_minute < frantic.max_interrupts_per_minute);
        assert!(slow.interrupt_cooldown_ms > frantic.interrupt_cooldown_ms);
        assert!(slow.relevance_threshold > frantic.relevance_threshold);
    }

    #[test]
    fn preset_values_stay_in_bounds() {
        for pacing in [
            PacingMode::Slow,
            PacingMode::Medium,
            PacingMode::Fast,
            PacingMode::Frantic,
        ] {
            let s = LivelySettings::preset(pacing);
            let mut issues = Vec::new();
            s.validate(&mut issues);
            assert!(issues.is_empty(), "{pacing:?}: {issues:?}");
        }
    }
}
