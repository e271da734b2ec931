mod duelogic;
mod informal;
mod lively;
mod models;

pub use duelogic::*;
pub use informal::*;
pub use lively::*;
pub use models::*;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::debate::{Flow, Mode};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level debate configuration bundle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a session needs to run, constructed by the caller and handed
/// to the session manager. Serde defaults make a minimal
/// `{"proposition": "..."}` payload a runnable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// The statement being debated.
    pub proposition: String,
    /// Optional framing context shown to every agent.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub flow: Flow,
    /// Prompt verbosity knob, 1 (terse) .. 5 (expansive).
    #[serde(default = "d_brevity")]
    pub brevity: u8,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Per-turn output cap, 64..8192.
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub require_citations: bool,
    /// Rounds of alternating pro/con in the constructive phase.
    #[serde(default = "d_constructive_rounds")]
    pub constructive_rounds: u32,
    /// Hard ceiling for a single turn, after which it is abandoned.
    #[serde(default = "d_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    /// Retries with an identical prompt when the model returns nothing.
    #[serde(default = "d_empty_response_retries")]
    pub empty_response_retries: u32,
    /// Maximum prior utterances included in a prompt.
    #[serde(default = "d_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub models: ModelAssignments,
    #[serde(default)]
    pub personas: PersonaAssignments,
    #[serde(default)]
    pub lively: LivelySettings,
    #[serde(default)]
    pub duelogic: DuelogicSettings,
    #[serde(default)]
    pub informal: InformalSettings,
}

impl DebateConfig {
    /// Minimal runnable config for the given proposition.
    pub fn new(proposition: impl Into<String>) -> Self {
        Self {
            proposition: proposition.into(),
            context: None,
            mode: Mode::default(),
            flow: Flow::default(),
            brevity: d_brevity(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            require_citations: false,
            constructive_rounds: d_constructive_rounds(),
            turn_timeout_ms: d_turn_timeout_ms(),
            empty_response_retries: d_empty_response_retries(),
            history_window: d_history_window(),
            models: ModelAssignments::default(),
            personas: PersonaAssignments::default(),
            lively: LivelySettings::default(),
            duelogic: DuelogicSettings::default(),
            informal: InformalSettings::default(),
        }
    }
}

fn d_brevity() -> u8 {
    3
}
fn d_temperature() -> f32 {
    0.7
}
fn d_max_tokens() -> u32 {
    1024
}
fn d_constructive_rounds() -> u32 {
    2
}
fn d_turn_timeout_ms() -> u64 {
    60_000
}
fn d_empty_response_retries() -> u32 {
    2
}
fn d_history_window() -> usize {
    12
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Error,
        field: field.into(),
        message: message.into(),
    }
}

fn warn(field: &str, message: impl Into<String>) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Warning,
        field: field.into(),
        message: message.into(),
    }
}

impl DebateConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. Callers creating a
    /// session reject configs with any `Error`-severity issue.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.proposition.trim().is_empty() {
            issues.push(err("proposition", "must not be empty"));
        }
        if !(1..=5).contains(&self.brevity) {
            issues.push(err("brevity", format!("{} outside 1..=5", self.brevity)));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            issues.push(err(
                "temperature",
                format!("{} outside 0.0..=1.0", self.temperature),
            ));
        }
        if !(64..=8192).contains(&self.max_tokens) {
            issues.push(err(
                "max_tokens",
                format!("{} outside 64..=8192", self.max_tokens),
            ));
        }
        if self.constructive_rounds == 0 {
            issues.push(err("constructive_rounds", "must be at least 1"));
        }
        if self.turn_timeout_ms == 0 {
            issues.push(err("turn_timeout_ms", "must be positive"));
        }
        if self.history_window == 0 {
            issues.push(warn("history_window", "0 drops all history from prompts"));
        }

        self.lively.validate(&mut issues);
        self.duelogic.validate(self.mode, &mut issues);
        self.informal.validate(self.mode, &mut issues);

        issues
    }

    /// Whether the config has any error-severity issue.
    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error)
    }
}
