//! Duelogic (philosophical chairs) settings.

use serde::{Deserialize, Serialize};

use crate::debate::{Accountability, Framework, Mode, Speaker, Tone};

use super::{err, ConfigIssue};

/// One chair: a position label plus the framework it argues from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChairSpec {
    pub position: String,
    pub framework: Framework,
}

impl ChairSpec {
    pub fn speaker(&self) -> Speaker {
        Speaker::Chair {
            position: self.position.clone(),
            framework: self.framework,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelogicSettings {
    #[serde(default)]
    pub accountability: Accountability,
    /// Termination condition: chair exchange rounds, 1..N.
    #[serde(default = "d_max_exchanges")]
    pub max_exchanges: u32,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default = "d_chairs")]
    pub chairs: Vec<ChairSpec>,
    /// Bracket the exchanges with arbiter opening/closing segments.
    #[serde(default = "d_true")]
    pub arbiter_brackets: bool,
    /// Enable the interruption engine between chairs.
    #[serde(default)]
    pub interruptions: bool,
}

impl Default for DuelogicSettings {
    fn default() -> Self {
        Self {
            accountability: Accountability::default(),
            max_exchanges: d_max_exchanges(),
            tone: Tone::default(),
            chairs: d_chairs(),
            arbiter_brackets: true,
            interruptions: false,
        }
    }
}

fn d_max_exchanges() -> u32 {
    4
}
fn d_true() -> bool {
    true
}
fn d_chairs() -> Vec<ChairSpec> {
    vec![
        ChairSpec {
            position: "advocate".into(),
            framework: Framework::Utilitarian,
        },
        ChairSpec {
            position: "skeptic".into(),
            framework: Framework::Deontological,
        },
    ]
}

impl DuelogicSettings {
    pub(super) fn validate(&self, mode: Mode, issues: &mut Vec<ConfigIssue>) {
        if mode != Mode::Duelogic {
            return;
        }
        if self.max_exchanges == 0 {
            issues.push(err("duelogic.max_exchanges", "must be at least 1"));
        }
        if self.chairs.len() < 2 {
            issues.push(err(
                "duelogic.chairs",
                format!("need at least 2 chairs, got {}", self.chairs.len()),
            ));
        }
        let mut positions: Vec<&str> = self.chairs.iter().map(|c| c.position.as_str()).collect();
        positions.sort_unstable();
        positions.dedup();
        if positions.len() != self.chairs.len() {
            issues.push(err("duelogic.chairs", "chair positions must be unique"));
        }
    }
}
