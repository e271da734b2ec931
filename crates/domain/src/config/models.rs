//! Model and persona assignments per debate role.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maps debate roles to model identifiers (e.g. `"openai/gpt-4o"`).
///
/// Lookups go through [`ModelAssignments::for_route`] with a speaker route
/// key; unassigned roles fall back to `default_model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAssignments {
    #[serde(default = "d_default_model")]
    pub default_model: String,
    #[serde(default)]
    pub pro: Option<String>,
    #[serde(default)]
    pub con: Option<String>,
    #[serde(default)]
    pub moderator: Option<String>,
    #[serde(default)]
    pub arbiter: Option<String>,
    /// Cheap model used for interrupt-trigger scoring. Falls back to the
    /// default model when unset.
    #[serde(default)]
    pub trigger: Option<String>,
    /// Keyed by chair position (`chairs["skeptic"]`).
    #[serde(default)]
    pub chairs: HashMap<String, String>,
}

impl Default for ModelAssignments {
    fn default() -> Self {
        Self {
            default_model: d_default_model(),
            pro: None,
            con: None,
            moderator: None,
            arbiter: None,
            trigger: None,
            chairs: HashMap::new(),
        }
    }
}

fn d_default_model() -> String {
    "openai/gpt-4o".into()
}

impl ModelAssignments {
    /// Resolve the model for a speaker route key (`pro`, `chair.skeptic`, …).
    pub fn for_route(&self, route: &str) -> &str {
        let assigned = match route {
            "pro" => self.pro.as_deref(),
            "con" => self.con.as_deref(),
            "moderator" => self.moderator.as_deref(),
            "arbiter" => self.arbiter.as_deref(),
            _ => route
                .strip_prefix("chair.")
                .and_then(|pos| self.chairs.get(pos))
                .map(String::as_str),
        };
        assigned.unwrap_or(&self.default_model)
    }

    /// Reassign a role's model; unknown role strings assign a chair.
    pub fn assign(&mut self, route: &str, model: String) {
        match route {
            "pro" => self.pro = Some(model),
            "con" => self.con = Some(model),
            "moderator" => self.moderator = Some(model),
            "arbiter" => self.arbiter = Some(model),
            other => {
                let pos = other.strip_prefix("chair.").unwrap_or(other);
                self.chairs.insert(pos.to_string(), model);
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Personas
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A speaker identity: the immutable fragment is always the first system
/// message of every prompt built for that speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub display_name: String,
    /// Core values restated in every prompt.
    #[serde(default)]
    pub core_values: Vec<String>,
    /// Immutable identity text (voice, stance, constraints).
    pub identity: String,
}

/// Personas keyed by speaker route key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaAssignments {
    #[serde(flatten)]
    pub by_route: HashMap<String, Persona>,
}

impl PersonaAssignments {
    pub fn for_route(&self, route: &str) -> Option<&Persona> {
        self.by_route.get(route)
    }

    pub fn assign(&mut self, route: impl Into<String>, persona: Persona) {
        self.by_route.insert(route.into(), persona);
    }
}
