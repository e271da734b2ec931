//! The `Store` trait and the in-memory implementation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use agora_domain::config::DebateConfig;
use agora_domain::debate::{Phase, Speaker};
use agora_domain::error::{Error, Result};
use agora_domain::event::SystemEvent;
use agora_domain::intervention::{Intervention, InterventionStatus};
use agora_domain::stream::Usage;
use agora_domain::utterance::Utterance;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Debate record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Coarse lifecycle status persisted alongside the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    Created,
    Running,
    Paused,
    Completed,
    Stopped,
    Error,
}

impl DebateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Error)
    }
}

/// The persisted per-session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRecord {
    pub session_id: String,
    pub config: DebateConfig,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_speaker: Option<Speaker>,
    pub status: DebateStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Total elapsed, excluding time spent paused.
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub total_usage: Usage,
}

impl DebateRecord {
    pub fn new(session_id: impl Into<String>, config: DebateConfig, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            config,
            phase: Phase::Initializing,
            current_speaker: None,
            status: DebateStatus::Created,
            created_at: now,
            started_at: None,
            ended_at: None,
            elapsed_ms: 0,
            total_usage: Usage::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence boundary for the orchestration core.
///
/// Writes for a single session are serialised by the orchestrator; the
/// store itself only needs to be safe for concurrent access across
/// sessions. Failure classes follow the error taxonomy: `StoreTransient`
/// errors are retried by the caller, `StorePermanent` errors fail the
/// session.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Persist a freshly created debate. `Conflict` if the id exists.
    async fn create_debate(&self, record: &DebateRecord) -> Result<()>;

    async fn load_debate(&self, session_id: &str) -> Result<DebateRecord>;

    /// Record a phase/status change.
    async fn update_debate_phase(
        &self,
        session_id: &str,
        phase: Phase,
        speaker: Option<Speaker>,
        status: DebateStatus,
    ) -> Result<()>;

    /// Final bookkeeping when a session ends.
    async fn finish_debate(
        &self,
        session_id: &str,
        status: DebateStatus,
        elapsed_ms: u64,
        total_usage: Usage,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Append a completed utterance. Idempotent on `(session, index)`: a
    /// repeat append of an existing index is a no-op.
    async fn append_utterance(&self, utterance: &Utterance) -> Result<()>;

    /// The ordered utterance list for replay/export.
    async fn load_transcript(&self, session_id: &str) -> Result<Vec<Utterance>>;

    /// Record a queued intervention. Idempotent on `client_key`: returns
    /// the id of the existing record when the key was seen before.
    async fn append_intervention(
        &self,
        session_id: &str,
        intervention: &Intervention,
    ) -> Result<String>;

    async fn update_intervention(
        &self,
        session_id: &str,
        intervention_id: &str,
        status: InterventionStatus,
        response: Option<String>,
    ) -> Result<()>;

    async fn list_interventions(&self, session_id: &str) -> Result<Vec<Intervention>>;

    /// Best-effort diagnostic log; implementations swallow and log failures.
    async fn record_event(&self, event: &SystemEvent);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct SessionData {
    record: Option<DebateRecord>,
    utterances: Vec<Utterance>,
    interventions: Vec<Intervention>,
    events: Vec<SystemEvent>,
}

/// Map-backed store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostic events recorded for a session (test hook).
    pub fn events(&self, session_id: &str) -> Vec<SystemEvent> {
        self.sessions
            .read()
            .get(session_id)
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create_debate(&self, record: &DebateRecord) -> Result<()> {
        let mut sessions = self.sessions.write();
        let data = sessions.entry(record.session_id.clone()).or_default();
        if data.record.is_some() {
            return Err(Error::Conflict(format!(
                "debate {} already exists",
                record.session_id
            )));
        }
        data.record = Some(record.clone());
        Ok(())
    }

    async fn load_debate(&self, session_id: &str) -> Result<DebateRecord> {
        self.sessions
            .read()
            .get(session_id)
            .and_then(|d| d.record.clone())
            .ok_or_else(|| Error::NotFound(format!("debate {session_id}")))
    }

    async fn update_debate_phase(
        &self,
        session_id: &str,
        phase: Phase,
        speaker: Option<Speaker>,
        status: DebateStatus,
    ) -> Result<()> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(session_id)
            .and_then(|d| d.record.as_mut())
            .ok_or_else(|| Error::NotFound(format!("debate {session_id}")))?;
        record.phase = phase;
        record.current_speaker = speaker;
        record.status = status;
        if record.started_at.is_none() && status == DebateStatus::Running {
            record.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn finish_debate(
        &self,
        session_id: &str,
        status: DebateStatus,
        elapsed_ms: u64,
        total_usage: Usage,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(session_id)
            .and_then(|d| d.record.as_mut())
            .ok_or_else(|| Error::NotFound(format!("debate {session_id}")))?;
        record.status = status;
        record.elapsed_ms = elapsed_ms;
        record.total_usage = total_usage;
        record.ended_at = Some(ended_at);
        Ok(())
    }

    async fn append_utterance(&self, utterance: &Utterance) -> Result<()> {
        let mut sessions = self.sessions.write();
        let data = sessions
            .get_mut(&utterance.session_id)
            .ok_or_else(|| Error::NotFound(format!("debate {}", utterance.session_id)))?;
        if data.utterances.iter().any(|u| u.index == utterance.index) {
            return Ok(());
        }
        data.utterances.push(utterance.clone());
        Ok(())
    }

    async fn load_transcript(&self, session_id: &str) -> Result<Vec<Utterance>> {
        self.sessions
            .read()
            .get(session_id)
            .map(|d| d.utterances.clone())
            .ok_or_else(|| Error::NotFound(format!("debate {session_id}")))
    }

    async fn append_intervention(
        &self,
        session_id: &str,
        intervention: &Intervention,
    ) -> Result<String> {
        let mut sessions = self.sessions.write();
        let data = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("debate {session_id}")))?;

        if let Some(key) = &intervention.client_key {
            if let Some(existing) = data
                .interventions
                .iter()
                .find(|iv| iv.client_key.as_ref() == Some(key))
            {
                return Ok(existing.id.clone());
            }
        }
        data.interventions.push(intervention.clone());
        Ok(intervention.id.clone())
    }

    async fn update_intervention(
        &self,
        session_id: &str,
        intervention_id: &str,
        status: InterventionStatus,
        response: Option<String>,
    ) -> Result<()> {
        let mut sessions = self.sessions.write();
        let iv = sessions
            .get_mut(session_id)
            .and_then(|d| {
                d.interventions
                    .iter_mut()
                    .find(|iv| iv.id == intervention_id)
            })
            .ok_or_else(|| Error::NotFound(format!("intervention {intervention_id}")))?;
        if !iv.status.can_advance_to(status) {
            return Err(Error::Conflict(format!(
                "intervention {intervention_id}: {:?} cannot advance to {status:?}",
                iv.status
            )));
        }
        iv.status = status;
        if response.is_some() {
            iv.response = response;
        }
        iv.updated_at = Utc::now();
        Ok(())
    }

    async fn list_interventions(&self, session_id: &str) -> Result<Vec<Intervention>> {
        self.sessions
            .read()
            .get(session_id)
            .map(|d| d.interventions.clone())
            .ok_or_else(|| Error::NotFound(format!("debate {session_id}")))
    }

    async fn record_event(&self, event: &SystemEvent) {
        if let Some(data) = self.sessions.write().get_mut(&event.session_id) {
            data.events.push(event.clone());
        }
    }
}
