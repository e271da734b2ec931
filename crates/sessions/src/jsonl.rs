//! Durable append-only file store.
//!
//! Layout under the base directory, one set of files per session:
//!
//! - `<id>.meta.json` — the [`DebateRecord`], rewritten on update
//! - `<id>.transcript.jsonl` — one utterance per line, append-only
//! - `<id>.interventions.jsonl` — full intervention snapshots; the last
//!   line per id wins on read
//! - `<id>.events.jsonl` — diagnostic system events, best-effort
//!
//! Malformed lines are skipped with a warning rather than failing a load.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use agora_domain::debate::{Phase, Speaker};
use agora_domain::error::{Error, Result};
use agora_domain::event::SystemEvent;
use agora_domain::intervention::{Intervention, InterventionStatus};
use agora_domain::stream::Usage;
use agora_domain::utterance::Utterance;

use crate::store::{DebateRecord, DebateStatus, Store};

pub struct JsonlStore {
    base_dir: PathBuf,
    /// Guards read-modify-write cycles on meta/intervention files.
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(|e| Error::StorePermanent(e.to_string()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn meta_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.meta.json"))
    }

    fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.transcript.jsonl"))
    }

    fn interventions_path(&self, session_id: &str) -> PathBuf {
        self.base_dir
            .join(format!("{session_id}.interventions.jsonl"))
    }

    fn events_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.events.jsonl"))
    }

    fn write_meta(&self, record: &DebateRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| Error::StorePermanent(e.to_string()))?;
        std::fs::write(self.meta_path(&record.session_id), json)
            .map_err(|e| Error::StoreTransient(e.to_string()))?;
        Ok(())
    }

    fn read_meta(&self, session_id: &str) -> Result<DebateRecord> {
        let path = self.meta_path(session_id);
        if !path.exists() {
            return Err(Error::NotFound(format!("debate {session_id}")));
        }
        let raw =
            std::fs::read_to_string(&path).map_err(|e| Error::StoreTransient(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| Error::StorePermanent(e.to_string()))
    }

    fn append_line<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let mut line =
            serde_json::to_string(value).map_err(|e| Error::StorePermanent(e.to_string()))?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::StoreTransient(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| Error::StoreTransient(e.to_string()))?;
        Ok(())
    }

    fn read_lines<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw =
            std::fs::read_to_string(path).map_err(|e| Error::StoreTransient(e.to_string()))?;
        let mut values = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(v) => values.push(v),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed line");
                }
            }
        }
        Ok(values)
    }

    /// Latest snapshot per intervention id, in first-seen order.
    fn fold_interventions(&self, session_id: &str) -> Result<Vec<Intervention>> {
        let snapshots: Vec<Intervention> = self.read_lines(&self.interventions_path(session_id))?;
        let mut order: Vec<String> = Vec::new();
        let mut latest: HashMap<String, Intervention> = HashMap::new();
        for iv in snapshots {
            if !latest.contains_key(&iv.id) {
                order.push(iv.id.clone());
            }
            latest.insert(iv.id.clone(), iv);
        }
        Ok(order.into_iter().filter_map(|id| latest.remove(&id)).collect())
    }
}

#[async_trait::async_trait]
impl Store for JsonlStore {
    async fn create_debate(&self, record: &DebateRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.meta_path(&record.session_id).exists() {
            return Err(Error::Conflict(format!(
                "debate {} already exists",
                record.session_id
            )));
        }
        self.write_meta(record)
    }

    async fn load_debate(&self, session_id: &str) -> Result<DebateRecord> {
        self.read_meta(session_id)
    }

    async fn update_debate_phase(
        &self,
        session_id: &str,
        phase: Phase,
        speaker: Option<Speaker>,
        status: DebateStatus,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut record = self.read_meta(session_id)?;
        record.phase = phase;
        record.current_speaker = speaker;
        record.status = status;
        if record.started_at.is_none() && status == DebateStatus::Running {
            record.started_at = Some(Utc::now());
        }
        self.write_meta(&record)
    }

    async fn finish_debate(
        &self,
        session_id: &str,
        status: DebateStatus,
        elapsed_ms: u64,
        total_usage: Usage,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut record = self.read_meta(session_id)?;
        record.status = status;
        record.elapsed_ms = elapsed_ms;
        record.total_usage = total_usage;
        record.ended_at = Some(ended_at);
        self.write_meta(&record)
    }

    async fn append_utterance(&self, utterance: &Utterance) -> Result<()> {
        let _guard = self.write_lock.lock();
        // Idempotency on (session, index): scan existing indices.
        let existing: Vec<Utterance> =
            self.read_lines(&self.transcript_path(&utterance.session_id))?;
        if existing.iter().any(|u| u.index == utterance.index) {
            return Ok(());
        }
        self.append_line(&self.transcript_path(&utterance.session_id), utterance)
    }

    async fn load_transcript(&self, session_id: &str) -> Result<Vec<Utterance>> {
        if !self.meta_path(session_id).exists() {
            return Err(Error::NotFound(format!("debate {session_id}")));
        }
        self.read_lines(&self.transcript_path(session_id))
    }

    async fn append_intervention(
        &self,
        session_id: &str,
        intervention: &Intervention,
    ) -> Result<String> {
        let _guard = self.write_lock.lock();
        if let Some(key) = &intervention.client_key {
            let existing = self.fold_interventions(session_id)?;
            if let Some(prior) = existing
                .iter()
                .find(|iv| iv.client_key.as_ref() == Some(key))
            {
                return Ok(prior.id.clone());
            }
        }
        self.append_line(&self.interventions_path(session_id), intervention)?;
        Ok(intervention.id.clone())
    }

    async fn update_intervention(
        &self,
        session_id: &str,
        intervention_id: &str,
        status: InterventionStatus,
        response: Option<String>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let existing = self.fold_interventions(session_id)?;
        let mut iv = existing
            .into_iter()
            .find(|iv| iv.id == intervention_id)
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
        self.append_line(&self.interventions_path(session_id), &iv)
    }

    async fn list_interventions(&self, session_id: &str) -> Result<Vec<Intervention>> {
        self.fold_interventions(session_id)
    }

    async fn record_event(&self, event: &SystemEvent) {
        if let Err(e) = self.append_line(&self.events_path(&event.session_id), event) {
            tracing::warn!(session_id = %event.session_id, error = %e, "event log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_domain::config::DebateConfig;
    use agora_domain::intervention::InterventionKind;

    fn store() -> (tempfile::TempDir, JsonlStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn record(id: &str) -> DebateRecord {
        DebateRecord::new(id, DebateConfig::new("p"), Utc::now())
    }

    #[tokio::test]
    async fn meta_round_trips() {
        let (_dir, store) = store();
        store.create_debate(&record("s1")).await.unwrap();

        store
            .update_debate_phase("s1", Phase::Opening, Some(Speaker::Pro), DebateStatus::Running)
            .await
            .unwrap();

        let loaded = store.load_debate("s1").await.unwrap();
        assert_eq!(loaded.phase, Phase::Opening);
        assert_eq!(loaded.status, DebateStatus::Running);
        assert!(loaded.started_at.is_some());
    }

    #[tokio::test]
    async fn transcript_appends_and_dedupes() {
        let (_dir, store) = store();
        store.create_debate(&record("s1")).await.unwrap();

        let utt = Utterance {
            session_id: "s1".into(),
            index: 0,
            ts_ms: 100,
            phase: Phase::Opening,
            speaker: Speaker::Pro,
            content: "opening statement".into(),
            metadata: Default::default(),
        };
        store.append_utterance(&utt).await.unwrap();
        store.append_utterance(&utt).await.unwrap();

        let transcript = store.load_transcript("s1").await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "opening statement");
    }

    #[tokio::test]
    async fn intervention_updates_fold_to_latest() {
        let (_dir, store) = store();
        store.create_debate(&record("s1")).await.unwrap();

        let iv = Intervention {
            id: "iv-1".into(),
            kind: InterventionKind::Question,
            content: "why?".into(),
            directed_to: None,
            status: InterventionStatus::Queued,
            response: None,
            client_key: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.append_intervention("s1", &iv).await.unwrap();
        store
            .update_intervention("s1", "iv-1", InterventionStatus::Processing, None)
            .await
            .unwrap();
        store
            .update_intervention("s1", "iv-1", InterventionStatus::Completed, Some("because".into()))
            .await
            .unwrap();

        let all = store.list_interventions("s1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, InterventionStatus::Completed);
        assert_eq!(all[0].response.as_deref(), Some("because"));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlStore::new(dir.path()).unwrap();
            store.create_debate(&record("s1")).await.unwrap();
            store
                .append_utterance(&Utterance {
                    session_id: "s1".into(),
                    index: 0,
                    ts_ms: 5,
                    phase: Phase::Opening,
                    speaker: Speaker::Con,
                    content: "persisted".into(),
                    metadata: Default::default(),
                })
                .await
                .unwrap();
        }
        let reopened = JsonlStore::new(dir.path()).unwrap();
        let transcript = reopened.load_transcript("s1").await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "persisted");
    }

    #[tokio::test]
    async fn malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path()).unwrap();
        store.create_debate(&record("s1")).await.unwrap();

        std::fs::write(
            dir.path().join("s1.transcript.jsonl"),
            "not json at all\n",
        )
        .unwrap();

        let transcript = store.load_transcript("s1").await.unwrap();
        assert!(transcript.is_empty());
    }
}
