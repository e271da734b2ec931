//! Session lifecycle API.
//!
//! The manager owns the map of live sessions and is the single place the
//! outer system touches a running debate: create, start, pause, resume,
//! stop, intervene, reassign, subscribe. Exactly one orchestrator task
//! owns a debate for its active lifetime; a second `start_session` is
//! rejected with `AlreadyStarted`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use agora_domain::clock::{Clock, IdGen, SystemClock};
use agora_domain::config::{ConfigSeverity, DebateConfig};
use agora_domain::debate::Speaker;
use agora_domain::error::{Error, Result};
use agora_domain::intervention::{Intervention, InterventionKind, InterventionStatus};
use agora_providers::{LlmProvider, ModelRouter, RateGate};
use agora_sessions::{DebateRecord, DebateStatus, Store};

use crate::interventions::{validate, InterventionQueue};
use crate::orchestrator::{Command, Orchestrator};
use crate::publisher::{EventPublisher, Subscription, HEARTBEAT_INTERVAL};

/// Command channel depth per session.
const COMMAND_CAPACITY: usize = 64;

struct SessionHandle {
    commands: mpsc::Sender<Command>,
    queue: Arc<InterventionQueue>,
    task: Mutex<Option<JoinHandle<()>>>,
}

pub struct SessionManager {
    store: Arc<dyn Store>,
    publisher: Arc<EventPublisher>,
    clock: Arc<dyn Clock>,
    providers: Vec<Arc<dyn LlmProvider>>,
    rate_gate: Option<Arc<RateGate>>,
    ids: IdGen,
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Wire a manager with the system clock and no provider rate gate.
    pub fn new(store: Arc<dyn Store>, providers: Vec<Arc<dyn LlmProvider>>) -> Arc<Self> {
        Self::with_clock(store, providers, Arc::new(SystemClock::new()), None)
    }

    /// Full wiring: injectable clock (tests) and optional shared rate gate.
    pub fn with_clock(
        store: Arc<dyn Store>,
        providers: Vec<Arc<dyn LlmProvider>>,
        clock: Arc<dyn Clock>,
        rate_gate: Option<Arc<RateGate>>,
    ) -> Arc<Self> {
        let publisher = Arc::new(EventPublisher::new(clock.clone()));
        let heartbeat = publisher.spawn_heartbeats(HEARTBEAT_INTERVAL);
        Arc::new(Self {
            store,
            publisher,
            clock,
            providers,
            rate_gate,
            ids: IdGen::new(),
            sessions: Mutex::new(HashMap::new()),
            heartbeat: Mutex::new(Some(heartbeat)),
        })
    }

    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn handle(&self, session_id: &str) -> Result<Arc<SessionHandle>> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::NotRunning(session_id.to_string()))
    }

    async fn send(&self, session_id: &str, command: Command) -> Result<()> {
        let handle = self.handle(session_id)?;
        handle
            .commands
            .send(command)
            .await
            .map_err(|_| Error::NotRunning(session_id.to_string()))
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Validate and persist a new debate. Returns its session id.
    pub async fn create_session(&self, config: DebateConfig) -> Result<String> {
        let issues = config.validate();
        let errors: Vec<String> = issues
            .iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .map(ToString::to_string)
            .collect();
        if !errors.is_empty() {
            return Err(Error::InvalidConfig(errors.join("; ")));
        }
        for issue in &issues {
            tracing::warn!(%issue, "config warning");
        }

        let session_id = self.ids.next("dbt");
        let record = DebateRecord::new(&session_id, config, self.clock.now());
        self.store.create_debate(&record).await?;
        tracing::info!(session_id = %session_id, "session created");
        Ok(session_id)
    }

    /// Begin orchestration for a created session.
    pub async fn start_session(&self, session_id: &str) -> Result<()> {
        let record = self.store.load_debate(session_id).await?;
        if record.status != DebateStatus::Created {
            return Err(Error::AlreadyStarted(session_id.to_string()));
        }

        let mut router = ModelRouter::new(record.config.models.clone());
        for provider in &self.providers {
            router.register(provider.clone());
        }
        let router = Arc::new(router);

        let queue = Arc::new(InterventionQueue::new());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

        let mut sessions = self.sessions.lock();
        if sessions.contains_key(session_id) {
            return Err(Error::AlreadyStarted(session_id.to_string()));
        }

        let orchestrator = Orchestrator::new(
            session_id.to_string(),
            record.config,
            self.store.clone(),
            self.publisher.clone(),
            router,
            self.rate_gate.clone(),
            self.clock.clone(),
            queue.clone(),
            commands_rx,
        );
        let task = tokio::spawn(orchestrator.run());

        sessions.insert(
            session_id.to_string(),
            Arc::new(SessionHandle {
                commands: commands_tx,
                queue,
                task: Mutex::new(Some(task)),
            }),
        );
        Ok(())
    }

    pub async fn pause_session(&self, session_id: &str) -> Result<()> {
        self.send(session_id, Command::Pause).await
    }

    pub async fn resume_session(&self, session_id: &str) -> Result<()> {
        let handle = self.handle(session_id)?;
        let record = self.store.load_debate(session_id).await?;
        if record.status != DebateStatus::Paused {
            return Err(Error::NotPaused(session_id.to_string()));
        }
        handle
            .commands
            .send(Command::Resume)
            .await
            .map_err(|_| Error::NotRunning(session_id.to_string()))
    }

    /// Graceful termination within one turn-timeout budget.
    pub async fn stop_session(&self, session_id: &str, reason: impl Into<String>) -> Result<()> {
        self.send(
            session_id,
            Command::Stop {
                reason: reason.into(),
            },
        )
        .await
    }

    /// Swap the model behind a role; takes effect at the next turn. Also
    /// resumes a session paused on a model failure.
    pub async fn reassign_model(
        &self,
        session_id: &str,
        role: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<()> {
        self.send(
            session_id,
            Command::Reassign {
                role: role.into(),
                model: model.into(),
            },
        )
        .await
    }

    /// Record a user intervention. Persistence is synchronous; the record
    /// is acted on at the orchestrator's next safe point. Returns the
    /// intervention id (the existing one when a client key repeats).
    pub async fn enqueue_intervention(
        &self,
        session_id: &str,
        kind: InterventionKind,
        content: impl Into<String>,
        directed_to: Option<Speaker>,
        client_key: Option<String>,
    ) -> Result<String> {
        let handle = self.handle(session_id)?;
        let now = self.clock.now();
        let intervention = Intervention {
            id: self.ids.next("iv"),
            kind,
            content: content.into(),
            directed_to,
            status: InterventionStatus::Queued,
            response: None,
            client_key,
            created_at: now,
            updated_at: now,
        };
        validate(&intervention)?;

        let id = self
            .store
            .append_intervention(session_id, &intervention)
            .await?;
        if id != intervention.id {
            // Client-key replay: the original enqueue already took effect.
            return Ok(id);
        }

        match kind {
            InterventionKind::PauseRequest => {
                self.ack_control(session_id, &id, "pausing").await;
                self.send(session_id, Command::Pause).await?;
            }
            InterventionKind::Resume => {
                self.ack_control(session_id, &id, "resuming").await;
                self.send(session_id, Command::Resume).await?;
            }
            InterventionKind::Stop => {
                let reason = if intervention.content.trim().is_empty() {
                    "stopped by user".to_string()
                } else {
                    intervention.content.clone()
                };
                self.ack_control(session_id, &id, "stopping").await;
                self.send(session_id, Command::Stop { reason }).await?;
            }
            InterventionKind::Continue => {
                self.ack_control(session_id, &id, "continuing").await;
                self.send(session_id, Command::Continue).await?;
            }
            _ => {
                handle.queue.enqueue(intervention)?;
                self.send(session_id, Command::Wake).await?;
            }
        }
        Ok(id)
    }

    /// Control interventions are acknowledged as soon as the command is
    /// dispatched; their effect is visible through session events.
    async fn ack_control(&self, session_id: &str, id: &str, response: &str) {
        for (status, response) in [
            (InterventionStatus::Processing, None),
            (InterventionStatus::Completed, Some(response.to_string())),
        ] {
            if let Err(e) = self
                .store
                .update_intervention(session_id, id, status, response)
                .await
            {
                tracing::warn!(error = %e, intervention = id, "control ack write failed");
            }
        }
    }

    /// Attach to a session's event stream, optionally resuming from a
    /// last-seen sequence number.
    pub async fn subscribe(
        &self,
        session_id: &str,
        last_seq: Option<u64>,
    ) -> Result<Subscription> {
        self.store.load_debate(session_id).await?;
        Ok(self.publisher.subscribe(session_id, last_seq))
    }

    /// Await the session's orchestrator task and release its handle.
    pub async fn wait(&self, session_id: &str) -> Result<()> {
        let task = {
            let handle = self.handle(session_id)?;
            let mut slot = handle.task.lock();
            slot.take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }
        self.sessions.lock().remove(session_id);
        Ok(())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.lock().take() {
            heartbeat.abort();
        }
    }
}
