//! The per-session run loop.
//!
//! One orchestrator task exclusively owns a debate: the state machine, the
//! turn cursor, the intervention queue head, the interruption budget, and
//! the in-flight LLM stream. Everything else reaches the session through
//! the command channel or the intervention queue, and both are consumed
//! only at safe points: between turns, and (for pause/stop) at token
//! boundaries inside a streaming turn. Store writes are never interrupted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::Instrument;

use agora_domain::clock::Clock;
use agora_domain::config::DebateConfig;
use agora_domain::debate::{Flow, Mode, Phase, PromptKind, Speaker, TurnDescriptor};
use agora_domain::error::{Error, Result};
use agora_domain::event::{EventKind, SystemEvent};
use agora_domain::intervention::Intervention;
use agora_domain::quality::{QualityEvaluation, ViolationKind};
use agora_domain::stream::{StreamEvent, Usage};
use agora_domain::utterance::{Utterance, UtteranceMetadata};
use agora_providers::{
    sanitize_response, with_backoff, BackoffPolicy, ChatRequest, ModelRouter, RateGate,
    ResolvedModel,
};
use agora_sessions::{DebateStatus, Store};

use crate::arbiter::ArbiterEvaluator;
use crate::interrupt::{
    HeuristicScorer, InterruptDecision, InterruptionEngine, LlmTriggerScorer, TriggerScorer,
};
use crate::interventions::InterventionQueue;
use crate::planner::TurnCursor;
use crate::prompt::{build_intervention_prompt, build_prompt, PromptContext};
use crate::publisher::EventPublisher;
use crate::state::{initial_phase, protocol_successor, StateMachine};

/// A model response shorter than this counts as empty.
const MIN_RESPONSE_CHARS: usize = 10;
/// Deadline for a single token to arrive.
const TOKEN_TIMEOUT_MS: u64 = 30_000;
/// Informal-mode cues that a participant considers the discussion done.
const QUIT_CUES: &[&str] = &["nothing further", "we've covered", "leave it there"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Control messages delivered to a running orchestrator.
#[derive(Debug)]
pub enum Command {
    Pause,
    Resume,
    Stop { reason: String },
    /// Swap the model behind a role; applied at the next turn.
    Reassign { role: String, model: String },
    /// Step-flow advance.
    Continue,
    /// An intervention was enqueued; drain at the next safe point.
    Wake,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) struct Orchestrator {
    session_id: String,
    config: DebateConfig,
    store: Arc<dyn Store>,
    publisher: Arc<EventPublisher>,
    router: Arc<ModelRouter>,
    rate_gate: Option<Arc<RateGate>>,
    clock: Arc<dyn Clock>,
    queue: Arc<InterventionQueue>,
    commands: mpsc::Receiver<Command>,

    state: StateMachine,
    cursor: TurnCursor,
    /// Utterance arena; `index` into it is the cross-reference currency.
    history: Vec<Utterance>,
    /// Turn number → utterance index, within the current phase.
    turn_indices: HashMap<u32, u64>,
    interrupter: Option<InterruptionEngine>,
    arbiter: Option<ArbiterEvaluator>,
    total_usage: Usage,
    /// Cut-off text carried into the next interjection/resumption prompt.
    pending_partial: Option<String>,
    /// Violation carried into the next arbiter interjection prompt.
    pending_violation: Option<ViolationKind>,
    /// Consecutive sub-threshold informal turns (convergence detection).
    short_turns: u32,
    store_backoff: BackoffPolicy,
}

enum StreamOutcome {
    Done {
        text: String,
        usage: Option<Usage>,
        latency_ms: u64,
    },
    Cutoff {
        partial: String,
        decision: InterruptDecision,
        usage: Option<Usage>,
        latency_ms: u64,
    },
    Paused,
    Stopped(String),
    Abandoned,
}

enum TurnOutcome {
    Complete {
        text: String,
        usage: Option<Usage>,
        latency_ms: u64,
        model: String,
    },
    Cutoff {
        partial: String,
        decision: InterruptDecision,
        usage: Option<Usage>,
        latency_ms: u64,
        model: String,
    },
    Empty,
    Paused,
    Stopped(String),
    Abandoned,
}

enum PauseExit {
    Resumed,
    Stopped(String),
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: String,
        config: DebateConfig,
        store: Arc<dyn Store>,
        publisher: Arc<EventPublisher>,
        router: Arc<ModelRouter>,
        rate_gate: Option<Arc<RateGate>>,
        clock: Arc<dyn Clock>,
        queue: Arc<InterventionQueue>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let interrupter = build_interrupter(&config, &router, &clock);
        let arbiter = (config.mode == Mode::Duelogic)
            .then(|| ArbiterEvaluator::new(config.duelogic.accountability, router.clone()));
        let state = StateMachine::new(session_id.clone(), clock.clone());

        Self {
            session_id,
            config,
            store,
            publisher,
            router,
            rate_gate,
            clock,
            queue,
            commands,
            state,
            cursor: TurnCursor::new(),
            history: Vec::new(),
            turn_indices: HashMap::new(),
            interrupter,
            arbiter,
            total_usage: Usage::default(),
            pending_partial: None,
            pending_violation: None,
            short_turns: 0,
            store_backoff: BackoffPolicy::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        let span = tracing::info_span!("debate", session_id = %self.session_id);
        async move {
            tracing::info!(mode = ?self.config.mode, "session started");
            match self.run_inner().await {
                Ok(()) => tracing::info!("session finished"),
                Err(e) => {
                    tracing::error!(error = %e, "session failed");
                    self.fail(e).await;
                }
            }
        }
        .instrument(span)
        .await
    }

    // ── The main loop ────────────────────────────────────────────────

    async fn run_inner(&mut self) -> Result<()> {
        let first = initial_phase(self.config.mode);
        self.apply_transition(first, None).await?;
        self.enter_phase(first);

        loop {
            // Safe point between turns.
            if let Some(reason) = self.drain_safe_point().await? {
                return self.finish_stopped(reason).await;
            }

            let Some(turn) = self.cursor.current().cloned() else {
                // Phase exhausted: deferred clarifications, then advance.
                self.answer_clarifications().await?;
                let phase = self.state.phase();
                let next = protocol_successor(phase, self.config.mode).ok_or_else(|| {
                    Error::Other(format!("phase {phase} has no successor"))
                })?;
                if next == Phase::Completed {
                    return self.finish_completed().await;
                }
                self.apply_transition(next, None).await?;
                self.enter_phase(next);
                continue;
            };

            self.publish(EventKind::TurnStarted {
                phase: self.state.phase(),
                turn_no: turn.turn_no,
                speaker: turn.speaker.clone(),
                kind: turn.kind,
            });

            match self.execute_turn(&turn).await? {
                TurnOutcome::Complete {
                    text,
                    usage,
                    latency_ms,
                    model,
                } => {
                    self.complete_turn(&turn, text, usage, latency_ms, model).await?;
                    self.cursor.advance();
                    if self.config.flow == Flow::Step {
                        if let Some(reason) = self.await_continue().await? {
                            return self.finish_stopped(reason).await;
                        }
                    }
                }
                TurnOutcome::Cutoff {
                    partial,
                    decision,
                    usage,
                    latency_ms,
                    model,
                } => {
                    self.handle_cutoff(&turn, partial, decision, usage, latency_ms, model)
                        .await?;
                }
                TurnOutcome::Empty => {
                    // The failed partial is discarded, never persisted. The
                    // session pauses so a client can reassign the model;
                    // the same turn re-runs on resume.
                    let role = turn.speaker.route_key();
                    self.publish(EventKind::EmptyResponse {
                        speaker: turn.speaker.clone(),
                    });
                    self.publish(EventKind::ModelError {
                        role: role.clone(),
                        message: "model returned empty content after retries".into(),
                    });
                    self.record_event(
                        "empty_response",
                        serde_json::json!({ "role": role, "turn_no": turn.turn_no }),
                    )
                    .await;
                    match self.pause_and_wait(Some(turn.speaker.clone())).await? {
                        PauseExit::Resumed => {}
                        PauseExit::Stopped(reason) => return self.finish_stopped(reason).await,
                    }
                }
                TurnOutcome::Paused => {
                    // Mid-stream pause: partial content is discarded and the
                    // same turn re-runs after resume.
                    match self.pause_and_wait(Some(turn.speaker.clone())).await? {
                        PauseExit::Resumed => {}
                        PauseExit::Stopped(reason) => return self.finish_stopped(reason).await,
                    }
                }
                TurnOutcome::Stopped(reason) => return self.finish_stopped(reason).await,
                TurnOutcome::Abandoned => {
                    self.publish(EventKind::Timeout {
                        speaker: turn.speaker.clone(),
                    });
                    self.record_event(
                        "turn_abandoned",
                        serde_json::json!({ "turn_no": turn.turn_no, "budget_ms": turn.budget_ms }),
                    )
                    .await;
                    self.cursor.advance();
                }
            }
        }
    }

    fn enter_phase(&mut self, phase: Phase) {
        self.cursor.reset(phase, self.config.mode, &self.config);
        self.turn_indices.clear();
        self.short_turns = 0;
    }

    // ── Turn execution ───────────────────────────────────────────────

    async fn execute_turn(&mut self, turn: &TurnDescriptor) -> Result<TurnOutcome> {
        let resolved = self.router.resolve(&turn.speaker.route_key())?;
        let partial = self.pending_partial.take();
        // Peeked, not taken: the violation is recorded on the utterance
        // when the interjection turn completes.
        let violation = self.pending_violation;

        let messages = build_prompt(&PromptContext {
            config: &self.config,
            turn,
            history: &self.history,
            citations: &[],
            partial: partial.as_deref(),
            violation,
        });
        let req = ChatRequest {
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            timeout_ms: Some(turn.budget_ms),
            json_mode: false,
            model: Some(resolved.model.clone()),
        };

        let mut empty_retries = 0u32;
        let mut transient_retries = 0u32;
        loop {
            match self.stream_turn(turn, &resolved, &req).await {
                Ok(StreamOutcome::Done {
                    text,
                    usage,
                    latency_ms,
                }) => {
                    let text = sanitize_response(&text);
                    if text.len() < MIN_RESPONSE_CHARS {
                        if empty_retries < self.config.empty_response_retries {
                            empty_retries += 1;
                            tracing::warn!(
                                speaker = %turn.speaker,
                                attempt = empty_retries,
                                "empty response; retrying with identical prompt"
                            );
                            self.record_event(
                                "empty_response_retry",
                                serde_json::json!({ "attempt": empty_retries }),
                            )
                            .await;
                            continue;
                        }
                        return Ok(TurnOutcome::Empty);
                    }
                    return Ok(TurnOutcome::Complete {
                        text,
                        usage,
                        latency_ms,
                        model: resolved.model_id.clone(),
                    });
                }
                Ok(StreamOutcome::Cutoff {
                    partial,
                    decision,
                    usage,
                    latency_ms,
                }) => {
                    return Ok(TurnOutcome::Cutoff {
                        partial: sanitize_response(&partial),
                        decision,
                        usage,
                        latency_ms,
                        model: resolved.model_id.clone(),
                    })
                }
                Ok(StreamOutcome::Paused) => return Ok(TurnOutcome::Paused),
                Ok(StreamOutcome::Stopped(reason)) => return Ok(TurnOutcome::Stopped(reason)),
                Ok(StreamOutcome::Abandoned) => return Ok(TurnOutcome::Abandoned),
                Err(e) if e.is_transient() && transient_retries < 2 => {
                    transient_retries += 1;
                    tracing::warn!(error = %e, attempt = transient_retries, "turn stream failed; retrying");
                    self.record_event(
                        "turn_retry",
                        serde_json::json!({ "error": e.to_string(), "attempt": transient_retries }),
                    )
                    .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One streaming attempt: publish tokens, watch for interruptions, and
    /// honour pause/stop at token boundaries.
    async fn stream_turn(
        &mut self,
        turn: &TurnDescriptor,
        resolved: &ResolvedModel,
        req: &ChatRequest,
    ) -> Result<StreamOutcome> {
        if let Some(gate) = &self.rate_gate {
            gate.acquire().await;
        }

        let started_ms = self.clock.monotonic_ms();
        let provider = resolved.provider.clone();
        let mut stream =
            with_backoff(BackoffPolicy::default(), "llm stream connect", || {
                provider.chat_stream(req)
            })
            .await?;

        let interruptible = self.interrupter.is_some()
            && turn.speaker.is_agent()
            && !matches!(turn.kind, PromptKind::Interjection);
        if interruptible {
            if let Some(engine) = self.interrupter.as_mut() {
                engine.begin_turn();
            }
        }

        let mut text = String::new();
        let mut usage = None;
        loop {
            let elapsed = self.clock.elapsed_ms_since(started_ms);
            let Some(remaining) = turn.budget_ms.checked_sub(elapsed).filter(|r| *r > 0) else {
                return Ok(StreamOutcome::Abandoned);
            };
            let token_deadline = Duration::from_millis(remaining.min(TOKEN_TIMEOUT_MS));

            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Pause) => return Ok(StreamOutcome::Paused),
                    Some(Command::Stop { reason }) => return Ok(StreamOutcome::Stopped(reason)),
                    Some(Command::Reassign { role, model }) => {
                        self.router.reassign(&role, model);
                    }
                    Some(Command::Resume | Command::Continue | Command::Wake) => {}
                    None => return Ok(StreamOutcome::Stopped("controller detached".into())),
                },
                next = tokio::time::timeout(token_deadline, stream.next()) => match next {
                    Err(_) => return Err(Error::Timeout("token stream stalled".into())),
                    Ok(None) => break,
                    Ok(Some(Err(e))) => return Err(e),
                    Ok(Some(Ok(StreamEvent::Token { text: token }))) => {
                        self.publish(EventKind::Token {
                            speaker: turn.speaker.clone(),
                            text: token.clone(),
                        });
                        text.push_str(&token);

                        if interruptible {
                            let decision = match self.interrupter.as_mut() {
                                Some(engine) => engine.observe(&turn.speaker, &text).await,
                                None => None,
                            };
                            if let Some(decision) = decision {
                                // Soft cutoff: decisions land on sentence
                                // boundaries, so the sentence in flight is
                                // already complete. Dropping the stream
                                // cancels the provider call.
                                self.publish(EventKind::InterruptScheduled {
                                    interrupter: decision.interrupter.clone(),
                                    trigger: decision.trigger,
                                    score: decision.score,
                                });
                                self.record_event(
                                    "interrupt_scheduled",
                                    serde_json::json!({
                                        "interrupter": decision.interrupter.route_key(),
                                        "trigger": decision.trigger.as_str(),
                                        "score": decision.score,
                                    }),
                                )
                                .await;
                                return Ok(StreamOutcome::Cutoff {
                                    partial: text,
                                    decision,
                                    usage,
                                    latency_ms: self.clock.elapsed_ms_since(started_ms),
                                });
                            }
                        }
                    }
                    Ok(Some(Ok(StreamEvent::Done { usage: u, .. }))) => {
                        usage = u;
                        break;
                    }
                    Ok(Some(Ok(StreamEvent::Error { message }))) => {
                        return Err(Error::Http(message));
                    }
                },
            }
        }

        Ok(StreamOutcome::Done {
            text,
            usage,
            latency_ms: self.clock.elapsed_ms_since(started_ms),
        })
    }

    // ── Turn completion ──────────────────────────────────────────────

    async fn complete_turn(
        &mut self,
        turn: &TurnDescriptor,
        text: String,
        usage: Option<Usage>,
        latency_ms: u64,
        model: String,
    ) -> Result<()> {
        // Duelogic: evaluate chair contributions before persisting so the
        // quality summary rides along in the utterance metadata.
        let mut quality: Option<QualityEvaluation> = None;
        let mut interject: Option<ViolationKind> = None;
        if matches!(turn.speaker, Speaker::Chair { .. })
            && matches!(turn.kind, PromptKind::Exchange | PromptKind::Resumption)
        {
            if let Some(arbiter) = &self.arbiter {
                let opponents = opponent_positions(&self.config, &turn.speaker);
                match arbiter.evaluate(&turn.speaker, &text, &opponents).await {
                    Ok(eval) => {
                        if arbiter.should_interject(&eval) {
                            interject = Some(arbiter.violation_for(&eval));
                        }
                        quality = Some(eval);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "arbiter evaluation failed");
                        self.record_event(
                            "arbiter_evaluation_failed",
                            serde_json::json!({ "error": e.to_string() }),
                        )
                        .await;
                    }
                }
            }
        }

        // An arbiter correction carries the violation it names.
        let violation = if turn.kind == PromptKind::Interjection {
            self.pending_violation.take()
        } else {
            None
        };

        let index = self
            .persist_utterance(
                turn,
                text.clone(),
                UtteranceMetadata {
                    tokens: usage,
                    model: Some(model),
                    latency_ms: Some(latency_ms),
                    truncated: false,
                    responds_to: None,
                    trigger: None,
                    violation,
                    quality,
                },
            )
            .await?;

        if turn.kind == PromptKind::Interjection {
            self.publish(EventKind::Interjection {
                speaker: turn.speaker.clone(),
                text: text.clone(),
            });
        }

        if let Some(violation) = interject {
            self.pending_violation = Some(violation);
            self.cursor.insert_next(
                Speaker::Arbiter,
                PromptKind::Interjection,
                turn.budget_ms,
                Some(turn.turn_no),
            );
            self.record_event(
                "arbiter_interjection",
                serde_json::json!({
                    "violation": violation.as_str(),
                    "subject_index": index,
                }),
            )
            .await;
        }

        // Informal end detection: explicit quit cues or convergence.
        if self.state.phase() == Phase::Informal && turn.kind == PromptKind::Remark {
            let lower = text.to_lowercase();
            let quit = QUIT_CUES.iter().any(|cue| lower.contains(cue));
            if text.len() < self.config.informal.min_turn_chars {
                self.short_turns += 1;
            } else {
                self.short_turns = 0;
            }
            if quit || self.short_turns >= self.config.informal.convergence_turns {
                tracing::debug!(quit, short_turns = self.short_turns, "informal end detected");
                self.cursor.finish_phase();
            }
        }

        Ok(())
    }

    async fn handle_cutoff(
        &mut self,
        turn: &TurnDescriptor,
        partial: String,
        decision: InterruptDecision,
        usage: Option<Usage>,
        latency_ms: u64,
        model: String,
    ) -> Result<()> {
        self.publish(EventKind::SpeakerCutoff {
            speaker: turn.speaker.clone(),
            partial_text: partial.clone(),
        });

        self.persist_utterance(
            turn,
            partial.clone(),
            UtteranceMetadata {
                tokens: usage,
                model: Some(model),
                latency_ms: Some(latency_ms),
                truncated: true,
                responds_to: None,
                trigger: Some(decision.trigger),
                violation: None,
                quality: None,
            },
        )
        .await?;

        self.publish(EventKind::InterruptFired {
            interrupter: decision.interrupter.clone(),
        });
        self.record_event(
            "interrupt_fired",
            serde_json::json!({
                "interrupter": decision.interrupter.route_key(),
                "trigger": decision.trigger.as_str(),
                "cut_turn_no": turn.turn_no,
            }),
        )
        .await;

        self.cursor.insert_next(
            decision.interrupter.clone(),
            PromptKind::Interjection,
            turn.budget_ms,
            Some(turn.turn_no),
        );
        // Planner decides whether the cut-off speaker resumes.
        self.cursor.on_cutoff(self.config.mode, turn);
        self.pending_partial = Some(partial);
        self.cursor.advance();
        Ok(())
    }

    async fn persist_utterance(
        &mut self,
        turn: &TurnDescriptor,
        content: String,
        mut metadata: UtteranceMetadata,
    ) -> Result<u64> {
        let index = self.history.len() as u64;
        metadata.responds_to = turn
            .responds_to
            .and_then(|no| self.turn_indices.get(&no).copied());

        let utterance = Utterance {
            session_id: self.session_id.clone(),
            index,
            ts_ms: self.state.elapsed_active_ms(),
            phase: self.state.phase(),
            speaker: turn.speaker.clone(),
            content,
            metadata,
        };

        let store = self.store.clone();
        with_backoff(self.store_backoff, "append utterance", || {
            store.append_utterance(&utterance)
        })
        .await?;

        if let Some(u) = &utterance.metadata.tokens {
            self.total_usage.accumulate(u);
        }
        self.turn_indices.insert(turn.turn_no, index);
        self.history.push(utterance.clone());
        self.publish(EventKind::Utterance { utterance });
        Ok(index)
    }

    // ── Safe points, pause, step flow ────────────────────────────────

    /// Consume commands and ready interventions between turns. Returns a
    /// stop reason when the session should terminate.
    async fn drain_safe_point(&mut self) -> Result<Option<String>> {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Pause) => {
                    let speaker = self.cursor.current().map(|t| t.speaker.clone());
                    match self.pause_and_wait(speaker).await? {
                        PauseExit::Resumed => {}
                        PauseExit::Stopped(reason) => return Ok(Some(reason)),
                    }
                }
                Ok(Command::Stop { reason }) => return Ok(Some(reason)),
                Ok(Command::Reassign { role, model }) => self.router.reassign(&role, model),
                Ok(Command::Resume | Command::Continue | Command::Wake) => {}
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            }
        }

        while let Some(intervention) = self.queue.peek_ready(true) {
            self.process_intervention(intervention).await?;
        }
        Ok(None)
    }

    /// Enter `paused`, then wait for resume (or reassign, which implies
    /// resume) or stop.
    async fn pause_and_wait(&mut self, resume_speaker: Option<Speaker>) -> Result<PauseExit> {
        let transition = self.state.pause()?;
        self.persist_phase(DebateStatus::Paused).await?;
        self.publish(EventKind::PhaseTransition {
            from: transition.from,
            to: transition.to,
            speaker: None,
            elapsed_ms: transition.elapsed_ms,
        });
        self.publish(EventKind::Paused);

        loop {
            match self.commands.recv().await {
                Some(Command::Resume) => break,
                Some(Command::Reassign { role, model }) => {
                    self.router.reassign(&role, model);
                    break;
                }
                Some(Command::Stop { reason }) => return Ok(PauseExit::Stopped(reason)),
                Some(Command::Pause | Command::Continue | Command::Wake) => {}
                None => return Ok(PauseExit::Stopped("controller detached".into())),
            }
        }

        let transition = self.state.resume(resume_speaker)?;
        self.persist_phase(DebateStatus::Running).await?;
        self.publish(EventKind::PhaseTransition {
            from: transition.from,
            to: transition.to,
            speaker: transition.speaker.clone(),
            elapsed_ms: transition.elapsed_ms,
        });
        self.publish(EventKind::Resumed {
            phase: self.state.phase(),
        });
        Ok(PauseExit::Resumed)
    }

    /// Step flow: hold between turns until the user sends `continue`.
    async fn await_continue(&mut self) -> Result<Option<String>> {
        loop {
            match self.commands.recv().await {
                Some(Command::Continue) => return Ok(None),
                Some(Command::Stop { reason }) => return Ok(Some(reason)),
                Some(Command::Pause) => {
                    let speaker = self.cursor.current().map(|t| t.speaker.clone());
                    match self.pause_and_wait(speaker).await? {
                        PauseExit::Resumed => {}
                        PauseExit::Stopped(reason) => return Ok(Some(reason)),
                    }
                }
                Some(Command::Reassign { role, model }) => self.router.reassign(&role, model),
                Some(Command::Resume) => {}
                Some(Command::Wake) => {
                    while let Some(intervention) = self.queue.peek_ready(true) {
                        self.process_intervention(intervention).await?;
                    }
                }
                None => return Ok(Some("controller detached".into())),
            }
        }
    }

    // ── Interventions ────────────────────────────────────────────────

    /// Answer one content intervention: persist the user's words, get a
    /// response from the directed speaker (moderator by default), persist
    /// and publish it, and close out the record.
    async fn process_intervention(&mut self, intervention: Intervention) -> Result<()> {
        self.queue.mark_processing(&intervention.id)?;
        self.update_intervention_store(
            &intervention.id,
            agora_domain::intervention::InterventionStatus::Processing,
            None,
        )
        .await;

        // The user's words enter the transcript.
        let user_turn = TurnDescriptor {
            turn_no: self.next_spliced_turn_no(),
            speaker: Speaker::User,
            kind: PromptKind::Interjection,
            budget_ms: 0,
            responds_to: None,
        };
        self.persist_utterance(
            &user_turn,
            intervention.content.clone(),
            UtteranceMetadata {
                model: Some("user".into()),
                ..Default::default()
            },
        )
        .await?;

        let responder = intervention
            .directed_to
            .clone()
            .unwrap_or(Speaker::Moderator);
        let response = self.respond_to_intervention(&responder, &intervention).await;

        match response {
            Ok(text) => {
                // The back-reference resolves through the turn-number map
                // the user utterance was just registered under.
                let responder_turn = TurnDescriptor {
                    turn_no: self.next_spliced_turn_no(),
                    speaker: responder,
                    kind: PromptKind::Interjection,
                    budget_ms: 0,
                    responds_to: Some(user_turn.turn_no),
                };
                self.persist_utterance(
                    &responder_turn,
                    text.clone(),
                    UtteranceMetadata::default(),
                )
                .await?;

                self.publish(EventKind::InterventionResponse {
                    intervention_id: intervention.id.clone(),
                    response: text.clone(),
                });
                self.queue.mark_completed(&intervention.id, text.clone())?;
                self.update_intervention_store(
                    &intervention.id,
                    agora_domain::intervention::InterventionStatus::Completed,
                    Some(text),
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, intervention = %intervention.id, "intervention failed");
                self.queue.mark_failed(&intervention.id, e.to_string())?;
                self.update_intervention_store(
                    &intervention.id,
                    agora_domain::intervention::InterventionStatus::Failed,
                    Some(e.to_string()),
                )
                .await;
                self.record_event(
                    "intervention_failed",
                    serde_json::json!({ "id": intervention.id, "error": e.to_string() }),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn respond_to_intervention(
        &self,
        responder: &Speaker,
        intervention: &Intervention,
    ) -> Result<String> {
        let resolved = self.router.resolve(&responder.route_key())?;
        let messages = build_intervention_prompt(
            &self.config,
            responder,
            &self.history,
            intervention,
        );
        let req = ChatRequest {
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            timeout_ms: Some(self.config.turn_timeout_ms),
            json_mode: false,
            model: Some(resolved.model.clone()),
        };
        if let Some(gate) = &self.rate_gate {
            gate.acquire().await;
        }
        let provider = resolved.provider.clone();
        let response =
            with_backoff(BackoffPolicy::default(), "intervention response", || {
                provider.chat(&req)
            })
            .await?;
        let text = sanitize_response(&response.content);
        if text.len() < MIN_RESPONSE_CHARS {
            return Err(Error::EmptyResponse {
                model: resolved.model_id.clone(),
            });
        }
        Ok(text)
    }

    /// Deferred clarifications are answered at phase boundaries.
    async fn answer_clarifications(&mut self) -> Result<()> {
        for intervention in self.queue.pending_clarifications() {
            self.process_intervention(intervention).await?;
        }
        Ok(())
    }

    fn next_spliced_turn_no(&self) -> u32 {
        // User/intervention utterances sit outside the planned turn
        // numbering; use a high range that planned turns never reach.
        u32::MAX - self.history.len() as u32
    }

    // ── Termination ──────────────────────────────────────────────────

    async fn finish_completed(&mut self) -> Result<()> {
        // Every intervention must reach a terminal status first.
        while let Some(intervention) = self.queue.peek_ready(false) {
            self.process_intervention(intervention).await?;
        }

        self.apply_transition(Phase::Completed, None).await?;
        self.publish(EventKind::Completed);
        let elapsed = self.state.elapsed_active_ms();
        let store = self.store.clone();
        let session_id = self.session_id.clone();
        let usage = self.total_usage;
        let ended_at = self.clock.now();
        with_backoff(self.store_backoff, "finish debate", || {
            store.finish_debate(&session_id, DebateStatus::Completed, elapsed, usage, ended_at)
        })
        .await?;
        tracing::info!(elapsed_ms = elapsed, "debate completed");
        Ok(())
    }

    async fn finish_stopped(&mut self, reason: String) -> Result<()> {
        // Remaining queued interventions can no longer be served.
        while let Some(intervention) = self.queue.peek_ready(false) {
            self.queue.mark_processing(&intervention.id)?;
            self.queue.mark_failed(&intervention.id, "session stopped")?;
            self.update_intervention_store(
                &intervention.id,
                agora_domain::intervention::InterventionStatus::Failed,
                Some("session stopped".into()),
            )
            .await;
        }

        self.publish(EventKind::Stopped {
            reason: reason.clone(),
        });
        self.record_event("stopped", serde_json::json!({ "reason": reason }))
            .await;

        let elapsed = self.state.elapsed_active_ms();
        let store = self.store.clone();
        let session_id = self.session_id.clone();
        let usage = self.total_usage;
        let ended_at = self.clock.now();
        with_backoff(self.store_backoff, "finish debate", || {
            store.finish_debate(&session_id, DebateStatus::Stopped, elapsed, usage, ended_at)
        })
        .await?;
        tracing::info!(reason = %reason, "debate stopped");
        Ok(())
    }

    /// Convert any error into the `error` phase and a final error event.
    async fn fail(&mut self, error: Error) {
        let reason = error.to_string();
        if !self.state.phase().is_terminal() {
            if let Ok(transition) = self.state.transition(Phase::Error, None) {
                self.publish(EventKind::PhaseTransition {
                    from: transition.from,
                    to: transition.to,
                    speaker: None,
                    elapsed_ms: transition.elapsed_ms,
                });
            }
        }
        self.publish(EventKind::Error {
            reason: reason.clone(),
        });
        self.record_event("session_error", serde_json::json!({ "reason": reason }))
            .await;

        let elapsed = self.state.elapsed_active_ms();
        if let Err(e) = self
            .store
            .finish_debate(
                &self.session_id,
                DebateStatus::Error,
                elapsed,
                self.total_usage,
                self.clock.now(),
            )
            .await
        {
            tracing::error!(error = %e, "failed to persist error status");
        }
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    async fn apply_transition(&mut self, to: Phase, speaker: Option<Speaker>) -> Result<()> {
        let transition = self.state.transition(to, speaker)?;
        let status = match to {
            Phase::Completed => DebateStatus::Completed,
            Phase::Error => DebateStatus::Error,
            Phase::Paused => DebateStatus::Paused,
            _ => DebateStatus::Running,
        };
        self.persist_phase(status).await?;
        self.publish(EventKind::PhaseTransition {
            from: transition.from,
            to: transition.to,
            speaker: transition.speaker.clone(),
            elapsed_ms: transition.elapsed_ms,
        });
        Ok(())
    }

    async fn persist_phase(&self, status: DebateStatus) -> Result<()> {
        let store = self.store.clone();
        let session_id = self.session_id.clone();
        let phase = self.state.phase();
        let speaker = self.cursor.current().map(|t| t.speaker.clone());
        with_backoff(self.store_backoff, "update debate phase", || {
            store.update_debate_phase(&session_id, phase, speaker.clone(), status)
        })
        .await
    }

    async fn update_intervention_store(
        &self,
        id: &str,
        status: agora_domain::intervention::InterventionStatus,
        response: Option<String>,
    ) {
        if let Err(e) = self
            .store
            .update_intervention(&self.session_id, id, status, response)
            .await
        {
            tracing::warn!(error = %e, intervention = id, "intervention status write failed");
        }
    }

    fn publish(&self, kind: EventKind) {
        self.publisher
            .publish(&self.session_id, self.state.elapsed_active_ms(), kind);
    }

    async fn record_event(&self, kind: &str, detail: serde_json::Value) {
        self.store
            .record_event(&SystemEvent {
                session_id: self.session_id.clone(),
                ts_ms: self.state.elapsed_active_ms(),
                kind: kind.to_string(),
                detail,
            })
            .await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wiring helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_interrupter(
    config: &DebateConfig,
    router: &Arc<ModelRouter>,
    clock: &Arc<dyn Clock>,
) -> Option<InterruptionEngine> {
    let candidates: Vec<Speaker> = match config.mode {
        Mode::Lively => vec![Speaker::Con, Speaker::Pro],
        Mode::Duelogic if config.duelogic.interruptions => config
            .duelogic
            .chairs
            .iter()
            .map(|c| c.speaker())
            .collect(),
        _ => return None,
    };

    let scorer: Arc<dyn TriggerScorer> = if config.lively.llm_scoring {
        Arc::new(LlmTriggerScorer::new(router.clone()))
    } else {
        Arc::new(HeuristicScorer::new(&config.lively))
    };

    Some(InterruptionEngine::new(
        config.lively.clone(),
        scorer,
        clock.clone(),
        candidates,
    ))
}

/// Short descriptions of the other chairs, for arbiter context.
fn opponent_positions(config: &DebateConfig, speaker: &Speaker) -> Vec<String> {
    config
        .duelogic
        .chairs
        .iter()
        .filter(|c| &c.speaker() != speaker)
        .map(|c| format!("the {} chair arguing from {}", c.position, c.framework))
        .collect()
}
