//! Turn planning: who speaks next, about what.
//!
//! [`plan_phase`] is a pure function of `(phase, mode, config)`; the
//! [`TurnCursor`] is the stateful view the orchestrator drives. Modes that
//! have no turns for a protocol phase get an empty plan and the phase is
//! passed straight through.

use agora_domain::config::DebateConfig;
use agora_domain::debate::{Mode, Phase, PromptKind, Speaker, TurnDescriptor};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phase plans
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The ordered, finite turn list for one phase.
pub fn plan_phase(phase: Phase, mode: Mode, config: &DebateConfig) -> Vec<TurnDescriptor> {
    match mode {
        Mode::TurnBased | Mode::Lively => plan_structured(phase, config),
        Mode::Duelogic => plan_duelogic(phase, config),
        Mode::Informal => plan_informal(phase, config),
    }
}

fn turn(
    turn_no: u32,
    speaker: Speaker,
    kind: PromptKind,
    budget_ms: u64,
    responds_to: Option<u32>,
) -> TurnDescriptor {
    TurnDescriptor {
        turn_no,
        speaker,
        kind,
        budget_ms,
        responds_to,
    }
}

fn push(
    turns: &mut Vec<TurnDescriptor>,
    speaker: Speaker,
    kind: PromptKind,
    budget_ms: u64,
    responds_to: Option<u32>,
) -> u32 {
    let no = turns.len() as u32;
    turns.push(turn(no, speaker, kind, budget_ms, responds_to));
    no
}

fn plan_structured(phase: Phase, config: &DebateConfig) -> Vec<TurnDescriptor> {
    let budget = config.turn_timeout_ms;
    let mut turns = Vec::new();

    match phase {
        Phase::Opening => {
            push(&mut turns, Speaker::Pro, PromptKind::Opening, budget, None);
            push(&mut turns, Speaker::Con, PromptKind::Opening, budget, None);
        }
        Phase::Constructive => {
            for _ in 0..config.constructive_rounds {
                push(&mut turns, Speaker::Pro, PromptKind::Constructive, budget, None);
                push(&mut turns, Speaker::Con, PromptKind::Constructive, budget, None);
            }
        }
        Phase::CrossExam => {
            // Each round: pro asks, con answers, con asks, pro answers.
            // Answers carry a back-reference to the question turn.
            for _ in 0..(config.constructive_rounds / 2) {
                let q = push(&mut turns, Speaker::Pro, PromptKind::CrossExamQ, budget, None);
                push(&mut turns, Speaker::Con, PromptKind::CrossExamA, budget, Some(q));
                let q = push(&mut turns, Speaker::Con, PromptKind::CrossExamQ, budget, None);
                push(&mut turns, Speaker::Pro, PromptKind::CrossExamA, budget, Some(q));
            }
        }
        Phase::Rebuttal => {
            push(&mut turns, Speaker::Con, PromptKind::Rebuttal, budget, None);
            push(&mut turns, Speaker::Pro, PromptKind::Rebuttal, budget, None);
        }
        Phase::Closing => {
            // Pro gets the last word.
            push(&mut turns, Speaker::Con, PromptKind::Closing, budget, None);
            push(&mut turns, Speaker::Pro, PromptKind::Closing, budget, None);
        }
        Phase::Synthesis => {
            push(&mut turns, Speaker::Moderator, PromptKind::Synthesis, budget, None);
        }
        _ => {}
    }
    turns
}

fn plan_duelogic(phase: Phase, config: &DebateConfig) -> Vec<TurnDescriptor> {
    let budget = config.turn_timeout_ms;
    let settings = &config.duelogic;
    let mut turns = Vec::new();

    match phase {
        Phase::Opening if settings.arbiter_brackets => {
            turns.push(turn(0, Speaker::Arbiter, PromptKind::Opening, budget, None));
        }
        Phase::Constructive => {
            // Round-robin chair exchanges, each responding to the previous.
            let mut no = 0u32;
            for _ in 0..settings.max_exchanges {
                for chair in &settings.chairs {
                    let responds_to = no.checked_sub(1);
                    turns.push(turn(
                        no,
                        chair.speaker(),
                        PromptKind::Exchange,
                        budget,
                        responds_to,
                    ));
                    no += 1;
                }
            }
        }
        Phase::Closing if settings.arbiter_brackets => {
            turns.push(turn(0, Speaker::Arbiter, PromptKind::Closing, budget, None));
        }
        _ => {}
    }
    turns
}

fn plan_informal(phase: Phase, config: &DebateConfig) -> Vec<TurnDescriptor> {
    let budget = config.turn_timeout_ms;
    let settings = &config.informal;
    let mut turns = Vec::new();

    match phase {
        Phase::Informal => {
            for no in 0..settings.max_turns {
                let index = (no % settings.participants as u32) as u8 + 1;
                turns.push(turn(
                    no,
                    Speaker::Participant { index },
                    PromptKind::Remark,
                    budget,
                    None,
                ));
            }
        }
        Phase::Wrapup => {
            turns.push(turn(0, Speaker::Moderator, PromptKind::Wrapup, budget, None));
        }
        _ => {}
    }
    turns
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cursor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stateful view over a phase plan. Owned by the orchestrator; interjection
/// turns are spliced in ahead of the planned remainder.
pub struct TurnCursor {
    phase: Phase,
    turns: Vec<TurnDescriptor>,
    position: usize,
    /// Next turn number to hand out for spliced-in turns.
    next_no: u32,
}

impl TurnCursor {
    pub fn new() -> Self {
        Self {
            phase: Phase::Initializing,
            turns: Vec::new(),
            position: 0,
            next_no: 0,
        }
    }

    /// Re-plan for a phase, resetting the position.
    pub fn reset(&mut self, phase: Phase, mode: Mode, config: &DebateConfig) {
        self.turns = plan_phase(phase, mode, config);
        self.phase = phase;
        self.position = 0;
        self.next_no = self.turns.len() as u32;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current(&self) -> Option<&TurnDescriptor> {
        self.turns.get(self.position)
    }

    pub fn peek_next(&self) -> Option<&TurnDescriptor> {
        self.turns.get(self.position + 1)
    }

    pub fn advance(&mut self) {
        if self.position < self.turns.len() {
            self.position += 1;
        }
    }

    pub fn is_phase_complete(&self) -> bool {
        self.position >= self.turns.len()
    }

    /// Splice a turn in right after the current one. Returns the assigned
    /// turn number.
    pub fn insert_next(
        &mut self,
        speaker: Speaker,
        kind: PromptKind,
        budget_ms: u64,
        responds_to: Option<u32>,
    ) -> u32 {
        let no = self.next_no;
        self.next_no += 1;
        let insert_at = (self.position + 1).min(self.turns.len());
        self.turns.insert(
            insert_at,
            TurnDescriptor {
                turn_no: no,
                speaker,
                kind,
                budget_ms,
                responds_to,
            },
        );
        no
    }

    /// Mode-dependent policy after a mid-stream cutoff, called once the
    /// interjection turn has been spliced in: duelogic chairs get a
    /// resumption turn after the interjection; lively speakers do not
    /// (the plan simply advances).
    pub fn on_cutoff(&mut self, mode: Mode, cut_turn: &TurnDescriptor) {
        if mode == Mode::Duelogic {
            // After current (the cut turn) comes the interjection at
            // position+1; the resumption goes after it.
            let no = self.next_no;
            self.next_no += 1;
            let insert_at = (self.position + 2).min(self.turns.len());
            self.turns.insert(
                insert_at,
                TurnDescriptor {
                    turn_no: no,
                    speaker: cut_turn.speaker.clone(),
                    kind: PromptKind::Resumption,
                    budget_ms: cut_turn.budget_ms,
                    responds_to: Some(cut_turn.turn_no),
                },
            );
        }
    }

    /// End the phase early (informal end detection): drops the remaining
    /// planned turns after the current position.
    pub fn finish_phase(&mut self) {
        self.turns.truncate(self.position);
    }
}

impl Default for TurnCursor {
    fn default() -> Self {
        Self::new()
    }
}
