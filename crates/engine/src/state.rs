//! The per-session phase state machine.
//!
//! Exactly one machine per debate, owned by the orchestrator and never
//! touched concurrently. Transitions validate against the legal successor
//! graph; invalid ones return `InvalidTransition` without mutating state.
//! Entering `Paused` snapshots the prior phase; leaving is only valid back
//! to that phase (or to `Error`). Elapsed time excludes paused intervals.

use std::sync::Arc;

use agora_domain::clock::Clock;
use agora_domain::debate::{Mode, Phase, Speaker};
use agora_domain::error::{Error, Result};

/// A performed transition, ready to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub speaker: Option<Speaker>,
    /// Active (non-paused) session time at the moment of transition.
    pub elapsed_ms: u64,
}

pub struct StateMachine {
    session_id: String,
    clock: Arc<dyn Clock>,
    phase: Phase,
    /// Set while paused; the only legal non-error resume target.
    previous_phase: Option<Phase>,
    started_ms: u64,
    paused_total_ms: u64,
    paused_entered_ms: Option<u64>,
}

impl StateMachine {
    pub fn new(session_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let started_ms = clock.monotonic_ms();
        Self {
            session_id: session_id.into(),
            clock,
            phase: Phase::Initializing,
            previous_phase: None,
            started_ms,
            paused_total_ms: 0,
            paused_entered_ms: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn previous_phase(&self) -> Option<Phase> {
        self.previous_phase
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::Paused
    }

    /// Active session time: wall time since start minus paused intervals.
    pub fn elapsed_active_ms(&self) -> u64 {
        let total = self.clock.elapsed_ms_since(self.started_ms);
        let paused_now = self
            .paused_entered_ms
            .map(|t| self.clock.elapsed_ms_since(t))
            .unwrap_or(0);
        total
            .saturating_sub(self.paused_total_ms)
            .saturating_sub(paused_now)
    }

    /// Whether `to` is a legal successor of the current phase.
    fn is_legal(&self, to: Phase) -> bool {
        use Phase::*;
        match self.phase {
            Initializing => matches!(to, Opening | Informal | Error),
            Opening => matches!(to, Constructive | Paused | Error),
            Constructive => matches!(to, CrossExam | Paused | Error),
            CrossExam => matches!(to, Rebuttal | Paused | Error),
            Rebuttal => matches!(to, Closing | Paused | Error),
            Closing => matches!(to, Synthesis | Paused | Error),
            Synthesis => matches!(to, Completed | Error),
            Informal => matches!(to, Wrapup | Paused | Error),
            Wrapup => matches!(to, Completed | Error),
            Paused => to == Error || Some(to) == self.previous_phase,
            Completed | Error => false,
        }
    }

    /// Perform a transition, returning the record to publish.
    pub fn transition(&mut self, to: Phase, speaker: Option<Speaker>) -> Result<Transition> {
        if !self.is_legal(to) {
            return Err(Error::InvalidTransition {
                from: self.phase,
                to,
            });
        }

        let from = self.phase;

        if to == Phase::Paused {
            self.previous_phase = Some(from);
            self.paused_entered_ms = Some(self.clock.monotonic_ms());
        } else if from == Phase::Paused {
            if let Some(entered) = self.paused_entered_ms.take() {
                self.paused_total_ms += self.clock.elapsed_ms_since(entered);
            }
            self.previous_phase = None;
        }

        self.phase = to;

        let transition = Transition {
            from,
            to,
            speaker,
            elapsed_ms: self.elapsed_active_ms(),
        };
        tracing::debug!(
            session_id = %self.session_id,
            from = %from,
            to = %to,
            elapsed_ms = transition.elapsed_ms,
            "phase transition"
        );
        Ok(transition)
    }

    /// Pause, snapshotting the current phase.
    pub fn pause(&mut self) -> Result<Transition> {
        self.transition(Phase::Paused, None)
    }

    /// Resume into the snapshotted phase.
    pub fn resume(&mut self, speaker: Option<Speaker>) -> Result<Transition> {
        let target = self
            .previous_phase
            .ok_or_else(|| Error::NotPaused(self.session_id.clone()))?;
        self.transition(target, speaker)
    }
}

/// The phase that follows `phase` when its turn list is exhausted.
///
/// Structured modes (turn-based, lively, duelogic) walk the six-phase
/// protocol; phases a mode has no turns for are passed through with an
/// empty plan. Informal debates go `informal → wrapup → completed`.
pub fn protocol_successor(phase: Phase, mode: Mode) -> Option<Phase> {
    use Phase::*;
    match (mode, phase) {
        (Mode::Informal, Informal) => Some(Wrapup),
        (Mode::Informal, Wrapup) => Some(Completed),
        (_, Opening) => Some(Constructive),
        (_, Constructive) => Some(CrossExam),
        (_, CrossExam) => Some(Rebuttal),
        (_, Rebuttal) => Some(Closing),
        (_, Closing) => Some(Synthesis),
        (_, Synthesis) => Some(Completed),
        _ => None,
    }
}

/// First working phase for a mode, entered from `Initializing`.
pub fn initial_phase(mode: Mode) -> Phase {
    match mode {
        Mode::Informal => Phase::Informal,
        _ => Phase::Opening,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_domain::clock::ManualClock;

    fn machine() -> (Arc<ManualClock>, StateMachine) {
        let clock = Arc::new(ManualClock::new());
        let machine = StateMachine::new("s1", clock.clone());
        (clock, machine)
    }

    #[test]
    fn happy_path_walks_the_protocol() {
        let (_clock, mut m) = machine();
        for to in [
            Phase::Opening,
            Phase::Constructive,
            Phase::CrossExam,
            Phase::Rebuttal,
            Phase::Closing,
            Phase::Synthesis,
            Phase::Completed,
        ] {
            let t = m.transition(to, None).unwrap();
            assert_eq!(t.to, to);
        }
        assert_eq!(m.phase(), Phase::Completed);
    }

    #[test]
    fn invalid_transition_does_not_mutate() {
        let (_clock, mut m) = machine();
        m.transition(Phase::Opening, None).unwrap();

        let err = m.transition(Phase::Rebuttal, None).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Phase::Opening,
                to: Phase::Rebuttal
            }
        ));
        assert_eq!(m.phase(), Phase::Opening);
    }

    #[test]
    fn terminal_phases_accept_nothing() {
        let (_clock, mut m) = machine();
        m.transition(Phase::Error, None).unwrap();
        assert!(m.transition(Phase::Opening, None).is_err());
        assert!(m.transition(Phase::Error, None).is_err());
    }

    #[test]
    fn pause_snapshots_and_resume_restores() {
        let (_clock, mut m) = machine();
        m.transition(Phase::Opening, None).unwrap();
        m.transition(Phase::Constructive, None).unwrap();

        m.pause().unwrap();
        assert_eq!(m.phase(), Phase::Paused);
        assert_eq!(m.previous_phase(), Some(Phase::Constructive));

        // Leaving paused is only legal back to the snapshot or to error.
        assert!(m.transition(Phase::Opening, None).is_err());

        let t = m.resume(Some(Speaker::Pro)).unwrap();
        assert_eq!(t.to, Phase::Constructive);
        assert_eq!(m.phase(), Phase::Constructive);
        assert_eq!(m.previous_phase(), None);
    }

    #[test]
    fn resume_without_pause_errors() {
        let (_clock, mut m) = machine();
        m.transition(Phase::Opening, None).unwrap();
        assert!(matches!(m.resume(None), Err(Error::NotPaused(_))));
    }

    #[test]
    fn elapsed_excludes_paused_intervals() {
        let (clock, mut m) = machine();
        m.transition(Phase::Opening, None).unwrap();

        clock.advance_ms(10_000);
        assert_eq!(m.elapsed_active_ms(), 10_000);

        m.pause().unwrap();
        clock.advance_ms(30_000);
        // Time does not accrue while paused.
        assert_eq!(m.elapsed_active_ms(), 10_000);

        m.resume(None).unwrap();
        clock.advance_ms(5_000);
        assert_eq!(m.elapsed_active_ms(), 15_000);
    }

    #[test]
    fn paused_to_error_is_legal() {
        let (_clock, mut m) = machine();
        m.transition(Phase::Opening, None).unwrap();
        m.pause().unwrap();
        assert!(m.transition(Phase::Error, None).is_ok());
    }

    #[test]
    fn informal_path() {
        let (_clock, mut m) = machine();
        m.transition(Phase::Informal, None).unwrap();
        m.transition(Phase::Wrapup, None).unwrap();
        m.transition(Phase::Completed, None).unwrap();
        assert_eq!(m.phase(), Phase::Completed);
    }

    #[test]
    fn successor_chain_terminates() {
        let mut phase = initial_phase(Mode::TurnBased);
        let mut hops = 0;
        while let Some(next) = protocol_successor(phase, Mode::TurnBased) {
            phase = next;
            hops += 1;
            assert!(hops < 20);
        }
        assert_eq!(phase, Phase::Completed);
    }
}
