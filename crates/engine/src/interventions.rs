//! Per-session intervention queue.
//!
//! FIFO with status tracking. Validation happens at enqueue; consumption
//! happens only at the orchestrator's safe points. Clarification requests
//! are retrievable separately so they can be deferred to phase boundaries.

use std::collections::VecDeque;

use parking_lot::Mutex;

use agora_domain::error::{Error, Result};
use agora_domain::intervention::{Intervention, InterventionKind, InterventionStatus};

#[derive(Default)]
pub struct InterventionQueue {
    items: Mutex<VecDeque<Intervention>>,
}

/// Reject malformed interventions before they are persisted or queued.
pub fn validate(intervention: &Intervention) -> Result<()> {
    if !intervention.kind.is_control() && intervention.content.trim().is_empty() {
        return Err(Error::InvalidIntervention(format!(
            "{} requires non-empty content",
            intervention.kind
        )));
    }
    Ok(())
}

impl InterventionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validated intervention. A repeated client key is a no-op that
    /// returns the existing id.
    pub fn enqueue(&self, intervention: Intervention) -> Result<String> {
        validate(&intervention)?;
        let mut items = self.items.lock();
        if let Some(key) = &intervention.client_key {
            if let Some(existing) = items.iter().find(|iv| iv.client_key.as_ref() == Some(key)) {
                return Ok(existing.id.clone());
            }
        }
        let id = intervention.id.clone();
        items.push_back(intervention);
        Ok(id)
    }

    /// The first queued intervention ready for processing.
    ///
    /// With `defer_clarifications`, clarification requests are skipped;
    /// they wait for a phase boundary.
    pub fn peek_ready(&self, defer_clarifications: bool) -> Option<Intervention> {
        self.items
            .lock()
            .iter()
            .find(|iv| {
                iv.status == InterventionStatus::Queued
                    && !(defer_clarifications
                        && iv.kind == InterventionKind::ClarificationRequest)
            })
            .cloned()
    }

    /// Queued clarification requests, in order.
    pub fn pending_clarifications(&self) -> Vec<Intervention> {
        self.items
            .lock()
            .iter()
            .filter(|iv| {
                iv.status == InterventionStatus::Queued
                    && iv.kind == InterventionKind::ClarificationRequest
            })
            .cloned()
            .collect()
    }

    pub fn mark_processing(&self, id: &str) -> Result<()> {
        self.advance(id, InterventionStatus::Processing, None)
    }

    /// Completion requires a non-empty response.
    pub fn mark_completed(&self, id: &str, response: impl Into<String>) -> Result<()> {
        let response = response.into();
        if response.trim().is_empty() {
            return Err(Error::InvalidIntervention(format!(
                "completing {id} requires a non-empty response"
            )));
        }
        self.advance(id, InterventionStatus::Completed, Some(response))
    }

    pub fn mark_failed(&self, id: &str, reason: impl Into<String>) -> Result<()> {
        self.advance(id, InterventionStatus::Failed, Some(reason.into()))
    }

    fn advance(
        &self,
        id: &str,
        status: InterventionStatus,
        response: Option<String>,
    ) -> Result<()> {
        let mut items = self.items.lock();
        let iv = items
            .iter_mut()
            .find(|iv| iv.id == id)
            .ok_or_else(|| Error::NotFound(format!("intervention {id}")))?;
        if !iv.status.can_advance_to(status) {
            return Err(Error::Conflict(format!(
                "intervention {id}: {:?} cannot advance to {status:?}",
                iv.status
            )));
        }
        iv.status = status;
        if response.is_some() {
            iv.response = response;
        }
        Ok(())
    }

    /// Interventions not yet in a terminal status.
    pub fn pending_count(&self) -> usize {
        self.items
            .lock()
            .iter()
            .filter(|iv| !iv.status.is_terminal())
            .count()
    }

    /// Snapshot of everything still in the queue (tests, diagnostics).
    pub fn snapshot(&self) -> Vec<Intervention> {
        self.items.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn intervention(id: &str, kind: InterventionKind, content: &str) -> Intervention {
        Intervention {
            id: id.into(),
            kind,
            content: content.into(),
            directed_to: None,
            status: InterventionStatus::Queued,
            response: None,
            client_key: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fifo_order() {
        let q = InterventionQueue::new();
        q.enqueue(intervention("a", InterventionKind::Question, "first?"))
            .unwrap();
        q.enqueue(intervention("b", InterventionKind::Question, "second?"))
            .unwrap();
        assert_eq!(q.peek_ready(false).unwrap().id, "a");
    }

    #[test]
    fn empty_content_rejected() {
        let q = InterventionQueue::new();
        let err = q
            .enqueue(intervention("a", InterventionKind::Challenge, "  "))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIntervention(_)));

        // Control kinds carry no content.
        q.enqueue(intervention("b", InterventionKind::PauseRequest, ""))
            .unwrap();
    }

    #[test]
    fn clarifications_deferred() {
        let q = InterventionQueue::new();
        q.enqueue(intervention(
            "c",
            InterventionKind::ClarificationRequest,
            "what does X mean?",
        ))
        .unwrap();
        q.enqueue(intervention("q", InterventionKind::Question, "why?"))
            .unwrap();

        // Deferred: the clarification is skipped over.
        assert_eq!(q.peek_ready(true).unwrap().id, "q");
        // At a phase boundary it becomes reachable.
        assert_eq!(q.peek_ready(false).unwrap().id, "c");
        assert_eq!(q.pending_clarifications().len(), 1);
    }

    #[test]
    fn lifecycle_and_pending_count() {
        let q = InterventionQueue::new();
        q.enqueue(intervention("a", InterventionKind::Question, "q?"))
            .unwrap();
        assert_eq!(q.pending_count(), 1);

        q.mark_processing("a").unwrap();
        assert_eq!(q.pending_count(), 1);
        // Nothing else is ready while it processes.
        assert!(q.peek_ready(false).is_none());

        q.mark_completed("a", "answered").unwrap();
        assert_eq!(q.pending_count(), 0);
    }

    #[test]
    fn completion_requires_response() {
        let q = InterventionQueue::new();
        q.enqueue(intervention("a", InterventionKind::Question, "q?"))
            .unwrap();
        q.mark_processing("a").unwrap();
        assert!(q.mark_completed("a", "  ").is_err());
        q.mark_completed("a", "real answer").unwrap();
    }

    #[test]
    fn client_key_dedupes() {
        let q = InterventionQueue::new();
        let mut a = intervention("a", InterventionKind::Question, "q?");
        a.client_key = Some("k1".into());
        let mut b = intervention("b", InterventionKind::Question, "q again?");
        b.client_key = Some("k1".into());

        assert_eq!(q.enqueue(a).unwrap(), "a");
        assert_eq!(q.enqueue(b).unwrap(), "a");
        assert_eq!(q.pending_count(), 1);
    }

    #[test]
    fn status_regression_rejected() {
        let q = InterventionQueue::new();
        q.enqueue(intervention("a", InterventionKind::Question, "q?"))
            .unwrap();
        q.mark_processing("a").unwrap();
        q.mark_failed("a", "model unavailable").unwrap();
        assert!(matches!(q.mark_processing("a"), Err(Error::Conflict(_))));
    }
}
