//! The interruption engine.
//!
//! Watches the current speaker's token stream and, at sentence boundaries,
//! decides whether another speaker should cut in. Decisions are gated by a
//! sliding-window budget (rate cap, cooldown, minimum speaking time) and a
//! trigger score from either a heuristic or a cheap LLM call. Firing is a
//! *soft cutoff*: the sentence in flight completes, then the stream is
//! cancelled.

use std::sync::Arc;

use regex::Regex;

use agora_domain::chat::ChatMessage;
use agora_domain::clock::Clock;
use agora_domain::config::LivelySettings;
use agora_domain::debate::{Speaker, TriggerKind};
use agora_domain::error::Result;
use agora_providers::{ChatRequest, ModelRouter};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Budget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sliding-window accountant for fired interruptions.
///
/// At most `max_interrupts_per_minute` per rolling 60 s, at least
/// `interrupt_cooldown_ms` between consecutive firings, and never before
/// the current speaker has held the floor for `min_speaking_time_ms`.
pub struct InterruptBudget {
    settings: LivelySettings,
    fired_at_ms: Vec<u64>,
    speaker_started_ms: u64,
}

const WINDOW_MS: u64 = 60_000;

impl InterruptBudget {
    pub fn new(settings: LivelySettings) -> Self {
        Self {
            settings,
            fired_at_ms: Vec::new(),
            speaker_started_ms: 0,
        }
    }

    /// Reset the fairness floor for a new speaker.
    pub fn speaker_started(&mut self, now_ms: u64) {
        self.speaker_started_ms = now_ms;
    }

    fn prune(&mut self, now_ms: u64) {
        self.fired_at_ms
            .retain(|&t| now_ms.saturating_sub(t) < WINDOW_MS);
    }

    pub fn can_fire(&mut self, now_ms: u64) -> bool {
        if self.settings.max_interrupts_per_minute == 0 {
            return false;
        }
        if now_ms.saturating_sub(self.speaker_started_ms) < self.settings.min_speaking_time_ms {
            return false;
        }
        self.prune(now_ms);
        if self.fired_at_ms.len() as u32 >= self.settings.max_interrupts_per_minute {
            return false;
        }
        if let Some(&last) = self.fired_at_ms.last() {
            if now_ms.saturating_sub(last) < self.settings.interrupt_cooldown_ms {
                return false;
            }
        }
        true
    }

    pub fn mark_fired(&mut self, now_ms: u64) {
        self.fired_at_ms.push(now_ms);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sentence boundaries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks how much of the accumulating text has been scanned and yields
/// the newly completed span each time a boundary appears.
pub struct SentenceWatcher {
    boundary: Regex,
    scanned: usize,
}

impl SentenceWatcher {
    pub fn new() -> Self {
        // A sentence ends at `.`/`!`/`?` (possibly inside quotes/brackets)
        // followed by whitespace, or at a paragraph break.
        let boundary =
            Regex::new(r#"[.!?]["')\]]*\s|\n\n"#).expect("static pattern compiles");
        Self {
            boundary,
            scanned: 0,
        }
    }

    pub fn reset(&mut self) {
        self.scanned = 0;
    }

    /// If the unscanned tail contains a boundary, return the completed
    /// span (from the last scan position through the final boundary).
    pub fn completed_span<'t>(&mut self, text: &'t str) -> Option<&'t str> {
        let tail = text.get(self.scanned..)?;
        let mut end = None;
        for m in self.boundary.find_iter(tail) {
            end = Some(m.end());
        }
        let end = end?;
        let start = self.scanned;
        self.scanned += end;
        Some(&text[start..start + end])
    }
}

impl Default for SentenceWatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trigger scoring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait TriggerScorer: Send + Sync {
    /// Score a newly completed span for interruption-worthiness.
    async fn score(&self, speaker: &Speaker, span: &str) -> Result<Option<(TriggerKind, f32)>>;
}

/// Keyword-based scorer. Cheap and deterministic; the default.
pub struct HeuristicScorer {
    aggression_level: u8,
    bold: Regex,
    weak: Regex,
    contradiction: Regex,
    key_phrases: Vec<String>,
}

impl HeuristicScorer {
    pub fn new(settings: &LivelySettings) -> Self {
        let compile = |pattern: &str| Regex::new(pattern).expect("static pattern compiles");
        Self {
            aggression_level: settings.aggression_level,
            bold: compile(
                r"(?i)\b(undeniabl\w*|certainl\w*|obviousl\w*|unquestionabl\w*|always|never|everyone|no one|guarantee\w*|beyond dispute|without (a )?doubt)\b",
            ),
            weak: compile(
                r"(?i)\b(perhaps|maybe|possibly|might|arguably|unclear|not sure|somewhat|i suppose)\b",
            ),
            contradiction: compile(r"(?i)\b(contradict\w*|inconsisten\w*|at odds with)\b"),
            key_phrases: settings.key_phrases.clone(),
        }
    }

    fn base_score(&self, span: &str) -> Option<(TriggerKind, f32)> {
        let lower = span.to_lowercase();

        let hit = |re: &Regex| re.find_iter(span).count();

        let mut best: Option<(TriggerKind, f32)> = None;
        let mut consider = |kind: TriggerKind, matches: usize, base: f32| {
            if matches == 0 {
                return;
            }
            let score = base + 0.05 * (matches.saturating_sub(1) as f32);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((kind, score));
            }
        };

        consider(TriggerKind::Contradiction, hit(&self.contradiction), 0.8);
        consider(TriggerKind::BoldClaim, hit(&self.bold), 0.75);
        let key_hits = self
            .key_phrases
            .iter()
            .filter(|p| lower.contains(&p.to_lowercase()))
            .count();
        consider(TriggerKind::KeyPhrase, key_hits, 0.7);
        consider(TriggerKind::WeakPoint, hit(&self.weak), 0.65);

        best
    }
}

#[async_trait::async_trait]
impl TriggerScorer for HeuristicScorer {
    async fn score(&self, _speaker: &Speaker, span: &str) -> Result<Option<(TriggerKind, f32)>> {
        Ok(self.base_score(span).map(|(kind, score)| {
            // Aggression scales willingness: 1 → ×0.8, 3 → ×1.0, 5 → ×1.2.
            let factor = 0.7 + 0.1 * self.aggression_level as f32;
            (kind, (score * factor).min(1.0))
        }))
    }
}

/// Scores spans with a cheap structured LLM call on the `trigger` route.
pub struct LlmTriggerScorer {
    router: Arc<ModelRouter>,
}

impl LlmTriggerScorer {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }
}

#[derive(serde::Deserialize)]
struct TriggerVerdict {
    should_interrupt: bool,
    #[serde(default)]
    trigger: Option<TriggerKind>,
    #[serde(default)]
    score: f32,
}

#[async_trait::async_trait]
impl TriggerScorer for LlmTriggerScorer {
    async fn score(&self, speaker: &Speaker, span: &str) -> Result<Option<(TriggerKind, f32)>> {
        let resolved = self.router.resolve("trigger")?;
        let req = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You watch a live debate and decide whether an opponent \
                     should interject right now. Reply with JSON: \
                     {\"should_interrupt\": bool, \"trigger\": \
                     \"contradiction\"|\"key_phrase\"|\"weak_point\"|\"bold_claim\", \
                     \"score\": 0.0-1.0}.",
                ),
                ChatMessage::user(format!("{speaker} just said: {span}")),
            ],
            temperature: Some(0.0),
            max_tokens: Some(128),
            timeout_ms: Some(10_000),
            json_mode: true,
            model: Some(resolved.model.clone()),
        };
        let resp = resolved.provider.chat(&req).await?;
        let verdict: TriggerVerdict = serde_json::from_str(resp.content.trim())?;
        if !verdict.should_interrupt {
            return Ok(None);
        }
        Ok(verdict
            .trigger
            .map(|t| (t, verdict.score.clamp(0.0, 1.0))))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An accepted interruption, ready to be acted on by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptDecision {
    pub interrupter: Speaker,
    pub trigger: TriggerKind,
    pub score: f32,
}

pub struct InterruptionEngine {
    settings: LivelySettings,
    budget: InterruptBudget,
    watcher: SentenceWatcher,
    scorer: Arc<dyn TriggerScorer>,
    clock: Arc<dyn Clock>,
    /// Speakers allowed to interject; the first one that is not the
    /// current speaker gets the floor.
    candidates: Vec<Speaker>,
}

impl InterruptionEngine {
    pub fn new(
        settings: LivelySettings,
        scorer: Arc<dyn TriggerScorer>,
        clock: Arc<dyn Clock>,
        candidates: Vec<Speaker>,
    ) -> Self {
        Self {
            budget: InterruptBudget::new(settings.clone()),
            watcher: SentenceWatcher::new(),
            settings,
            scorer,
            clock,
            candidates,
        }
    }

    /// Call when a new speaker takes the floor.
    pub fn begin_turn(&mut self) {
        self.budget.speaker_started(self.clock.monotonic_ms());
        self.watcher.reset();
    }

    /// Inspect the accumulated text after a token arrives. Returns a
    /// decision when an interruption should fire at this boundary.
    pub async fn observe(
        &mut self,
        speaker: &Speaker,
        accumulated: &str,
    ) -> Option<InterruptDecision> {
        let span = self.watcher.completed_span(accumulated)?.to_string();

        let now_ms = self.clock.monotonic_ms();
        if !self.budget.can_fire(now_ms) {
            return None;
        }

        let scored = match self.scorer.score(speaker, &span).await {
            Ok(s) => s,
            Err(e) => {
                // Interruptions are opportunistic; a scorer failure is not
                // a turn failure.
                tracing::warn!(error = %e, "trigger scoring failed");
                return None;
            }
        };
        let (trigger, score) = scored?;
        if score < self.settings.relevance_threshold {
            return None;
        }

        let interrupter = self
            .candidates
            .iter()
            .find(|c| *c != speaker)
            .cloned()?;

        self.budget.mark_fired(now_ms);
        Some(InterruptDecision {
            interrupter,
            trigger,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_domain::clock::ManualClock;
    use agora_domain::debate::PacingMode;

    fn settings() -> LivelySettings {
        LivelySettings {
            max_interrupts_per_minute: 1,
            interrupt_cooldown_ms: 30_000,
            min_speaking_time_ms: 0,
            relevance_threshold: 0.6,
            ..LivelySettings::preset(PacingMode::Medium)
        }
    }

    #[test]
    fn budget_enforces_rolling_window() {
        let mut budget = InterruptBudget::new(LivelySettings {
            max_interrupts_per_minute: 2,
            interrupt_cooldown_ms: 0,
            min_speaking_time_ms: 0,
            ..settings()
        });
        budget.speaker_started(0);

        assert!(budget.can_fire(1_000));
        budget.mark_fired(1_000);
        assert!(budget.can_fire(2_000));
        budget.mark_fired(2_000);
        // Window full.
        assert!(!budget.can_fire(30_000));
        // First firing ages out of the 60 s window.
        assert!(budget.can_fire(61_500));
    }

    #[test]
    fn budget_enforces_cooldown() {
        let mut budget = InterruptBudget::new(LivelySettings {
            max_interrupts_per_minute: 5,
            interrupt_cooldown_ms: 10_000,
            min_speaking_time_ms: 0,
            ..settings()
        });
        budget.speaker_started(0);
        budget.mark_fired(5_000);
        assert!(!budget.can_fire(14_999));
        assert!(budget.can_fire(15_000));
    }

    #[test]
    fn budget_enforces_min_speaking_time() {
        let mut budget = InterruptBudget::new(LivelySettings {
            max_interrupts_per_minute: 5,
            interrupt_cooldown_ms: 0,
            min_speaking_time_ms: 8_000,
            ..settings()
        });
        budget.speaker_started(100_000);
        assert!(!budget.can_fire(107_999));
        assert!(budget.can_fire(108_000));
    }

    #[test]
    fn zero_rate_never_fires() {
        let mut budget = InterruptBudget::new(LivelySettings {
            max_interrupts_per_minute: 0,
            min_speaking_time_ms: 0,
            ..settings()
        });
        budget.speaker_started(0);
        assert!(!budget.can_fire(10_000));
    }

    #[test]
    fn watcher_yields_each_new_span_once() {
        let mut w = SentenceWatcher::new();
        assert!(w.completed_span("An unfinished claus").is_none());

        let text = "An unfinished clause grew. And then";
        assert_eq!(w.completed_span(text), Some("An unfinished clause grew. "));
        // No new boundary yet.
        assert!(w.completed_span(text).is_none());

        let text = "An unfinished clause grew. And then it ended! More";
        assert_eq!(w.completed_span(text), Some("And then it ended! "));
    }

    #[test]
    fn watcher_sees_paragraph_breaks() {
        let mut w = SentenceWatcher::new();
        let text = "a line without punctuation\n\nnext";
        assert_eq!(w.completed_span(text), Some("a line without punctuation\n\n"));
    }

    #[tokio::test]
    async fn heuristic_flags_bold_claims() {
        let scorer = HeuristicScorer::new(&settings());
        let hit = scorer
            .score(&Speaker::Pro, "This is undeniably always correct. ")
            .await
            .unwrap();
        let (kind, score) = hit.unwrap();
        assert_eq!(kind, TriggerKind::BoldClaim);
        assert!(score >= 0.6);

        let miss = scorer
            .score(&Speaker::Pro, "A measured, qualified statement. ")
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn heuristic_prefers_contradiction_over_weak_point() {
        let scorer = HeuristicScorer::new(&settings());
        let (kind, _) = scorer
            .score(
                &Speaker::Pro,
                "That is inconsistent with what I said, perhaps. ",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, TriggerKind::Contradiction);
    }

    #[tokio::test]
    async fn key_phrases_trigger() {
        let mut s = settings();
        s.key_phrases = vec!["data centre".into()];
        let scorer = HeuristicScorer::new(&s);
        let (kind, _) = scorer
            .score(&Speaker::Con, "Consider the data centre build-out. ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, TriggerKind::KeyPhrase);
    }

    #[tokio::test]
    async fn engine_respects_budget_across_triggers() {
        let clock = Arc::new(ManualClock::new());
        let s = settings();
        let mut engine = InterruptionEngine::new(
            s.clone(),
            Arc::new(HeuristicScorer::new(&s)),
            clock.clone(),
            vec![Speaker::Pro, Speaker::Con],
        );
        engine.begin_turn();

        // Four independent bold-claim boundaries within the window.
        let mut text = String::new();
        let mut fired = 0;
        for i in 0..4 {
            text.push_str(&format!("Claim {i} is undeniably true. "));
            clock.advance_ms(12_000);
            if engine.observe(&Speaker::Pro, &text).await.is_some() {
                fired += 1;
            }
        }
        // max_interrupts_per_minute = 1 and cooldown 30 s: only one fires
        // in the 48 s of speaking.
        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn engine_picks_an_opponent() {
        let clock = Arc::new(ManualClock::new());
        let s = settings();
        let mut engine = InterruptionEngine::new(
            s.clone(),
            Arc::new(HeuristicScorer::new(&s)),
            clock.clone(),
            vec![Speaker::Pro, Speaker::Con],
        );
        engine.begin_turn();
        clock.advance_ms(10_000);

        let decision = engine
            .observe(&Speaker::Pro, "Everyone knows this is guaranteed. ")
            .await
            .unwrap();
        assert_eq!(decision.interrupter, Speaker::Con);
        assert_eq!(decision.trigger, TriggerKind::BoldClaim);
    }
}
