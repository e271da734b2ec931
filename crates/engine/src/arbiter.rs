//! Arbiter quality evaluation (duelogic mode).
//!
//! After each chair utterance the arbiter scores adherence to debate
//! principles — steel-manning, self-critique, framework consistency — and
//! decides whether to interject a correction. `relaxed` accountability is
//! heuristic-only and never interjects; `moderate` and `strict` run an
//! LLM evaluation (falling back to the heuristic when it fails) with
//! increasingly eager interjection rules.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use sha2::{Digest, Sha256};

use agora_domain::chat::ChatMessage;
use agora_domain::debate::{Accountability, Speaker};
use agora_domain::error::Result;
use agora_domain::quality::{QualityEvaluation, ViolationKind};
use agora_providers::{ChatRequest, ModelRouter};

/// How much of the utterance participates in the cache key.
const CACHE_PREFIX_CHARS: usize = 256;

pub struct ArbiterEvaluator {
    accountability: Accountability,
    router: Arc<ModelRouter>,
    cache: Mutex<HashMap<String, QualityEvaluation>>,
    steel_man: Regex,
    self_critique: Regex,
    hedging: Regex,
}

impl ArbiterEvaluator {
    pub fn new(accountability: Accountability, router: Arc<ModelRouter>) -> Self {
        let compile = |pattern: &str| Regex::new(pattern).expect("static pattern compiles");
        Self {
            accountability,
            router,
            cache: Mutex::new(HashMap::new()),
            steel_man: compile(
                r"(?i)(steel.?man|strongest (form|case|version)|to be fair|my opponent is right|the best (argument|case) (for|against)|granted,|it is true that|fair point)",
            ),
            self_critique: compile(
                r"(?i)(i concede|admittedly|a weakness (in|of) my|i (may|might) be wrong|my (position|view|argument) (struggles|has limits|is weaker)|limitation of (my|this)|against my own)",
            ),
            hedging: compile(r"(?i)\b(perhaps|likely|suggests|may|can|tends to|in many cases)\b"),
        }
    }

    fn cache_key(speaker: &Speaker, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(speaker.route_key().as_bytes());
        hasher.update(b"|");
        let prefix: String = text.chars().take(CACHE_PREFIX_CHARS).collect();
        hasher.update(prefix.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Evaluate a completed chair utterance. Results are cached by
    /// `(speaker, text-prefix hash)` so identical content is scored once.
    pub async fn evaluate(
        &self,
        speaker: &Speaker,
        text: &str,
        opponents: &[String],
    ) -> Result<QualityEvaluation> {
        let key = Self::cache_key(speaker, text);
        if let Some(cached) = self.cache.lock().get(&key).cloned() {
            return Ok(cached);
        }

        let evaluation = match self.accountability {
            Accountability::Relaxed => self.heuristic_evaluate(text),
            Accountability::Moderate | Accountability::Strict => {
                match self.llm_evaluate(speaker, text, opponents).await {
                    Ok(eval) => eval,
                    Err(e) => {
                        tracing::warn!(error = %e, "LLM evaluation failed; using heuristics");
                        self.heuristic_evaluate(text)
                    }
                }
            }
        };

        self.cache.lock().insert(key, evaluation.clone());
        Ok(evaluation)
    }

    /// Regex/substring evaluation: looks for explicit steel-manning and
    /// self-critique markers and hedged (honest) phrasing.
    pub fn heuristic_evaluate(&self, text: &str) -> QualityEvaluation {
        let steel_hits = self.steel_man.find_iter(text).count();
        let critique_hits = self.self_critique.find_iter(text).count();
        let hedge_hits = self.hedging.find_iter(text).count();

        let quality = |hits: usize| -> u8 {
            if hits == 0 {
                0
            } else {
                (65 + 5 * hits.min(5)) as u8
            }
        };

        let steel_man_attempted = steel_hits > 0;
        let self_critique_attempted = critique_hits > 0;
        let steel_man_quality = quality(steel_hits);
        let self_critique_quality = quality(critique_hits);
        // The heuristic cannot judge framework fit; score it neutral.
        let framework_consistency = 70;
        let intellectual_honesty = (55 + 5 * hedge_hits.min(8)) as u8;

        let adherence_score = (0.35 * steel_man_quality as f32
            + 0.35 * self_critique_quality as f32
            + 0.15 * framework_consistency as f32
            + 0.15 * intellectual_honesty as f32) as u8;

        let violation = if !steel_man_attempted {
            Some(ViolationKind::MissingSteelMan)
        } else if !self_critique_attempted {
            Some(ViolationKind::MissingSelfCritique)
        } else {
            None
        };

        QualityEvaluation {
            adherence_score,
            steel_man_attempted,
            steel_man_quality,
            self_critique_attempted,
            self_critique_quality,
            framework_consistency,
            intellectual_honesty,
            requires_interjection: violation.is_some(),
            violation,
        }
    }

    async fn llm_evaluate(
        &self,
        speaker: &Speaker,
        text: &str,
        opponents: &[String],
    ) -> Result<QualityEvaluation> {
        let resolved = self.router.resolve("arbiter")?;

        let framework = match speaker {
            Speaker::Chair { framework, .. } => framework.display_name(),
            _ => "assigned",
        };
        let mut user = format!(
            "Framework: {framework}\nOpposing positions: {}\n\nUtterance:\n{text}",
            if opponents.is_empty() {
                "none stated".to_string()
            } else {
                opponents.join("; ")
            }
        );
        user.push_str(
            "\n\nScore this contribution. Reply with JSON only: \
             {\"adherence_score\": 0-100, \"steel_man_attempted\": bool, \
             \"steel_man_quality\": 0-100, \"self_critique_attempted\": bool, \
             \"self_critique_quality\": 0-100, \"framework_consistency\": 0-100, \
             \"intellectual_honesty\": 0-100, \"requires_interjection\": bool, \
             \"violation\": null | \"straw_manning\" | \"missing_steel_man\" | \
             \"missing_self_critique\" | \"framework_inconsistency\" | \
             \"rhetorical_evasion\"}",
        );

        let req = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You are a debate arbiter. You judge whether a speaker \
                     steel-manned the opposition, acknowledged weaknesses in \
                     their own position, and argued consistently from their \
                     framework.",
                ),
                ChatMessage::user(user),
            ],
            temperature: Some(0.0),
            max_tokens: Some(256),
            timeout_ms: Some(20_000),
            json_mode: true,
            model: Some(resolved.model.clone()),
        };

        let resp = resolved.provider.chat(&req).await?;
        let evaluation: QualityEvaluation = serde_json::from_str(resp.content.trim())?;
        Ok(evaluation)
    }

    /// Interjection policy per accountability level.
    pub fn should_interject(&self, evaluation: &QualityEvaluation) -> bool {
        match self.accountability {
            Accountability::Relaxed => false,
            Accountability::Moderate => {
                evaluation.requires_interjection && evaluation.adherence_score < 40
            }
            Accountability::Strict => {
                evaluation.requires_interjection
                    || evaluation.adherence_score < 60
                    || !evaluation.steel_man_attempted
                    || !evaluation.self_critique_attempted
            }
        }
    }

    /// The violation an interjection names.
    pub fn violation_for(&self, evaluation: &QualityEvaluation) -> ViolationKind {
        if let Some(v) = evaluation.violation {
            return v;
        }
        if !evaluation.steel_man_attempted {
            ViolationKind::MissingSteelMan
        } else if !evaluation.self_critique_attempted {
            ViolationKind::MissingSelfCritique
        } else {
            ViolationKind::RhetoricalEvasion
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_domain::config::ModelAssignments;
    use agora_domain::debate::Framework;
    use agora_providers::{ScriptStep, ScriptedProvider};

    fn chair() -> Speaker {
        Speaker::Chair {
            position: "advocate".into(),
            framework: Framework::Utilitarian,
        }
    }

    fn router() -> Arc<ModelRouter> {
        let mut router = ModelRouter::new(ModelAssignments::default());
        router.register(Arc::new(ScriptedProvider::new("mock")));
        Arc::new(router)
    }

    fn evaluator(accountability: Accountability) -> ArbiterEvaluator {
        ArbiterEvaluator::new(accountability, router())
    }

    const COMPLIANT: &str = "To be fair, the strongest form of the opposing view \
        holds real force. Still, the net benefit favours action. Admittedly, a \
        weakness of my position is its reliance on projections.";

    const DEFIANT: &str = "My view is simply correct and the opposition has \
        nothing worth engaging.";

    #[test]
    fn heuristics_detect_compliance() {
        let eval = evaluator(Accountability::Relaxed).heuristic_evaluate(COMPLIANT);
        assert!(eval.steel_man_attempted);
        assert!(eval.self_critique_attempted);
        assert!(!eval.requires_interjection);
        assert!(eval.adherence_score >= 60);
    }

    #[test]
    fn heuristics_flag_missing_steel_man() {
        let eval = evaluator(Accountability::Relaxed).heuristic_evaluate(DEFIANT);
        assert!(!eval.steel_man_attempted);
        assert!(eval.requires_interjection);
        assert_eq!(eval.violation, Some(ViolationKind::MissingSteelMan));
    }

    #[test]
    fn relaxed_never_interjects() {
        let ev = evaluator(Accountability::Relaxed);
        let bad = ev.heuristic_evaluate(DEFIANT);
        assert!(!ev.should_interject(&bad));
    }

    #[test]
    fn moderate_interjects_only_on_low_scores() {
        let ev = evaluator(Accountability::Moderate);

        let mut eval = QualityEvaluation::clean(80);
        eval.requires_interjection = true;
        assert!(!ev.should_interject(&eval)); // score too high

        eval.adherence_score = 30;
        assert!(ev.should_interject(&eval));

        eval.requires_interjection = false;
        assert!(!ev.should_interject(&eval));
    }

    #[test]
    fn strict_interjects_on_any_missing_discipline() {
        let ev = evaluator(Accountability::Strict);

        let mut eval = QualityEvaluation::clean(85);
        assert!(!ev.should_interject(&eval));

        eval.self_critique_attempted = false;
        assert!(ev.should_interject(&eval));
        assert_eq!(
            ev.violation_for(&eval),
            ViolationKind::MissingSelfCritique
        );
    }

    #[tokio::test]
    async fn llm_evaluation_parses_and_caches() {
        let mut router = ModelRouter::new(ModelAssignments::default());
        let provider = Arc::new(ScriptedProvider::new("mock"));
        provider.script_for(
            "openai/gpt-4o",
            vec![ScriptStep::Reply(
                serde_json::json!({
                    "adherence_score": 25,
                    "steel_man_attempted": false,
                    "steel_man_quality": 0,
                    "self_critique_attempted": false,
                    "self_critique_quality": 0,
                    "framework_consistency": 40,
                    "intellectual_honesty": 35,
                    "requires_interjection": true,
                    "violation": "missing_self_critique"
                })
                .to_string(),
            )],
        );
        router.register(provider.clone());
        let ev = ArbiterEvaluator::new(Accountability::Strict, Arc::new(router));

        let eval = ev.evaluate(&chair(), DEFIANT, &[]).await.unwrap();
        assert!(eval.requires_interjection);
        assert_eq!(eval.violation, Some(ViolationKind::MissingSelfCritique));
        assert!(ev.should_interject(&eval));

        // Second call hits the cache — the scripted queue is exhausted, so
        // a fresh LLM call would have returned the clean default instead.
        let again = ev.evaluate(&chair(), DEFIANT, &[]).await.unwrap();
        assert_eq!(again, eval);
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn cache_key_distinguishes_speakers_and_text() {
        let a = ArbiterEvaluator::cache_key(&chair(), "same text");
        let b = ArbiterEvaluator::cache_key(&Speaker::Pro, "same text");
        let c = ArbiterEvaluator::cache_key(&chair(), "other text");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
