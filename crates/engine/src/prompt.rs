//! Prompt assembly.
//!
//! Pure and deterministic: the same inputs always build the same message
//! sequence. Layout rules are strict: persona identity is always the
//! first system message, retrieved citations (when any) come before the
//! task instruction, and history is truncated to a capped tail window.

use agora_domain::chat::ChatMessage;
use agora_domain::config::DebateConfig;
use agora_domain::debate::{PromptKind, Speaker, TurnDescriptor};
use agora_domain::intervention::{Intervention, InterventionKind};
use agora_domain::quality::ViolationKind;
use agora_domain::utterance::Utterance;

/// Everything needed to build one turn's prompt.
pub struct PromptContext<'a> {
    pub config: &'a DebateConfig,
    pub turn: &'a TurnDescriptor,
    pub history: &'a [Utterance],
    pub citations: &'a [String],
    /// Partial text of a cut-off speaker (interjections and resumptions).
    pub partial: Option<&'a str>,
    /// Violation being corrected (arbiter interjections).
    pub violation: Option<ViolationKind>,
}

/// Build the system+user message sequence for a turn.
pub fn build_prompt(ctx: &PromptContext<'_>) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    // 1. Persona identity, always first.
    messages.push(ChatMessage::system(identity_prompt(
        ctx.config,
        &ctx.turn.speaker,
    )));

    // 2. Debate framing and style rules.
    messages.push(ChatMessage::system(framing_prompt(ctx.config)));

    // 3. Retrieved citations, before the task instruction.
    if !ctx.citations.is_empty() {
        let mut text = String::from("Relevant source material:\n");
        for (i, citation) in ctx.citations.iter().enumerate() {
            text.push_str(&format!("[{}] {citation}\n", i + 1));
        }
        messages.push(ChatMessage::system(text.trim_end().to_string()));
    }

    // 4. History tail, capped to the configured window.
    push_history(&mut messages, ctx.config, &ctx.turn.speaker, ctx.history);

    // 5. The task instruction for this turn.
    messages.push(ChatMessage::user(task_prompt(ctx)));

    messages
}

/// Build the message sequence for answering a user intervention.
pub fn build_intervention_prompt(
    config: &DebateConfig,
    responder: &Speaker,
    history: &[Utterance],
    intervention: &Intervention,
) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(identity_prompt(config, responder)),
        ChatMessage::system(framing_prompt(config)),
    ];
    push_history(&mut messages, config, responder, history);

    let label = match intervention.kind {
        InterventionKind::Question => "question",
        InterventionKind::Challenge => "challenge",
        InterventionKind::EvidenceInjection => "piece of evidence",
        InterventionKind::ClarificationRequest => "request for clarification",
        _ => "message",
    };
    messages.push(ChatMessage::user(format!(
        "An audience member has a {label} for you:\n\"{}\"\nAddress it \
         directly and briefly; the debate continues afterwards.",
        intervention.content
    )));
    messages
}

/// The speaker's own utterances become assistant turns; everyone else's
/// arrive as attributed user turns.
fn push_history(
    messages: &mut Vec<ChatMessage>,
    config: &DebateConfig,
    speaker: &Speaker,
    history: &[Utterance],
) {
    let tail_start = history.len().saturating_sub(config.history_window);
    for utterance in &history[tail_start..] {
        if matches!(utterance.speaker, Speaker::System) {
            continue;
        }
        if &utterance.speaker == speaker {
            messages.push(ChatMessage::assistant(utterance.content.clone()));
        } else {
            messages.push(ChatMessage::user(format!(
                "[{} | {}] {}",
                utterance.phase, utterance.speaker, utterance.content
            )));
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn identity_prompt(config: &DebateConfig, speaker: &Speaker) -> String {
    let route = speaker.route_key();
    if let Some(persona) = config.personas.for_route(&route) {
        let mut text = format!("You are {}. {}", persona.display_name, persona.identity);
        if !persona.core_values.is_empty() {
            text.push_str("\nCore values you never abandon: ");
            text.push_str(&persona.core_values.join(", "));
            text.push('.');
        }
        return text;
    }

    match speaker {
        Speaker::Pro => {
            "You are the PRO advocate. You argue in favour of the proposition, \
             building the strongest affirmative case."
                .into()
        }
        Speaker::Con => {
            "You are the CON advocate. You argue against the proposition, \
             building the strongest negative case."
                .into()
        }
        Speaker::Moderator => {
            "You are the neutral moderator. You do not take sides; you keep \
             the debate fair, summarize faithfully, and answer audience \
             questions evenhandedly."
                .into()
        }
        Speaker::Arbiter => {
            "You are the arbiter. You referee the exchange for intellectual \
             honesty: every speaker must steel-man the opposing view and \
             acknowledge weaknesses in their own."
                .into()
        }
        Speaker::Chair {
            position,
            framework,
        } => format!(
            "You hold the {position} chair, arguing strictly from the \
             {} framework. Before critiquing an opposing view, restate it in \
             its strongest form; in every contribution, acknowledge at least \
             one weakness of your own position.",
            framework.display_name()
        ),
        Speaker::Participant { index } => format!(
            "You are participant {index} in an informal roundtable. Speak \
             naturally, build on others' points, and disagree where you \
             genuinely would."
        ),
        Speaker::User | Speaker::System => String::new(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Framing and task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn framing_prompt(config: &DebateConfig) -> String {
    let mut text = format!("Proposition under debate: {}", config.proposition);
    if let Some(context) = &config.context {
        text.push_str(&format!("\nContext: {context}"));
    }
    text.push_str(&format!("\nTone: {}.", config.duelogic.tone.as_str()));
    text.push_str(brevity_rule(config.brevity));
    if config.require_citations {
        text.push_str("\nSupport factual claims with inline citations like [1].");
    }
    text
}

fn brevity_rule(brevity: u8) -> &'static str {
    match brevity {
        1 => "\nBe extremely brief: one or two sentences.",
        2 => "\nBe brief: a short paragraph at most.",
        3 => "\nKeep it focused: one or two paragraphs.",
        4 => "\nDevelop your points fully, up to several paragraphs.",
        _ => "\nBe as thorough as the argument requires.",
    }
}

fn task_prompt(ctx: &PromptContext<'_>) -> String {
    match ctx.turn.kind {
        PromptKind::Opening => {
            "Deliver your opening statement on the proposition.".into()
        }
        PromptKind::Constructive => {
            "Advance your next constructive argument. Introduce new ground \
             rather than repeating earlier points."
                .into()
        }
        PromptKind::CrossExamQ => {
            "Pose one pointed cross-examination question to your opponent. \
             Ask only the question."
                .into()
        }
        PromptKind::CrossExamA => {
            "Answer the question your opponent just posed. Answer it \
             directly before adding anything else."
                .into()
        }
        PromptKind::Rebuttal => {
            "Rebut your opponent's strongest arguments so far.".into()
        }
        PromptKind::Closing => "Deliver your closing statement.".into(),
        PromptKind::Synthesis => {
            "The debate is over. As the neutral moderator, synthesize the \
             strongest points made on each side without declaring a winner."
                .into()
        }
        PromptKind::Interjection => {
            let mut text = String::from("You are interjecting mid-debate.");
            if let Some(partial) = ctx.partial {
                text.push_str(&format!(
                    " The current speaker was cut off after saying:\n\"{partial}\"\n"
                ));
            }
            if let Some(violation) = ctx.violation {
                text.push_str(&format!(
                    " Name the problem — the speaker is {} — and direct them to \
                     correct it.",
                    violation.describe()
                ));
            } else {
                text.push_str(
                    " Make one sharp, relevant point in response. Keep it to a \
                     few sentences.",
                );
            }
            text
        }
        PromptKind::Exchange => {
            "Respond to the previous chair's contribution from your \
             framework. Steel-man their position first, then present your \
             counter-argument, and close by acknowledging one weakness of \
             your own position."
                .into()
        }
        PromptKind::Resumption => {
            let mut text = String::from("You were interrupted mid-statement.");
            if let Some(partial) = ctx.partial {
                text.push_str(&format!(" You had said:\n\"{partial}\"\n"));
            }
            text.push_str("Address the interjection briefly, then complete your point.");
            text
        }
        PromptKind::Remark => {
            "Contribute the next remark in this informal discussion. If you \
             believe the conversation has run its course, say so briefly."
                .into()
        }
        PromptKind::Wrapup => {
            "Wrap up the discussion: summarize where the participants agreed \
             and where they did not."
                .into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_domain::chat::ChatRole;
    use agora_domain::config::Persona;
    use agora_domain::debate::{Framework, Phase};

    fn turn_for(speaker: Speaker, kind: PromptKind) -> TurnDescriptor {
        TurnDescriptor {
            turn_no: 0,
            speaker,
            kind,
            budget_ms: 60_000,
            responds_to: None,
        }
    }

    fn utterance(speaker: Speaker, content: &str, index: u64) -> Utterance {
        Utterance {
            session_id: "s1".into(),
            index,
            ts_ms: index * 100,
            phase: Phase::Constructive,
            speaker,
            content: content.into(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn persona_identity_is_first_system_message() {
        let mut config = DebateConfig::new("p");
        config.personas.assign(
            "pro",
            Persona {
                id: "stoic".into(),
                display_name: "Marcus".into(),
                core_values: vec!["clarity".into(), "candour".into()],
                identity: "A stoic advocate.".into(),
            },
        );
        let turn = turn_for(Speaker::Pro, PromptKind::Opening);
        let messages = build_prompt(&PromptContext {
            config: &config,
            turn: &turn,
            history: &[],
            citations: &[],
            partial: None,
            violation: None,
        });

        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("Marcus"));
        assert!(messages[0].content.contains("clarity"));
    }

    #[test]
    fn citations_come_before_the_task() {
        let config = DebateConfig::new("p");
        let turn = turn_for(Speaker::Con, PromptKind::Constructive);
        let citations = vec!["Report A, 2025".to_string()];
        let messages = build_prompt(&PromptContext {
            config: &config,
            turn: &turn,
            history: &[],
            citations: &citations,
            partial: None,
            violation: None,
        });

        let citation_pos = messages
            .iter()
            .position(|m| m.content.contains("Report A"))
            .unwrap();
        let task_pos = messages.len() - 1;
        assert!(citation_pos < task_pos);
        assert_eq!(messages[citation_pos].role, ChatRole::System);
    }

    #[test]
    fn history_window_is_capped() {
        let mut config = DebateConfig::new("p");
        config.history_window = 3;
        let turn = turn_for(Speaker::Pro, PromptKind::Constructive);
        let history: Vec<Utterance> = (0..10)
            .map(|i| utterance(Speaker::Con, &format!("point {i}"), i))
            .collect();

        let messages = build_prompt(&PromptContext {
            config: &config,
            turn: &turn,
            history: &history,
            citations: &[],
            partial: None,
            violation: None,
        });

        // 2 system + 3 history + 1 task.
        assert_eq!(messages.len(), 6);
        assert!(messages[2].content.contains("point 7"));
        assert!(!messages.iter().any(|m| m.content.contains("point 6")));
    }

    #[test]
    fn own_turns_become_assistant_messages() {
        let config = DebateConfig::new("p");
        let turn = turn_for(Speaker::Pro, PromptKind::Rebuttal);
        let history = vec![
            utterance(Speaker::Pro, "my earlier point", 0),
            utterance(Speaker::Con, "their reply", 1),
        ];

        let messages = build_prompt(&PromptContext {
            config: &config,
            turn: &turn,
            history: &history,
            citations: &[],
            partial: None,
            violation: None,
        });

        let own = messages
            .iter()
            .find(|m| m.content.contains("my earlier point"))
            .unwrap();
        assert_eq!(own.role, ChatRole::Assistant);

        let theirs = messages
            .iter()
            .find(|m| m.content.contains("their reply"))
            .unwrap();
        assert_eq!(theirs.role, ChatRole::User);
        assert!(theirs.content.contains("con"));
    }

    #[test]
    fn chair_identity_names_framework() {
        let config = DebateConfig::new("p");
        let turn = turn_for(
            Speaker::Chair {
                position: "skeptic".into(),
                framework: Framework::Deontological,
            },
            PromptKind::Exchange,
        );
        let messages = build_prompt(&PromptContext {
            config: &config,
            turn: &turn,
            history: &[],
            citations: &[],
            partial: None,
            violation: None,
        });
        assert!(messages[0].content.contains("deontological"));
        assert!(messages[0].content.contains("skeptic"));
    }

    #[test]
    fn arbiter_correction_names_violation() {
        let config = DebateConfig::new("p");
        let turn = turn_for(Speaker::Arbiter, PromptKind::Interjection);
        let messages = build_prompt(&PromptContext {
            config: &config,
            turn: &turn,
            history: &[],
            citations: &[],
            partial: None,
            violation: Some(ViolationKind::MissingSelfCritique),
        });
        let task = &messages.last().unwrap().content;
        assert!(task.contains("weakness"));
    }

    #[test]
    fn builder_is_deterministic() {
        let config = DebateConfig::new("p");
        let turn = turn_for(Speaker::Pro, PromptKind::Opening);
        let history = vec![utterance(Speaker::Con, "x", 0)];
        let build = || {
            build_prompt(&PromptContext {
                config: &config,
                turn: &turn,
                history: &history,
                citations: &[],
                partial: None,
                violation: None,
            })
        };
        assert_eq!(build(), build());
    }
}
