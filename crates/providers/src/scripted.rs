//! Deterministic scripted provider for tests.
//!
//! Each model name gets a queue of [`ScriptStep`]s; a call pops the next
//! step. Unscripted calls produce a deterministic generated reply (valid
//! JSON when `json_mode` is set), so whole debates run without network
//! access and without every role being scripted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use agora_domain::error::{Error, Result};
use agora_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

/// One scripted outcome for a single call.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return this text.
    Reply(String),
    /// Return empty content (exercises the empty-response path).
    Empty,
    /// Fail with a transient HTTP error.
    Transient(String),
    /// Fail with a permanent invalid-request error.
    InvalidRequest(String),
}

pub struct ScriptedProvider {
    id: String,
    scripts: Mutex<HashMap<String, VecDeque<ScriptStep>>>,
    calls: AtomicU64,
    /// Artificial delay between streamed tokens; gives tests room to race
    /// commands against an in-flight stream.
    token_delay_ms: u64,
    last_request: Mutex<Option<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
            token_delay_ms: 0,
            last_request: Mutex::new(None),
        }
    }

    pub fn with_token_delay_ms(mut self, ms: u64) -> Self {
        self.token_delay_ms = ms;
        self
    }

    /// Queue scripted steps for calls that request `model`.
    pub fn script_for(&self, model: impl Into<String>, steps: Vec<ScriptStep>) {
        self.scripts
            .lock()
            .entry(model.into())
            .or_default()
            .extend(steps);
    }

    /// Total calls seen (chat + stream).
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The last request seen, for assertions on prompt assembly.
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().clone()
    }

    fn next_step(&self, req: &ChatRequest) -> ScriptStep {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(req.clone());

        let model = req.model.clone().unwrap_or_default();
        if let Some(step) = self
            .scripts
            .lock()
            .get_mut(&model)
            .and_then(|q| q.pop_front())
        {
            return step;
        }

        if req.json_mode {
            // Unscripted structured call: a clean evaluation payload.
            return ScriptStep::Reply(
                serde_json::json!({
                    "adherence_score": 78,
                    "steel_man_attempted": true,
                    "steel_man_quality": 72,
                    "self_critique_attempted": true,
                    "self_critique_quality": 70,
                    "framework_consistency": 80,
                    "intellectual_honesty": 82,
                    "requires_interjection": false
                })
                .to_string(),
            );
        }

        ScriptStep::Reply(format!(
            "Speaking as {model}, I will take the proposition seriously. \
             The strongest opposing reading deserves a fair hearing before \
             any verdict. This is contribution number {n} to the exchange.",
        ))
    }

    fn usage_for(text: &str) -> Usage {
        let completion = text.split_whitespace().count() as u32;
        Usage {
            prompt_tokens: 20,
            completion_tokens: completion,
            total_tokens: 20 + completion,
        }
    }
}

/// Split text into word tokens with their trailing whitespace attached, so
/// streamed chunks reassemble byte-for-byte.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch.is_whitespace() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let model = req.model.clone().unwrap_or_else(|| "scripted".into());
        match self.next_step(req) {
            ScriptStep::Reply(text) => Ok(ChatResponse {
                usage: Some(Self::usage_for(&text)),
                content: text,
                model,
                finish_reason: Some("stop".into()),
            }),
            ScriptStep::Empty => Ok(ChatResponse {
                content: String::new(),
                usage: Some(Usage::default()),
                model,
                finish_reason: Some("stop".into()),
            }),
            ScriptStep::Transient(msg) => Err(Error::Http(msg)),
            ScriptStep::InvalidRequest(msg) => Err(Error::InvalidRequest {
                provider: self.id.clone(),
                message: msg,
            }),
        }
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let step = self.next_step(req);
        let delay_ms = self.token_delay_ms;
        match step {
            ScriptStep::Reply(text) => {
                let usage = Self::usage_for(&text);
                let tokens = tokenize(&text);
                let stream = async_stream::stream! {
                    for token in tokens {
                        if delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        }
                        yield Ok(StreamEvent::Token { text: token });
                    }
                    yield Ok(StreamEvent::Done {
                        usage: Some(usage),
                        finish_reason: Some("stop".into()),
                    });
                };
                Ok(Box::pin(stream))
            }
            ScriptStep::Empty => {
                let stream = async_stream::stream! {
                    yield Ok(StreamEvent::Done {
                        usage: Some(Usage::default()),
                        finish_reason: Some("stop".into()),
                    });
                };
                Ok(Box::pin(stream))
            }
            ScriptStep::Transient(msg) => Err(Error::Http(msg)),
            ScriptStep::InvalidRequest(msg) => Err(Error::InvalidRequest {
                provider: self.id.clone(),
                message: msg,
            }),
        }
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn req_for(model: &str) -> ChatRequest {
        ChatRequest {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn scripted_steps_pop_in_order() {
        let p = ScriptedProvider::new("mock");
        p.script_for(
            "m1",
            vec![
                ScriptStep::Reply("first".into()),
                ScriptStep::Empty,
                ScriptStep::Transient("503".into()),
            ],
        );

        let r = p.chat(&req_for("m1")).await.unwrap();
        assert_eq!(r.content, "first");

        let r = p.chat(&req_for("m1")).await.unwrap();
        assert!(r.content.is_empty());

        assert!(p.chat(&req_for("m1")).await.is_err());
        assert_eq!(p.call_count(), 3);
    }

    #[tokio::test]
    async fn stream_reassembles_exactly() {
        let p = ScriptedProvider::new("mock");
        p.script_for("m", vec![ScriptStep::Reply("One two.\n\nThree four.".into())]);

        let mut stream = p.chat_stream(&req_for("m")).await.unwrap();
        let mut buf = String::new();
        let mut saw_done = false;
        while let Some(ev) = stream.next().await {
            match ev.unwrap() {
                StreamEvent::Token { text } => buf.push_str(&text),
                StreamEvent::Done { usage, .. } => {
                    saw_done = true;
                    assert!(usage.is_some());
                }
                StreamEvent::Error { .. } => unreachable!(),
            }
        }
        assert_eq!(buf, "One two.\n\nThree four.");
        assert!(saw_done);
    }

    #[tokio::test]
    async fn unscripted_json_mode_yields_valid_json() {
        let p = ScriptedProvider::new("mock");
        let r = p
            .chat(&ChatRequest {
                model: Some("m".into()),
                json_mode: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&r.content).unwrap();
        assert!(v["adherence_score"].is_number());
    }

    #[tokio::test]
    async fn models_have_independent_queues() {
        let p = ScriptedProvider::new("mock");
        p.script_for("a", vec![ScriptStep::Reply("for a".into())]);
        p.script_for("b", vec![ScriptStep::Reply("for b".into())]);

        assert_eq!(p.chat(&req_for("b")).await.unwrap().content, "for b");
        assert_eq!(p.chat(&req_for("a")).await.unwrap().content, "for a");
    }
}
