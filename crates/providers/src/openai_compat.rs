//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, Together, and any other endpoint that
//! follows the OpenAI chat completions contract. This is the one wire
//! format the debate engine speaks; per-model routing happens above it in
//! the [`ModelRouter`](crate::ModelRouter).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agora_domain::chat::{ChatMessage, ChatRole};
use agora_domain::error::{Error, Result};
use agora_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_status, net_error, parse_retry_after};

/// Default per-call deadline when the request does not carry one.
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Construction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Declarative description of one OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Provider id, also the routing prefix of model ids (`openai/gpt-4o`).
    pub id: String,
    pub base_url: String,
    /// Environment variable holding the API key. Checked before `api_key`.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Direct API key. Prefer `api_key_env` outside tests.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Auth header name; defaults to `Authorization`.
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Auth value prefix; defaults to `"Bearer "`.
    #[serde(default)]
    pub auth_prefix: Option<String>,
    #[serde(default = "d_default_model")]
    pub default_model: String,
}

fn d_default_model() -> String {
    "gpt-4o".into()
}

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    auth_header: String,
    auth_prefix: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build an adapter from its spec, resolving the API key.
    pub fn from_spec(spec: &ProviderSpec) -> Result<Self> {
        let api_key = match (&spec.api_key_env, &spec.api_key) {
            (Some(env), _) => std::env::var(env).map_err(|_| {
                Error::InvalidConfig(format!("provider {}: env var {env} not set", spec.id))
            })?,
            (None, Some(key)) => key.clone(),
            (None, None) => {
                return Err(Error::InvalidConfig(format!(
                    "provider {}: no api_key_env or api_key",
                    spec.id
                )))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .map_err(net_error)?;

        Ok(Self {
            id: spec.id.clone(),
            base_url: spec.base_url.trim_end_matches('/').to_string(),
            api_key,
            auth_header: spec
                .auth_header
                .clone()
                .unwrap_or_else(|| "Authorization".into()),
            auth_prefix: spec.auth_prefix.clone().unwrap_or_else(|| "Bearer ".into()),
            default_model: spec.default_model.clone(),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn authed_post(&self, url: &str, timeout_ms: Option<u64>) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .timeout(Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)))
            .header(&self.auth_header, format!("{}{}", self.auth_prefix, self.api_key))
            .header("Content-Type", "application/json")
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": stream,
        });
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_wire(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    serde_json::json!({ "role": role, "content": msg.content })
}

fn parse_chat_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.to_string(),
            message: "no choices in response".into(),
        })?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    Ok(ChatResponse {
        content,
        usage: body.get("usage").and_then(parse_usage),
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one `data:` payload of the chat-completions stream contributes.
enum Payload {
    /// A text delta.
    Token(String),
    /// Terminal bookkeeping. With `stream_options.include_usage` the
    /// endpoint splits `finish_reason` and `usage` across separate chunks;
    /// the decoder merges them into the one final `Done`.
    Terminal {
        finish_reason: Option<String>,
        usage: Option<Usage>,
    },
    /// The `[DONE]` sentinel.
    End,
    /// Nothing usable (role-only delta, empty delta, keep-alive chunk).
    Skip,
}

fn parse_payload(data: &str) -> Result<Payload> {
    if data == "[DONE]" {
        return Ok(Payload::End);
    }
    let v: Value = serde_json::from_str(data)?;
    let usage = v.get("usage").and_then(parse_usage);

    let Some(choice) = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    else {
        return Ok(match usage {
            Some(_) => Payload::Terminal {
                finish_reason: None,
                usage,
            },
            None => Payload::Skip,
        });
    };

    if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        return Ok(Payload::Terminal {
            finish_reason: Some(reason.to_string()),
            usage,
        });
    }

    match choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
    {
        Some(text) if !text.is_empty() => Ok(Payload::Token(text.to_string())),
        _ => Ok(Payload::Skip),
    }
}

/// Line-oriented decoder for the chat-completions SSE body.
///
/// Feeds on raw network chunks: partial lines buffer until their newline
/// arrives, an event's `data:` lines gather until the blank line that ends
/// it, and the terminal finish/usage chunks merge so every stream closes
/// with exactly one `Done` carrying both.
struct SseDecoder {
    /// Trailing partial line, waiting for the rest of it.
    pending: String,
    /// `data:` payloads of the event currently being assembled.
    data: Vec<String>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    /// Set once the terminal `Done` has been emitted.
    closed: bool,
}

impl SseDecoder {
    fn new() -> Self {
        Self {
            pending: String::new(),
            data: Vec::new(),
            finish_reason: None,
            usage: None,
            closed: false,
        }
    }

    /// Feed one body chunk, appending any completed stream events to `out`.
    fn feed(&mut self, chunk: &str, out: &mut Vec<Result<StreamEvent>>) {
        self.pending.push_str(chunk);
        while let Some(nl) = self.pending.find('\n') {
            let line = self.pending[..nl].trim_end_matches('\r').to_string();
            self.pending.replace_range(..=nl, "");
            self.take_line(&line, out);
        }
    }

    fn take_line(&mut self, line: &str, out: &mut Vec<Result<StreamEvent>>) {
        if line.is_empty() {
            // Blank line ends the event: decode its gathered payloads.
            self.dispatch(out);
        } else if let Some(payload) = line.strip_prefix("data:") {
            let payload = payload.trim();
            if !payload.is_empty() {
                self.data.push(payload.to_string());
            }
        }
        // `event:`/`id:`/`retry:` lines and comments carry nothing we use.
    }

    fn dispatch(&mut self, out: &mut Vec<Result<StreamEvent>>) {
        for data in std::mem::take(&mut self.data) {
            if self.closed {
                break;
            }
            match parse_payload(&data) {
                Ok(Payload::Token(text)) => out.push(Ok(StreamEvent::Token { text })),
                Ok(Payload::Terminal {
                    finish_reason,
                    usage,
                }) => {
                    if finish_reason.is_some() {
                        self.finish_reason = finish_reason;
                    }
                    if usage.is_some() {
                        self.usage = usage;
                    }
                }
                Ok(Payload::End) => out.push(Ok(self.close())),
                Ok(Payload::Skip) => {}
                Err(e) => out.push(Err(e)),
            }
        }
    }

    fn close(&mut self) -> StreamEvent {
        self.closed = true;
        StreamEvent::Done {
            usage: self.usage.take(),
            finish_reason: self.finish_reason.take().or_else(|| Some("stop".into())),
        }
    }

    /// End of body: decode a trailing line that never got its newline, then
    /// guarantee the terminal `Done` even when `[DONE]` never arrived.
    fn finish(&mut self, out: &mut Vec<Result<StreamEvent>>) {
        if !self.pending.trim().is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.take_line(line.trim_end_matches('\r'), out);
        }
        self.dispatch(out);
        if !self.closed {
            out.push(Ok(self.close()));
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = self.chat_url();
        let body = self.build_body(req, false);

        tracing::debug!(provider = %self.id, model = %self.effective_model(req), "chat request");

        let resp = self
            .authed_post(&url, req.timeout_ms)
            .json(&body)
            .send()
            .await
            .map_err(net_error)?;

        let status = resp.status();
        let retry_after = parse_retry_after(resp.headers());
        let text = resp.text().await.map_err(net_error)?;

        if !status.is_success() {
            return Err(from_status(&self.id, status, retry_after, &text));
        }

        let json: Value = serde_json::from_str(&text)?;
        parse_chat_response(&self.id, &json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = self.chat_url();
        let body = self.build_body(req, true);

        tracing::debug!(provider = %self.id, model = %self.effective_model(req), "stream request");

        let resp = self
            .authed_post(&url, req.timeout_ms)
            .json(&body)
            .send()
            .await
            .map_err(net_error)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let text = resp.text().await.map_err(net_error)?;
            return Err(from_status(&self.id, status, retry_after, &text));
        }

        let stream = async_stream::stream! {
            let mut resp = resp;
            let mut decoder = SseDecoder::new();
            let mut out = Vec::new();
            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => {
                        decoder.feed(&String::from_utf8_lossy(&bytes), &mut out);
                    }
                    Ok(None) => {
                        decoder.finish(&mut out);
                        for event in out.drain(..) {
                            yield event;
                        }
                        return;
                    }
                    Err(e) => {
                        yield Err(net_error(e));
                        return;
                    }
                }
                for event in out.drain(..) {
                    yield event;
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
