//! LLM gateway: a uniform request/stream interface over named models.
//!
//! The engine talks to models exclusively through [`LlmProvider`] and
//! [`ModelRouter`]; provider adapters translate to the wire format of each
//! endpoint. Retry policy and rate limiting live here so every caller gets
//! the same behaviour.

mod limiter;
mod openai_compat;
mod retry;
mod router;
mod sanitize;
mod scripted;
mod traits;
mod util;

pub use limiter::RateGate;
pub use openai_compat::{OpenAiCompatProvider, ProviderSpec};
pub use retry::{with_backoff, BackoffPolicy};
pub use router::{ModelRouter, ResolvedModel};
pub use sanitize::sanitize_response;
pub use scripted::{ScriptStep, ScriptedProvider};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
