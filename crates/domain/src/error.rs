use crate::debate::Phase;

/// Shared error type used across all agora crates.
///
/// Variants are grouped by recovery class: callers pattern-match on them to
/// decide between retry (transient), skip (empty response), and failing the
/// session (permanent). See [`Error::is_transient`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Transient network failure (connect error, 5xx, truncated body).
    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// The provider asked us to slow down. `retry_after_ms` comes from the
    /// `Retry-After` header when present.
    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    /// The model returned no usable content.
    #[error("empty response from {model}")]
    EmptyResponse { model: String },

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// A request the provider rejected outright (HTTP 400). Never retried.
    #[error("invalid request to {provider}: {message}")]
    InvalidRequest { provider: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store (transient): {0}")]
    StoreTransient(String),

    #[error("store (permanent): {0}")]
    StorePermanent(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("invalid intervention: {0}")]
    InvalidIntervention(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("session already started: {0}")]
    AlreadyStarted(String),

    #[error("session not running: {0}")]
    NotRunning(String),

    #[error("session not paused: {0}")]
    NotPaused(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a retry with backoff may succeed.
    ///
    /// Rate limits count as transient: the retry helper waits out the
    /// `retry_after_ms` hint before the next attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Timeout(_)
                | Error::RateLimited { .. }
                | Error::StoreTransient(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Http("503".into()).is_transient());
        assert!(Error::Timeout("llm call".into()).is_transient());
        assert!(Error::RateLimited {
            retry_after_ms: Some(500)
        }
        .is_transient());
        assert!(Error::StoreTransient("lock".into()).is_transient());

        assert!(!Error::InvalidRequest {
            provider: "openai".into(),
            message: "bad model".into()
        }
        .is_transient());
        assert!(!Error::StorePermanent("corrupt".into()).is_transient());
        assert!(!Error::EmptyResponse {
            model: "gpt-4o".into()
        }
        .is_transient());
    }
}
