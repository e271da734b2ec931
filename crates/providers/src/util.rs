use agora_domain::error::Error;

/// Map a transport-level `reqwest` failure onto the taxonomy.
///
/// Timeouts keep their own class so the turn loop can count them against
/// its timeout retry budget; every other transport failure is a transient
/// `Http`, annotated with which stage of the exchange broke.
pub(crate) fn net_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        return Error::Timeout(format!("http request: {e}"));
    }
    let detail = if e.is_connect() {
        format!("connect: {e}")
    } else if e.is_body() || e.is_decode() {
        format!("body: {e}")
    } else {
        e.to_string()
    };
    Error::Http(detail)
}

/// Classify a non-success HTTP status per the error taxonomy.
///
/// - 429 → `RateLimited` (with the `Retry-After` hint when provided)
/// - other 4xx → `InvalidRequest` (permanent, never retried)
/// - 5xx → `Http` (transient)
pub(crate) fn from_status(
    provider: &str,
    status: reqwest::StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
) -> Error {
    if status.as_u16() == 429 {
        return Error::RateLimited { retry_after_ms };
    }
    if status.is_client_error() {
        return Error::InvalidRequest {
            provider: provider.to_string(),
            message: format!("HTTP {} - {}", status.as_u16(), body),
        };
    }
    Error::Http(format!("{provider}: HTTP {} - {}", status.as_u16(), body))
}

/// Parse a `Retry-After` header value (delta-seconds form) into ms.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1000)
}
