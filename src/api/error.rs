//! Collaborator error types

use thiserror::Error;

/// Failure talking to the companion service, with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InvalidRequest, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InvalidResponse, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = error_detail(body).unwrap_or_else(|| format!("HTTP {status}"));
        match status {
            401 | 403 => Self::auth(format!("Not signed in or session expired: {detail}")),
            429 => Self::rate_limit(format!("Too many requests: {detail}")),
            500..=599 => Self::server_error(format!("Service unavailable: {detail}")),
            _ => Self::invalid_request(format!("Request rejected: {detail}")),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::invalid_response(format!("Unexpected response body: {e}"))
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), "")
        } else {
            Self::network(format!("Network error: {e}"))
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connect failures, timeouts, dropped bodies
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Missing or rejected bearer credential (401, 403)
    Auth,
    /// Other 4xx
    InvalidRequest,
    /// Body that does not match the expected shape
    InvalidResponse,
}

impl ApiErrorKind {
    /// Whether trying again later can succeed without user intervention
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

/// Pull a human readable message out of a FastAPI-style error body
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let detail = parsed.as_ref().and_then(|value| {
        value
            .get("detail")
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
    });
    Some(detail.unwrap_or_else(|| body.to_string()))
}
