//! Error types for the examforge core and its providers.
//!
//! Provider errors are defined here so the selection and analysis paths can
//! downcast and classify failures for retry/degrade decisions without string
//! matching.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the core selection/evaluation flow.
///
/// Everything else degrades in place: bad ingestion records are skipped,
/// retrieval falls back to unranked lookup, tranche shortfalls shrink the
/// yield, and collaborator failures resolve to a fallback report.
#[derive(Debug, Error)]
pub enum ExamError {
    /// No questions are indexed for any of the requested subjects.
    #[error("question repository is empty for exam type {0}")]
    RepositoryEmpty(String),

    /// The referenced test session does not exist.
    #[error("test session not found: {0}")]
    SessionNotFound(Uuid),

    /// The session was already scored; a session is evaluated exactly once.
    #[error("test session {0} has already been evaluated")]
    SessionAlreadyEvaluated(Uuid),

    /// A session entry references a question the repository no longer holds.
    #[error("unknown question id: {0}")]
    UnknownQuestion(String),

    /// The caller's request is structurally invalid (e.g. no subjects).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors that can occur when talking to an embedding or analysis backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The backend answered but the payload could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProviderError::AuthenticationFailed(_))
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
