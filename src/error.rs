/// Error types for session management
use crate::http::ApiResponse;
use thiserror::Error;

/// Why a credential renewal did not produce a fresh access token
///
/// Every variant is terminal for the session: retrying with the same refresh
/// token cannot change the outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("renewal endpoint rejected the refresh token (status {status})")]
    Rejected { status: u16 },

    #[error("renewal request failed: {0}")]
    Transport(String),

    #[error("invalid response from renewal endpoint: {0}")]
    InvalidResponse(String),

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("request replayed once and still expired")]
    ReplayExpired,

    #[error("storage error while renewing: {0}")]
    Storage(String),

    #[error("session manager shut down before renewal settled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("request rejected with status {}", .0.status)]
    UnrelatedAuthFailure(ApiResponse),

    #[error("session expired: {reason}")]
    TerminalExpiry { reason: RefreshFailure },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session manager shut down")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the host application should route to its unauthenticated entry point
    pub fn is_session_expired(&self) -> bool {
        matches!(self, SessionError::TerminalExpiry { .. })
    }
}

impl From<RefreshFailure> for SessionError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Cancelled => SessionError::Cancelled,
            RefreshFailure::Storage(message) => SessionError::Storage(message),
            reason => SessionError::TerminalExpiry { reason },
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
