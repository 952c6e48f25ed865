//! Tokenrelay - authenticated HTTP sessions that survive access-token expiry
//!
//! This library attaches bearer credentials to outbound requests, notices
//! when the backend reports an expired access token, renews it exactly once
//! no matter how many requests noticed at the same time, and replays those
//! requests with the new token.
//!
//! # Features
//!
//! - Single-flight renewal shared by all threads of a session
//! - At most one replay per request
//! - Distinguishes token expiry from other 401/403 failures
//! - Pluggable credential storage (memory, JSON file, OS keyring)
//! - Optional cross-process renewal lock
//! - "Session ended" signal for the host application
//!
//! # Example
//!
//! ```
//! use tokenrelay::prelude::*;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let config = SessionConfig::new("https://api.example.com/auth/refresh-token");
//!
//! let session = SessionManager::new(config, storage).unwrap();
//! session.on_session_ended(|event| println!("signed out: {}", event.reason));
//! session.establish("access-token", Some("refresh-token")).unwrap();
//!
//! assert!(session.is_active());
//! // let response = session.send(&ApiRequest::get("https://api.example.com/courses"))?;
//! ```

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod expiry;
pub mod http;
pub mod lock;
pub mod refresh;
pub mod renewal;
pub mod replay;
pub mod session;
pub mod storage;
pub mod terminator;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{RenewalFormat, SessionConfig};
    pub use crate::credentials::Credentials;
    pub use crate::error::{RefreshFailure, SessionError};
    pub use crate::http::{ApiRequest, ApiResponse, HttpTransport};
    pub use crate::renewal::{RenewedTokens, Renewer};
    pub use crate::session::SessionManager;
    pub use crate::storage::{CredentialStorage, FileStorage, MemoryStorage, SecureStorage};
    pub use crate::terminator::{EndReason, SessionEnded};
}
