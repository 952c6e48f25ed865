/// Renew-and-replay for requests that hit an expired access token
use crate::credentials::CredentialStore;
use crate::dispatch::RequestDispatcher;
use crate::error::{RefreshFailure, Result, SessionError};
use crate::expiry::{Classification, ExpiryDetector};
use crate::http::{ApiRequest, ApiResponse};
use crate::refresh::RefreshCoordinator;
use crate::terminator::{EndReason, SessionTerminator};
use reqwest::StatusCode;
use std::sync::Arc;

/// Per-request guard against unbounded replay
///
/// Starts unset, is set once when the request is replayed and never reset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryMarker {
    retried: bool,
}

impl RetryMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.retried
    }

    fn set(&mut self) {
        debug_assert!(!self.retried, "request replayed twice");
        self.retried = true;
    }
}

pub struct ReplayEngine {
    dispatcher: RequestDispatcher,
    detector: ExpiryDetector,
    coordinator: Arc<RefreshCoordinator>,
    terminator: Arc<SessionTerminator>,
    store: Arc<CredentialStore>,
}

impl ReplayEngine {
    pub fn new(
        dispatcher: RequestDispatcher,
        detector: ExpiryDetector,
        coordinator: Arc<RefreshCoordinator>,
        terminator: Arc<SessionTerminator>,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self {
            dispatcher,
            detector,
            coordinator,
            terminator,
            store,
        }
    }

    /// Send a request, renewing the session and replaying it once on expiry
    pub fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut marker = RetryMarker::new();
        let mut dispatched = self.dispatcher.send(request, None)?;

        loop {
            let has_refresh_token = dispatched.response.status == StatusCode::UNAUTHORIZED
                && self.store.refresh_token()?.is_some();

            match self
                .detector
                .classify(&dispatched.response, marker.is_set(), has_refresh_token)
            {
                Classification::NotAuthRelated => return pass_through(dispatched.response),
                Classification::TerminalExpiry => {
                    let reason = if marker.is_set() {
                        RefreshFailure::ReplayExpired
                    } else {
                        RefreshFailure::NoRefreshToken
                    };
                    return Err(self.expire(reason));
                }
                Classification::RenewableExpiry => {
                    tracing::debug!(url = %request.url, "access token expired, renewing");
                    let token = self
                        .coordinator
                        .ensure_fresh_token(dispatched.token.as_deref())?;

                    marker.set();
                    dispatched = self.dispatcher.send(request, Some(&token))?;
                }
            }
        }
    }

    fn expire(&self, reason: RefreshFailure) -> SessionError {
        if let Err(e) = self.terminator.terminate(EndReason::Expired(reason.clone())) {
            tracing::error!(error = %e, "session terminated with storage error");
        }
        SessionError::TerminalExpiry { reason }
    }
}

/// Hand back a response that is not about token expiry
///
/// Authorization failures become typed errors carrying the untouched
/// response; everything else is returned as is.
fn pass_through(response: ApiResponse) -> Result<ApiResponse> {
    if response.status == StatusCode::UNAUTHORIZED || response.status == StatusCode::FORBIDDEN {
        return Err(SessionError::UnrelatedAuthFailure(response));
    }
    Ok(response)
}
