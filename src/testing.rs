/// In-process backend used by the session manager tests
use crate::error::{RefreshFailure, Result};
use crate::http::{ApiRequest, ApiResponse, HttpTransport};
use crate::renewal::{RenewedTokens, Renewer};
use parking_lot::{Mutex, RwLock};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Resource server and renewal endpoint in one
///
/// Resources accept only the currently valid access token and answer every
/// other token with a 401 carrying `"jwt expired"`. Paths ending in
/// `/forbidden`, `/bad-credentials` and `/always-expired` misbehave on purpose.
pub(crate) struct FakeBackend {
    valid_token: RwLock<Option<String>>,
    next_access: String,
    next_refresh: Option<String>,
    failure: Mutex<Option<RefreshFailure>>,
    resource_delay: Duration,
    renew_delay: Duration,
    renew_calls: AtomicUsize,
    resource_calls: AtomicUsize,
    renewed_with: Mutex<Vec<String>>,
}

impl FakeBackend {
    /// Backend whose renewal hands out `next_access`
    pub(crate) fn new(next_access: &str) -> Self {
        Self {
            valid_token: RwLock::new(None),
            next_access: next_access.to_string(),
            next_refresh: None,
            failure: Mutex::new(None),
            resource_delay: Duration::from_millis(50),
            renew_delay: Duration::from_millis(200),
            renew_calls: AtomicUsize::new(0),
            resource_calls: AtomicUsize::new(0),
            renewed_with: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn rotating(mut self, next_refresh: &str) -> Self {
        self.next_refresh = Some(next_refresh.to_string());
        self
    }

    pub(crate) fn failing(self, failure: RefreshFailure) -> Self {
        *self.failure.lock() = Some(failure);
        self
    }

    /// Make `token` acceptable without a renewal
    pub(crate) fn accept(&self, token: &str) {
        *self.valid_token.write() = Some(token.to_string());
    }

    pub(crate) fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn resource_calls(&self) -> usize {
        self.resource_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn renewed_with(&self) -> Vec<String> {
        self.renewed_with.lock().clone()
    }
}

impl HttpTransport for FakeBackend {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.resource_calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.resource_delay);

        if request.url.ends_with("/forbidden") {
            return Ok(ApiResponse::new(
                StatusCode::FORBIDDEN,
                r#"{"message": "permission denied"}"#,
            ));
        }
        if request.url.ends_with("/bad-credentials") {
            return Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"message": "invalid credentials"}"#,
            ));
        }

        let presented = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);

        let valid = self.valid_token.read().clone();
        if request.url.ends_with("/always-expired") || presented.is_none() || presented != valid {
            return Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"message": "jwt expired"}"#,
            ));
        }

        let body = serde_json::json!({ "url": request.url, "token": presented });
        Ok(ApiResponse::new(StatusCode::OK, body.to_string()))
    }
}

impl Renewer for FakeBackend {
    fn renew(&self, refresh_token: &str) -> std::result::Result<RenewedTokens, RefreshFailure> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        self.renewed_with.lock().push(refresh_token.to_string());
        thread::sleep(self.renew_delay);

        if let Some(failure) = self.failure.lock().clone() {
            return Err(failure);
        }

        self.accept(&self.next_access);
        Ok(RenewedTokens {
            access_token: self.next_access.clone(),
            refresh_token: self.next_refresh.clone(),
        })
    }
}
