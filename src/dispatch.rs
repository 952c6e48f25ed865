/// Outbound call path that attaches the bearer credential
use crate::credentials::CredentialStore;
use crate::error::{Result, SessionError};
use crate::http::{ApiRequest, ApiResponse, HttpTransport};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::sync::Arc;

/// A response together with the access token the request carried
#[derive(Debug)]
pub struct Dispatched {
    pub response: ApiResponse,
    pub token: Option<String>,
}

/// Sends requests with the current access token attached
pub struct RequestDispatcher {
    transport: Arc<dyn HttpTransport>,
    store: Arc<CredentialStore>,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<CredentialStore>) -> Self {
        Self { transport, store }
    }

    /// Apply the pre-send hook
    ///
    /// Uses `token` when given (replays), the ambient credential otherwise.
    /// Without any token the request goes out unauthenticated.
    pub fn authorize(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<(ApiRequest, Option<String>)> {
        let token = match token {
            Some(token) => Some(token.to_string()),
            None => self.store.access_token()?,
        };

        let mut request = request.clone();
        if let Some(token) = &token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                SessionError::Transport("access token is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }

        Ok((request, token))
    }

    pub fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<Dispatched> {
        let (request, token) = self.authorize(request, token)?;
        let response = self.transport.execute(&request)?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = response.status.as_u16(),
            authenticated = token.is_some(),
            "request completed"
        );

        Ok(Dispatched { response, token })
    }
}
