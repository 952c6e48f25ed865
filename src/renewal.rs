/// Client for the backend's credential renewal endpoint
use crate::config::{RenewalFormat, SessionConfig};
use crate::error::{RefreshFailure, Result};
use crate::http::ReqwestTransport;
use reqwest::header::ACCEPT;
use serde::Deserialize;

/// Tokens returned by a successful renewal
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenewedTokens {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    /// Present when the backend rotates refresh tokens
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token for a new access token
///
/// Every error is terminal for the session; implementations must not retry.
pub trait Renewer: Send + Sync {
    fn renew(&self, refresh_token: &str) -> std::result::Result<RenewedTokens, RefreshFailure>;
}

/// Renewal over HTTP
#[derive(Debug, Clone)]
pub struct HttpRenewer {
    client: reqwest::blocking::Client,
    endpoint: String,
    format: RenewalFormat,
    client_id: Option<String>,
}

impl HttpRenewer {
    /// Create a renewer with its own HTTP client
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Share the connection pool of an existing transport
    pub fn from_transport(transport: &ReqwestTransport, config: &SessionConfig) -> Self {
        Self::with_client(transport.client().clone(), config)
    }

    pub fn with_client(client: reqwest::blocking::Client, config: &SessionConfig) -> Self {
        Self {
            client,
            endpoint: config.refresh_endpoint.clone(),
            format: config.renewal_format,
            client_id: config.client_id.clone(),
        }
    }
}

impl Renewer for HttpRenewer {
    fn renew(&self, refresh_token: &str) -> std::result::Result<RenewedTokens, RefreshFailure> {
        let builder = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json");

        let builder = match self.format {
            RenewalFormat::Json => {
                builder.json(&serde_json::json!({ "refresh_token": refresh_token }))
            }
            RenewalFormat::OauthForm => {
                let mut params = vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ];
                if let Some(client_id) = &self.client_id {
                    params.push(("client_id", client_id.as_str()));
                }
                builder.form(&params)
            }
        };

        let response = builder
            .send()
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshFailure::Rejected {
                status: status.as_u16(),
            });
        }

        response
            .json::<RenewedTokens>()
            .map_err(|e| RefreshFailure::InvalidResponse(e.to_string()))
    }
}
