/// Session manager configuration
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Wire format of the renewal request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalFormat {
    /// `{"refresh_token": "..."}` as JSON
    #[default]
    Json,
    /// `grant_type=refresh_token&refresh_token=...` (RFC 6749 section 6)
    OauthForm,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub refresh_endpoint: String,
    #[serde(default)]
    pub renewal_format: RenewalFormat,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_expiry_markers")]
    pub expiry_markers: Vec<String>,
    #[serde(default = "default_access_token_key")]
    pub access_token_key: String,
    #[serde(default = "default_refresh_token_key")]
    pub refresh_token_key: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Key of the cross-process refresh lock; `None` disables it
    #[serde(default)]
    pub lock_key: Option<String>,
    /// Directory for lock files; defaults to the runtime directory
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
}

fn default_expiry_markers() -> Vec<String> {
    vec![
        "jwt expired".to_string(),
        "token_expired".to_string(),
        "access token expired".to_string(),
    ]
}

fn default_access_token_key() -> String {
    "access_token".to_string()
}

fn default_refresh_token_key() -> String {
    "refresh_token".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl SessionConfig {
    /// Create a configuration with defaults for everything but the renewal endpoint
    pub fn new(refresh_endpoint: impl Into<String>) -> Self {
        Self {
            refresh_endpoint: refresh_endpoint.into(),
            renewal_format: RenewalFormat::default(),
            client_id: None,
            expiry_markers: default_expiry_markers(),
            access_token_key: default_access_token_key(),
            refresh_token_key: default_refresh_token_key(),
            request_timeout_secs: default_request_timeout_secs(),
            lock_key: None,
            lock_dir: None,
        }
    }

    /// Preset for a standard OAuth 2.0 token endpoint
    ///
    /// Sends the form-encoded refresh grant along with the client id.
    pub fn oauth2(token_endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(token_endpoint)
            .with_renewal_format(RenewalFormat::OauthForm)
            .with_client_id(client_id)
    }

    pub fn with_renewal_format(mut self, format: RenewalFormat) -> Self {
        self.renewal_format = format;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Replace the expiry markers recognised in 401 bodies
    pub fn with_expiry_markers<I, M>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.expiry_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_storage_keys(
        mut self,
        access_token_key: impl Into<String>,
        refresh_token_key: impl Into<String>,
    ) -> Self {
        self.access_token_key = access_token_key.into();
        self.refresh_token_key = refresh_token_key.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Coordinate renewals with other processes sharing the same storage
    pub fn with_lock_key(mut self, key: impl Into<String>) -> Self {
        self.lock_key = Some(key.into());
        self
    }

    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
