/// Access/refresh token persistence with an ambient default credential
use crate::error::{Result, SessionError};
use crate::storage::CredentialStorage;
use parking_lot::RwLock;
use std::sync::Arc;

/// The pair of tokens held for a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Reads and writes the session's tokens
///
/// Besides the durable medium, the store keeps the access token in memory as
/// the ambient default credential. `set` updates both, so requests that never
/// went through a replay still pick up a renewed token.
pub struct CredentialStore {
    storage: Arc<dyn CredentialStorage>,
    access_key: String,
    refresh_key: String,
    ambient: RwLock<Option<String>>,
}

impl CredentialStore {
    pub fn new(
        storage: Arc<dyn CredentialStorage>,
        access_key: impl Into<String>,
        refresh_key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
            ambient: RwLock::new(None),
        }
    }

    /// Read both tokens from the durable medium
    pub fn get(&self) -> Result<Credentials> {
        let access_token = self.storage.get(&self.access_key).map_err(SessionError::Storage)?;
        let refresh_token = self
            .storage
            .get(&self.refresh_key)
            .map_err(SessionError::Storage)?;

        Ok(Credentials {
            access_token,
            refresh_token,
        })
    }

    /// Persist the access token and, when given, the refresh token
    ///
    /// A `None` refresh token leaves the stored one untouched.
    pub fn set(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        self.storage
            .set(&self.access_key, access_token)
            .map_err(SessionError::Storage)?;

        if let Some(refresh_token) = refresh_token {
            self.storage
                .set(&self.refresh_key, refresh_token)
                .map_err(SessionError::Storage)?;
        }

        *self.ambient.write() = Some(access_token.to_string());
        Ok(())
    }

    /// Remove both tokens and the ambient credential
    ///
    /// The ambient credential is dropped even when the medium fails, so no
    /// further request leaves with the old token.
    pub fn clear(&self) -> Result<()> {
        *self.ambient.write() = None;

        let access = self.storage.remove(&self.access_key);
        let refresh = self.storage.remove(&self.refresh_key);
        access.and(refresh).map_err(SessionError::Storage)
    }

    /// The access token to attach to an outbound request
    ///
    /// Falls back to the durable medium on a cold start and caches the result.
    pub fn access_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.ambient.read().clone() {
            return Ok(Some(token));
        }

        let stored = self.storage.get(&self.access_key).map_err(SessionError::Storage)?;
        if let Some(token) = &stored {
            *self.ambient.write() = Some(token.clone());
        }
        Ok(stored)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.storage.get(&self.refresh_key).map_err(SessionError::Storage)
    }

    /// Use a token another writer already persisted as the ambient credential
    pub(crate) fn adopt(&self, access_token: &str) {
        *self.ambient.write() = Some(access_token.to_string());
    }
}
