/// The authenticated session and its request path
use crate::config::SessionConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::dispatch::RequestDispatcher;
use crate::error::Result;
use crate::expiry::ExpiryDetector;
use crate::http::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
use crate::lock::RefreshLockManager;
use crate::refresh::RefreshCoordinator;
use crate::renewal::{HttpRenewer, Renewer};
use crate::replay::ReplayEngine;
use crate::storage::CredentialStorage;
use crate::terminator::{EndReason, SessionEnded, SessionTerminator};
use std::sync::Arc;

/// One logical login
///
/// Owns the credentials, the renewal state and the termination signal for
/// a single session. Share it between threads with `Arc`; every request
/// goes through [`send`](Self::send).
pub struct SessionManager {
    store: Arc<CredentialStore>,
    terminator: Arc<SessionTerminator>,
    coordinator: Arc<RefreshCoordinator>,
    replay: ReplayEngine,
}

impl SessionManager {
    /// Create a session manager talking HTTP through `reqwest`
    pub fn new(config: SessionConfig, storage: Arc<dyn CredentialStorage>) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        let renewer = HttpRenewer::from_transport(&transport, &config);
        Self::with_parts(config, storage, Arc::new(transport), Arc::new(renewer))
    }

    /// Create a session manager with a custom transport and renewer
    pub fn with_parts(
        config: SessionConfig,
        storage: Arc<dyn CredentialStorage>,
        transport: Arc<dyn HttpTransport>,
        renewer: Arc<dyn Renewer>,
    ) -> Result<Self> {
        let store = Arc::new(CredentialStore::new(
            storage,
            &config.access_token_key,
            &config.refresh_token_key,
        ));
        let terminator = Arc::new(SessionTerminator::new(store.clone()));

        let mut coordinator = RefreshCoordinator::new(renewer, store.clone(), terminator.clone());
        if let Some(key) = &config.lock_key {
            let manager = match &config.lock_dir {
                Some(dir) => RefreshLockManager::new(dir.clone())?,
                None => RefreshLockManager::for_app(env!("CARGO_PKG_NAME"))?,
            };
            coordinator = coordinator.with_cross_process_lock(manager, key.as_str());
        }
        let coordinator = Arc::new(coordinator);

        let replay = ReplayEngine::new(
            RequestDispatcher::new(transport, store.clone()),
            ExpiryDetector::new(&config.expiry_markers),
            coordinator.clone(),
            terminator.clone(),
            store.clone(),
        );

        Ok(Self {
            store,
            terminator,
            coordinator,
            replay,
        })
    }

    /// Start a session from a login or SSO callback
    ///
    /// Replaces whatever credentials were stored before. `refresh_token` is
    /// `None` for flows that do not issue one; such sessions end at the first
    /// expiry.
    pub fn establish(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        self.terminator.begin(|| {
            self.store.clear()?;
            self.store.set(access_token, refresh_token)
        })?;

        tracing::info!(renewable = refresh_token.is_some(), "session established");
        Ok(())
    }

    /// Resume a session persisted by an earlier process
    ///
    /// Returns whether stored credentials were found.
    pub fn restore(&self) -> Result<bool> {
        let credentials = self.store.get()?;
        if credentials.access_token.is_none() {
            return Ok(false);
        }

        self.terminator.activate();
        tracing::info!(
            renewable = credentials.refresh_token.is_some(),
            "session restored"
        );
        Ok(true)
    }

    /// Send a request on behalf of the session
    ///
    /// An expired access token is renewed and the request replayed once; the
    /// caller only sees the final response, an `UnrelatedAuthFailure`, a
    /// `TerminalExpiry` after the session ended, or a storage or transport error.
    pub fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.replay.execute(request)
    }

    /// Renew the access token now, joining a renewal already in flight
    pub fn ensure_fresh_token(&self) -> Result<String> {
        let current = self.store.access_token()?;
        Ok(self.coordinator.ensure_fresh_token(current.as_deref())?)
    }

    pub fn credentials(&self) -> Result<Credentials> {
        self.store.get()
    }

    /// Whether the session holds credentials and has not ended
    pub fn is_active(&self) -> bool {
        self.terminator.is_active() && matches!(self.store.access_token(), Ok(Some(_)))
    }

    pub fn is_refreshing(&self) -> bool {
        self.coordinator.is_refreshing()
    }

    /// Register a callback for the "session ended" signal
    ///
    /// Fired once per termination, from the thread that ended the session.
    pub fn on_session_ended<F>(&self, listener: F)
    where
        F: Fn(&SessionEnded) + Send + Sync + 'static,
    {
        self.terminator.subscribe(Arc::new(listener));
    }

    /// End the session at the user's request
    pub fn logout(&self) -> Result<()> {
        self.terminator.terminate(EndReason::Logout)?;
        Ok(())
    }

    /// Release every caller parked behind a renewal
    ///
    /// For host teardown: parked callers return `SessionError::Cancelled`.
    /// Returns how many were released.
    pub fn shutdown(&self) -> usize {
        self.coordinator.cancel_pending()
    }
}
