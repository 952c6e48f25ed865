/// Session termination and the "session ended" signal
use crate::credentials::CredentialStore;
use crate::error::{RefreshFailure, Result};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The host application logged the user out
    Logout,
    /// The session expired and could not be renewed
    Expired(RefreshFailure),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Logout => write!(f, "logout"),
            EndReason::Expired(failure) => write!(f, "expired: {}", failure),
        }
    }
}

/// Payload delivered to session listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnded {
    pub reason: EndReason,
}

/// Callback invoked once per termination
pub type SessionListener = Arc<dyn Fn(&SessionEnded) + Send + Sync>;

/// Clears credentials and notifies the host application
///
/// Termination is idempotent per session: only the first call since the
/// session began clears the store and emits the signal. A manager built over
/// storage that already holds tokens counts as a live session.
///
/// Every change of session state goes through one mutex, so a renewal
/// landing concurrently either writes before the store is cleared or not at
/// all.
pub struct SessionTerminator {
    store: Arc<CredentialStore>,
    ended: Mutex<bool>,
    generation: AtomicU64,
    listeners: RwLock<Vec<SessionListener>>,
}

impl SessionTerminator {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self {
            store,
            ended: Mutex::new(false),
            generation: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for the "session ended" signal
    pub fn subscribe(&self, listener: SessionListener) {
        self.listeners.write().push(listener);
    }

    /// Mark a new session as live
    pub fn activate(&self) {
        let mut ended = self.ended.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *ended = false;
    }

    /// Run `begin` and, if it succeeds, start a new session
    ///
    /// Renewals that started before are discarded.
    pub(crate) fn begin<T>(&self, begin: impl FnOnce() -> Result<T>) -> Result<T> {
        let mut ended = self.ended.lock();
        let value = begin()?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *ended = false;
        Ok(value)
    }

    /// Run `commit` only if the session is still the one of `generation`
    pub(crate) fn commit_if_current<T>(
        &self,
        generation: u64,
        commit: impl FnOnce() -> T,
    ) -> Option<T> {
        let ended = self.ended.lock();
        if *ended || self.generation() != generation {
            return None;
        }
        Some(commit())
    }

    pub fn is_active(&self) -> bool {
        !*self.ended.lock()
    }

    /// Changes on every activation and termination
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// End the session
    ///
    /// Returns `Ok(true)` when this call ended the session and `Ok(false)` when
    /// it was already over. A storage failure while clearing is returned after
    /// listeners have been notified; the in-memory credential is gone either way.
    pub fn terminate(&self, reason: EndReason) -> Result<bool> {
        let cleared = {
            let mut ended = self.ended.lock();
            if *ended {
                tracing::debug!(%reason, "session already ended");
                return Ok(false);
            }
            *ended = true;
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.store.clear()
        };
        if let Err(e) = &cleared {
            tracing::error!(error = %e, "failed to clear credentials on session end");
        }

        tracing::warn!(%reason, "session ended");

        let event = SessionEnded { reason };
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(&event);
        }

        cleared.map(|()| true)
    }
}
