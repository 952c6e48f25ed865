/// Single-flight credential renewal
///
/// When many threads discover an expired access token at once, exactly one
/// of them (the leader) calls the renewal endpoint. The others park on a
/// `PendingRequest` in a FIFO queue and receive the leader's outcome.
use crate::credentials::CredentialStore;
use crate::error::{RefreshFailure, SessionError};
use crate::lock::RefreshLockManager;
use crate::renewal::Renewer;
use crate::terminator::{EndReason, SessionTerminator};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Outcome = Result<String, RefreshFailure>;

#[cfg(test)]
static SETTLE_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// A caller parked behind an in-flight renewal
///
/// Settles exactly once: later settle attempts are ignored.
#[derive(Debug, Default)]
pub struct PendingRequest {
    slot: Mutex<Option<Outcome>>,
    ready: Condvar,
    /// Global settle order stamp, 0 while unsettled
    #[cfg(test)]
    settled_seq: AtomicUsize,
}

impl PendingRequest {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns whether this call settled the request
    fn settle(&self, outcome: Outcome) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        #[cfg(test)]
        self.settled_seq.store(
            SETTLE_SEQUENCE.fetch_add(1, Ordering::SeqCst) + 1,
            Ordering::SeqCst,
        );
        self.ready.notify_all();
        true
    }

    fn wait(&self) -> Outcome {
        let mut slot = self.slot.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.ready.wait(&mut slot);
        }
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<Arc<PendingRequest>>,
}

/// Owns the `Idle -> Refreshing -> Idle` protocol for one session
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    renewer: Arc<dyn Renewer>,
    store: Arc<CredentialStore>,
    terminator: Arc<SessionTerminator>,
    cross_process: Option<(RefreshLockManager, String)>,
}

impl RefreshCoordinator {
    pub fn new(
        renewer: Arc<dyn Renewer>,
        store: Arc<CredentialStore>,
        terminator: Arc<SessionTerminator>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::default()),
            renewer,
            store,
            terminator,
            cross_process: None,
        }
    }

    /// Also hold a file lock for `key` while renewing
    pub fn with_cross_process_lock(mut self, manager: RefreshLockManager, key: impl Into<String>) -> Self {
        self.cross_process = Some((manager, key.into()));
        self
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of callers parked behind the current renewal
    pub fn pending(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Get an access token that is newer than `stale`
    ///
    /// `stale` is the token the failed request carried. If the store already
    /// holds a different one, a renewal finished after that request left and
    /// the current token is returned without another renewal call.
    pub fn ensure_fresh_token(&self, stale: Option<&str>) -> Outcome {
        // Storage is read outside the state lock; the leader checks again
        let newer = self.newer_than(stale)?;

        let parked = {
            let mut state = self.state.lock();
            if state.refreshing {
                let pending = PendingRequest::new();
                state.waiters.push_back(pending.clone());
                Some(pending)
            } else {
                if let Some(current) = newer {
                    return Ok(current);
                }
                state.refreshing = true;
                None
            }
        };

        if let Some(pending) = parked {
            tracing::debug!("waiting for in-flight renewal");
            return pending.wait();
        }

        let flight = Flight {
            coordinator: self,
            landed: false,
        };
        let outcome = self.renew(stale);

        // Terminate while still refreshing so late callers park instead of
        // spending the dead refresh token again
        if let Err(failure) = &outcome {
            if ends_session(failure) {
                if let Err(e) = self.terminator.terminate(EndReason::Expired(failure.clone())) {
                    tracing::error!(error = %e, "session terminated with storage error");
                }
            }
        }
        flight.land(outcome.clone());

        outcome
    }

    /// Reject every parked caller with [`RefreshFailure::Cancelled`]
    ///
    /// Returns how many callers were released.
    pub fn cancel_pending(&self) -> usize {
        let waiters = std::mem::take(&mut self.state.lock().waiters);
        let released = waiters
            .into_iter()
            .filter(|pending| pending.settle(Err(RefreshFailure::Cancelled)))
            .count();
        if released > 0 {
            tracing::info!(released, "cancelled callers waiting on renewal");
        }
        released
    }

    fn newer_than(&self, stale: Option<&str>) -> Result<Option<String>, RefreshFailure> {
        let Some(stale) = stale else {
            return Ok(None);
        };
        let current = self.store.access_token().map_err(storage_failure)?;
        Ok(current.filter(|token| token != stale))
    }

    fn renew(&self, stale: Option<&str>) -> Outcome {
        let generation = self.terminator.generation();

        // A renewal may have landed between the caller's read and taking the lead
        if let Some(current) = self.newer_than(stale)? {
            return Ok(current);
        }

        let _lock = match &self.cross_process {
            Some((manager, key)) => {
                let lock = manager
                    .acquire(key)
                    .map_err(|e| RefreshFailure::Storage(e.to_string()))?;

                // Another process may have renewed while we waited for the lock
                if let Some(adopted) = self.adopt_stored(stale, generation)? {
                    tracing::info!("adopted token renewed by another process");
                    return Ok(adopted);
                }
                Some(lock)
            }
            None => None,
        };

        let refresh_token = self
            .store
            .refresh_token()
            .map_err(storage_failure)?
            .ok_or(RefreshFailure::NoRefreshToken)?;

        tracing::debug!("renewing access token");
        let tokens = self.renewer.renew(&refresh_token).inspect_err(|failure| {
            tracing::warn!(%failure, "credential renewal failed");
        })?;

        self.terminator
            .commit_if_current(generation, || {
                self.store
                    .set(&tokens.access_token, tokens.refresh_token.as_deref())
            })
            .ok_or_else(|| {
                tracing::info!("session changed during renewal, discarding renewed tokens");
                RefreshFailure::Cancelled
            })?
            .map_err(storage_failure)?;

        tracing::info!(
            rotated = tokens.refresh_token.is_some(),
            "access token renewed"
        );
        Ok(tokens.access_token)
    }

    fn adopt_stored(
        &self,
        stale: Option<&str>,
        generation: u64,
    ) -> Result<Option<String>, RefreshFailure> {
        let Some(stale) = stale else {
            return Ok(None);
        };
        let stored = self.store.get().map_err(storage_failure)?;
        match stored.access_token {
            Some(token) if token != stale => {
                self.terminator
                    .commit_if_current(generation, || self.store.adopt(&token))
                    .ok_or(RefreshFailure::Cancelled)?;
                Ok(Some(token))
            }
            _ => Ok(None),
        }
    }
}

/// Leadership of one renewal
///
/// Landing clears the flag and drains the queue in FIFO order. A leader that
/// unwinds without landing releases its waiters as cancelled.
struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    landed: bool,
}

impl Flight<'_> {
    fn land(mut self, outcome: Outcome) {
        self.drain(outcome);
        self.landed = true;
    }

    fn drain(&self, outcome: Outcome) {
        let waiters = {
            let mut state = self.coordinator.state.lock();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };

        let count = waiters.len();
        for pending in waiters {
            pending.settle(outcome.clone());
        }
        if count > 0 {
            tracing::debug!(count, ok = outcome.is_ok(), "released callers waiting on renewal");
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.landed {
            self.drain(Err(RefreshFailure::Cancelled));
        }
    }
}

/// Failures that leave the session without usable credentials
fn ends_session(failure: &RefreshFailure) -> bool {
    !matches!(
        failure,
        RefreshFailure::Storage(_) | RefreshFailure::Cancelled
    )
}

fn storage_failure(err: SessionError) -> RefreshFailure {
    match err {
        SessionError::Storage(message) => RefreshFailure::Storage(message),
        other => RefreshFailure::Storage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renewal::RenewedTokens;
    use crate::storage::{CredentialStorage, MemoryStorage};
    use crate::terminator::SessionEnded;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    /// Renewer that counts calls and holds each call open for a while
    struct SlowRenewer {
        calls: AtomicUsize,
        delay: Duration,
        outcome: std::result::Result<RenewedTokens, RefreshFailure>,
    }

    impl SlowRenewer {
        fn ok(access: &str, refresh: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(300),
                outcome: Ok(RenewedTokens {
                    access_token: access.to_string(),
                    refresh_token: refresh.map(str::to_string),
                }),
            })
        }

        fn failing(failure: RefreshFailure) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(300),
                outcome: Err(failure),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Renewer for SlowRenewer {
        fn renew(&self, _refresh_token: &str) -> std::result::Result<RenewedTokens, RefreshFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.outcome.clone()
        }
    }

    struct Fixture {
        coordinator: Arc<RefreshCoordinator>,
        store: Arc<CredentialStore>,
        ended: Arc<AtomicUsize>,
    }

    fn fixture(renewer: Arc<SlowRenewer>, refresh_token: Option<&str>) -> Fixture {
        let store = Arc::new(CredentialStore::new(
            Arc::new(MemoryStorage::new()),
            "access_token",
            "refresh_token",
        ));
        store.set("stale-access", refresh_token).unwrap();

        let terminator = Arc::new(SessionTerminator::new(store.clone()));
        terminator.activate();
        let ended = Arc::new(AtomicUsize::new(0));
        {
            let ended = ended.clone();
            terminator.subscribe(Arc::new(move |_: &SessionEnded| {
                ended.fetch_add(1, Ordering::SeqCst);
            }));
        }

        Fixture {
            coordinator: Arc::new(RefreshCoordinator::new(renewer, store.clone(), terminator)),
            store,
            ended,
        }
    }

    fn run_concurrently(coordinator: &Arc<RefreshCoordinator>, callers: usize) -> Vec<Outcome> {
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let coordinator = coordinator.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.ensure_fresh_token(Some("stale-access"))
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_concurrent_callers_share_one_renewal() {
        let renewer = SlowRenewer::ok("fresh-access", Some("rotated-refresh"));
        let f = fixture(renewer.clone(), Some("r1"));

        let outcomes = run_concurrently(&f.coordinator, 10);

        assert_eq!(renewer.calls(), 1);
        assert!(outcomes.iter().all(|o| o.as_deref() == Ok("fresh-access")));
        assert_eq!(f.store.get().unwrap().refresh_token.as_deref(), Some("rotated-refresh"));
        assert!(!f.coordinator.is_refreshing());
        assert_eq!(f.coordinator.pending(), 0);
    }

    #[test]
    fn test_renewal_without_rotation_keeps_refresh_token() {
        let renewer = SlowRenewer::ok("fresh-access", None);
        let f = fixture(renewer, Some("r1"));

        assert_eq!(f.coordinator.ensure_fresh_token(Some("stale-access")).unwrap(), "fresh-access");

        let credentials = f.store.get().unwrap();
        assert_eq!(credentials.access_token.as_deref(), Some("fresh-access"));
        assert_eq!(credentials.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn test_failed_renewal_rejects_all_and_terminates_once() {
        let renewer = SlowRenewer::failing(RefreshFailure::Rejected { status: 401 });
        let f = fixture(renewer.clone(), Some("dead-refresh"));

        let outcomes = run_concurrently(&f.coordinator, 6);

        assert_eq!(renewer.calls(), 1);
        assert!(outcomes
            .iter()
            .all(|o| *o == Err(RefreshFailure::Rejected { status: 401 })));
        assert!(f.store.get().unwrap().is_empty());
        assert_eq!(f.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transport_failure_is_terminal() {
        let renewer = SlowRenewer::failing(RefreshFailure::Transport("connection refused".into()));
        let f = fixture(renewer, Some("r1"));

        let outcome = f.coordinator.ensure_fresh_token(Some("stale-access"));

        assert!(matches!(outcome, Err(RefreshFailure::Transport(_))));
        assert!(f.store.get().unwrap().is_empty());
        assert_eq!(f.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_refresh_token_makes_no_call() {
        let renewer = SlowRenewer::ok("fresh-access", None);
        let f = fixture(renewer.clone(), None);

        assert_eq!(
            f.coordinator.ensure_fresh_token(Some("stale-access")),
            Err(RefreshFailure::NoRefreshToken)
        );
        assert_eq!(renewer.calls(), 0);
        assert_eq!(f.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_token_short_circuits_after_renewal() {
        let renewer = SlowRenewer::ok("fresh-access", None);
        let f = fixture(renewer.clone(), Some("r1"));

        f.coordinator.ensure_fresh_token(Some("stale-access")).unwrap();
        // A request that left with the old token fails after the renewal landed
        let late = f.coordinator.ensure_fresh_token(Some("stale-access")).unwrap();

        assert_eq!(late, "fresh-access");
        assert_eq!(renewer.calls(), 1);
    }

    #[test]
    fn test_queued_waiters_settle_exactly_once() {
        let renewer = SlowRenewer::ok("fresh-access", None);
        let f = fixture(renewer, Some("r1"));

        let leader = {
            let coordinator = f.coordinator.clone();
            thread::spawn(move || coordinator.ensure_fresh_token(Some("stale-access")))
        };
        while !f.coordinator.is_refreshing() {
            thread::yield_now();
        }

        let queued: Vec<_> = (0..3).map(|_| PendingRequest::new()).collect();
        {
            let mut state = f.coordinator.state.lock();
            state.waiters.extend(queued.iter().cloned());
        }

        leader.join().unwrap().unwrap();
        for pending in &queued {
            assert_eq!(pending.wait().as_deref(), Ok("fresh-access"));
            // Already settled, a second outcome is ignored
            assert!(!pending.settle(Err(RefreshFailure::Cancelled)));
        }
    }

    #[test]
    fn test_parked_callers_resolve_in_arrival_order() {
        let renewer = Arc::new(SlowRenewer {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(500),
            outcome: Ok(RenewedTokens {
                access_token: "fresh-access".to_string(),
                refresh_token: None,
            }),
        });
        let f = fixture(renewer, Some("r1"));

        let leader = {
            let coordinator = f.coordinator.clone();
            thread::spawn(move || coordinator.ensure_fresh_token(Some("stale-access")))
        };
        while !f.coordinator.is_refreshing() {
            thread::yield_now();
        }

        let mut waiters = Vec::new();
        for parked in 1..=5 {
            let coordinator = f.coordinator.clone();
            waiters.push(thread::spawn(move || {
                coordinator.ensure_fresh_token(Some("stale-access"))
            }));
            while f.coordinator.pending() < parked {
                thread::yield_now();
            }
        }
        let queued: Vec<_> = f.coordinator.state.lock().waiters.iter().cloned().collect();
        assert_eq!(queued.len(), 5);

        assert_eq!(leader.join().unwrap().as_deref(), Ok("fresh-access"));
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().as_deref(), Ok("fresh-access"));
        }

        let stamps: Vec<usize> = queued
            .iter()
            .map(|pending| pending.settled_seq.load(Ordering::SeqCst))
            .collect();
        assert!(stamps.iter().all(|&stamp| stamp > 0));
        assert!(
            stamps.windows(2).all(|pair| pair[0] < pair[1]),
            "settled out of arrival order: {:?}",
            stamps
        );
    }

    /// Storage whose first access-token read blocks until released
    struct GatedStorage {
        inner: MemoryStorage,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl CredentialStorage for GatedStorage {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, String> {
            if key == "access_token" {
                let entered = self.entered.lock().take();
                if let Some(entered) = entered {
                    entered.send(()).ok();
                    let release = self.release.lock().take();
                    if let Some(release) = release {
                        release.recv().ok();
                    }
                }
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> std::result::Result<(), String> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> std::result::Result<(), String> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_storage_read_happens_outside_state_lock() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let storage = Arc::new(GatedStorage {
            inner: MemoryStorage::new(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        storage.inner.set("access_token", "stale-access").unwrap();
        storage.inner.set("refresh_token", "r1").unwrap();

        let store = Arc::new(CredentialStore::new(storage, "access_token", "refresh_token"));
        let terminator = Arc::new(SessionTerminator::new(store.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            SlowRenewer::ok("fresh-access", None),
            store,
            terminator,
        ));

        let caller = {
            let coordinator = coordinator.clone();
            thread::spawn(move || coordinator.ensure_fresh_token(Some("stale-access")))
        };
        entered_rx.recv().unwrap();

        // The caller is blocked in storage; the state lock must still be free
        let (check_tx, check_rx) = mpsc::channel();
        {
            let coordinator = coordinator.clone();
            thread::spawn(move || check_tx.send(coordinator.is_refreshing()).ok());
        }
        let refreshing = check_rx.recv_timeout(Duration::from_secs(2));
        release_tx.send(()).unwrap();

        assert_eq!(refreshing, Ok(false));
        assert_eq!(caller.join().unwrap().as_deref(), Ok("fresh-access"));
    }

    /// Storage that logs the session out from another thread as a renewed
    /// access token is written
    struct LogoutOnWrite {
        inner: MemoryStorage,
        terminator: Mutex<Option<Arc<SessionTerminator>>>,
        logout: Mutex<Option<thread::JoinHandle<()>>>,
    }

    impl CredentialStorage for LogoutOnWrite {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> std::result::Result<(), String> {
            if key == "access_token" && value == "fresh-access" {
                let terminator = self.terminator.lock().take();
                if let Some(terminator) = terminator {
                    let handle = thread::spawn(move || {
                        terminator.terminate(EndReason::Logout).unwrap();
                    });
                    *self.logout.lock() = Some(handle);
                    thread::sleep(Duration::from_millis(100));
                }
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> std::result::Result<(), String> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_logout_racing_token_write_leaves_store_empty() {
        let storage = Arc::new(LogoutOnWrite {
            inner: MemoryStorage::new(),
            terminator: Mutex::new(None),
            logout: Mutex::new(None),
        });
        let store = Arc::new(CredentialStore::new(
            storage.clone(),
            "access_token",
            "refresh_token",
        ));
        store.set("stale-access", Some("r1")).unwrap();
        let terminator = Arc::new(SessionTerminator::new(store.clone()));
        terminator.activate();
        *storage.terminator.lock() = Some(terminator.clone());

        let coordinator = RefreshCoordinator::new(
            SlowRenewer::ok("fresh-access", Some("rotated")),
            store.clone(),
            terminator.clone(),
        );

        let outcome = coordinator.ensure_fresh_token(Some("stale-access"));
        let logout = storage.logout.lock().take();
        logout.unwrap().join().unwrap();

        // The write lands before the logout clears the store, or not at all
        assert!(matches!(outcome, Ok(_) | Err(RefreshFailure::Cancelled)));
        assert!(store.get().unwrap().is_empty());
        assert!(store.access_token().unwrap().is_none());
        assert!(!terminator.is_active());
    }

    #[test]
    fn test_cancel_pending_releases_waiters() {
        let renewer = Arc::new(SlowRenewer {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(500),
            outcome: Ok(RenewedTokens {
                access_token: "fresh-access".to_string(),
                refresh_token: None,
            }),
        });
        let f = fixture(renewer, Some("r1"));

        let leader = {
            let coordinator = f.coordinator.clone();
            thread::spawn(move || coordinator.ensure_fresh_token(Some("stale-access")))
        };
        while !f.coordinator.is_refreshing() {
            thread::yield_now();
        }

        let waiter = {
            let coordinator = f.coordinator.clone();
            thread::spawn(move || coordinator.ensure_fresh_token(Some("stale-access")))
        };
        while f.coordinator.pending() == 0 {
            thread::yield_now();
        }

        assert_eq!(f.coordinator.cancel_pending(), 1);
        assert_eq!(waiter.join().unwrap(), Err(RefreshFailure::Cancelled));

        // The leader itself still completes
        assert_eq!(leader.join().unwrap().as_deref(), Ok("fresh-access"));
    }

    #[test]
    fn test_logout_during_renewal_discards_tokens() {
        let renewer = SlowRenewer::ok("fresh-access", Some("rotated"));
        let f = fixture(renewer, Some("r1"));

        let leader = {
            let coordinator = f.coordinator.clone();
            thread::spawn(move || coordinator.ensure_fresh_token(Some("stale-access")))
        };
        while !f.coordinator.is_refreshing() {
            thread::yield_now();
        }
        f.coordinator.terminator.terminate(EndReason::Logout).unwrap();

        assert_eq!(leader.join().unwrap(), Err(RefreshFailure::Cancelled));
        assert!(f.store.get().unwrap().is_empty());
    }

    #[test]
    fn test_cross_process_lock_adopts_renewed_token() {
        let dir = std::env::temp_dir().join(format!("tokenrelay_locks_{}", rand::random::<u32>()));
        let manager = RefreshLockManager::new(dir.clone()).unwrap();
        let renewer = SlowRenewer::ok("fresh-access", None);

        let store = Arc::new(CredentialStore::new(
            Arc::new(MemoryStorage::new()),
            "access_token",
            "refresh_token",
        ));
        store.set("stale-access", Some("r1")).unwrap();
        let terminator = Arc::new(SessionTerminator::new(store.clone()));
        terminator.activate();
        let coordinator = RefreshCoordinator::new(renewer.clone(), store.clone(), terminator)
            .with_cross_process_lock(manager.clone(), "api.example.com:student");

        // Another process holds the lock and renews in the meantime
        let other = manager.acquire("api.example.com:student").unwrap();
        let handle = thread::spawn(move || coordinator.ensure_fresh_token(Some("stale-access")));
        thread::sleep(Duration::from_millis(100));
        store.set("renewed-elsewhere", None).unwrap();
        drop(other);

        assert_eq!(handle.join().unwrap().as_deref(), Ok("renewed-elsewhere"));
        assert_eq!(renewer.calls(), 0);
        assert_eq!(store.access_token().unwrap().as_deref(), Some("renewed-elsewhere"));

        std::fs::remove_dir_all(dir).ok();
    }
}
