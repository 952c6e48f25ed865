/// Cross-process locking for credential renewal
use crate::error::Result;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

/// Hands out exclusive file locks keyed by session
///
/// Processes sharing one credential storage (several CLI invocations, a
/// daemon and its clients) take the same lock around a renewal so that only
/// one of them spends the refresh token.
#[derive(Debug, Clone)]
pub struct RefreshLockManager {
    lock_dir: PathBuf,
}

impl RefreshLockManager {
    pub fn new(lock_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&lock_dir)?;
        Ok(Self { lock_dir })
    }

    /// Lock manager under the runtime directory for an application
    ///
    /// Uses `$XDG_RUNTIME_DIR` when set, the temp directory otherwise.
    pub fn for_app(app_name: &str) -> Result<Self> {
        let base = match std::env::var("XDG_RUNTIME_DIR") {
            Ok(runtime_dir) => PathBuf::from(runtime_dir).join("tokenrelay-locks"),
            Err(_) => std::env::temp_dir().join("tokenrelay-locks"),
        };
        Self::new(base.join(app_name))
    }

    /// Block until the lock for `key` is held
    ///
    /// Released when the returned guard is dropped.
    pub fn acquire(&self, key: &str) -> Result<RefreshLock> {
        let file = self.open(key)?;
        file.lock_exclusive()?;
        Ok(RefreshLock { file })
    }

    fn open(&self, key: &str) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path(key))?)
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.lock_dir.join(format!("{}.lock", safe_key))
    }
}

/// RAII guard for a held refresh lock
///
/// The lock file itself is left in place: unlinking it while another process
/// waits on it would let a third process lock a fresh inode concurrently.
#[derive(Debug)]
pub struct RefreshLock {
    file: File,
}

impl Drop for RefreshLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
