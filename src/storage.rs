/// Credential persistence backends
use keyring::Entry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Durable key-value medium for credentials
///
/// The session manager only needs `get`/`set`/`remove` on a couple of string
/// keys. Errors are plain strings describing the medium failure.
pub trait CredentialStorage: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>, String>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), String>;

    /// Remove a value; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), String>;
}

/// In-memory storage implementation
///
/// Thread-safe, does not survive restarts. Suitable for tests and for
/// sessions that should die with the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// File-based storage using XDG conventions
///
/// All values live in one JSON object at `<data_dir>/<app_name>/credentials.json`.
/// Writes go through a process-local lock; cross-process writers are
/// serialized by the refresh lock.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
    write_lock: Arc<RwLock<()>>,
}

impl FileStorage {
    /// Create a file storage for an application
    ///
    /// Checks `$XDG_DATA_HOME` first, then falls back to the platform data
    /// directory (`~/.local/share` on Linux, AppData on Windows).
    ///
    /// # Example
    ///
    /// ```
    /// use tokenrelay::storage::FileStorage;
    ///
    /// let storage = FileStorage::new("my-app").unwrap();
    /// ```
    pub fn new(app_name: &str) -> Result<Self, String> {
        let base_dir = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg_data)
        } else {
            dirs::data_dir().ok_or_else(|| "Could not determine data directory".to_string())?
        };

        Self::with_path(base_dir.join(app_name))
    }

    /// Create a file storage rooted at a custom directory
    pub fn with_path(path: PathBuf) -> Result<Self, String> {
        fs::create_dir_all(&path)
            .map_err(|e| format!("Failed to create storage directory: {}", e))?;

        Ok(Self {
            base_path: path,
            write_lock: Arc::new(RwLock::new(())),
        })
    }

    fn credentials_path(&self) -> PathBuf {
        self.base_path.join("credentials.json")
    }

    fn load(&self) -> Result<HashMap<String, String>, String> {
        let path = self.credentials_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read credentials file: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse credentials: {}", e))
    }

    fn save(&self, values: &HashMap<String, String>) -> Result<(), String> {
        let content = serde_json::to_string_pretty(values)
            .map_err(|e| format!("Failed to serialize credentials: {}", e))?;

        fs::write(self.credentials_path(), content)
            .map_err(|e| format!("Failed to write credentials file: {}", e))
    }
}

impl CredentialStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let _guard = self.write_lock.read();
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let _guard = self.write_lock.write();
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let _guard = self.write_lock.write();
        let mut values = self.load()?;
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}

/// Secure storage using the OS credential manager
///
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service API (libsecret)
#[derive(Debug, Clone)]
pub struct SecureStorage {
    service: String,
}

impl SecureStorage {
    /// Create a secure storage whose keyring service is `tokenrelay-<app_name>`
    pub fn new(app_name: &str) -> Self {
        Self {
            service: format!("tokenrelay-{}", app_name),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, String> {
        Entry::new(&self.service, key).map_err(|e| format!("Failed to create keyring entry: {}", e))
    }
}

impl CredentialStorage for SecureStorage {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(format!("Failed to read from keyring: {}", e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| format!("Failed to save to keyring: {}", e))
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(format!("Failed to delete from keyring: {}", e)),
        }
    }
}
