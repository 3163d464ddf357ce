//! Durable key/value persistence for session credentials.
//!
//! Pure storage: no validation, no network. [`SessionService`] is the only
//! writer; everything else reads session state through it.
//!
//! [`SessionService`]: crate::session::SessionService

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Token store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Token store lock poisoned")]
    Poisoned,
}

/// Keys held by a [`TokenStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    /// Id of the last user whose profile was loaded with the stored token.
    UserId,
}

/// Key/value persistence for the access token, refresh token and session flags.
///
/// Absence of any key is a valid state (anonymous session).
pub trait TokenStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError>;

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError>;

    /// Remove every key.
    fn clear(&self) -> Result<(), StoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store. Used by tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<BTreeMap<StoreKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with an access/refresh pair.
    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(StoreKey::AccessToken, access.to_string());
        entries.insert(StoreKey::RefreshToken, refresh.to_string());
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// True when no key is present.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().map(|e| e.is_empty()).unwrap_or(false)
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key, value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.clear();
        Ok(())
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// JSON file store, one object keyed by [`StoreKey`].
///
/// Writes go to a sibling temp file first and are renamed into place. The
/// file is removed once the last key is cleared.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Default location: `<data_dir>/stardust/session.json`.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stardust")
            .join("session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<StoreKey, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<StoreKey, String>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "token store saved");
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.load()?.remove(&key))
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.load()?;
        entries.insert(key, value.to_string());
        self.save(&entries)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.save(&BTreeMap::new())
    }
}
