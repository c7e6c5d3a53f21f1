//! Durable client storage
//!
//! A small synchronous key/value store standing in for browser local
//! storage. The session lives under [`AUTH_STORAGE_KEY`] as a JSON blob
//! `{"state": {"user", "token", "isAuthenticated"}, "version"}`; older
//! clients wrote a bare token under [`LEGACY_TOKEN_KEY`], which is still
//! read as a fallback.

use abroad_core::User;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Key of the persisted session blob
pub const AUTH_STORAGE_KEY: &str = "auth-storage";

/// Key of the plain token written by older clients
pub const LEGACY_TOKEN_KEY: &str = "auth_token";

const PERSIST_VERSION: u32 = 0;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupted entry {key}: {message}")]
    Corrupted { key: String, message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Synchronous key/value storage that survives restarts
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// Persisted session layout
// ============================================================================

/// Persisted subset of the session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_authenticated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedBlob {
    state: PersistedState,
    #[serde(default)]
    version: u32,
}

/// Read the persisted session, falling back to the legacy token key
///
/// Returns `Ok(None)` when nothing is stored. A blob that does not parse is
/// reported as [`StorageError::Corrupted`].
pub fn read_session(storage: &dyn SessionStorage) -> Result<Option<PersistedState>, StorageError> {
    let mut state = match storage.get(AUTH_STORAGE_KEY)? {
        Some(raw) => {
            let blob: PersistedBlob =
                serde_json::from_str(&raw).map_err(|e| StorageError::Corrupted {
                    key: AUTH_STORAGE_KEY.to_string(),
                    message: e.to_string(),
                })?;
            Some(blob.state)
        }
        None => None,
    };

    let has_token = state.as_ref().is_some_and(|s| s.token.is_some());
    if !has_token {
        if let Some(legacy) = storage.get(LEGACY_TOKEN_KEY)? {
            let legacy = legacy.trim().to_string();
            if !legacy.is_empty() {
                tracing::debug!("Using token from legacy storage key");
                state.get_or_insert_with(PersistedState::default).token = Some(legacy);
            }
        }
    }

    Ok(state)
}

/// Persist the session blob
pub fn write_session(
    storage: &dyn SessionStorage,
    state: &PersistedState,
) -> Result<(), StorageError> {
    let blob = PersistedBlob {
        state: state.clone(),
        version: PERSIST_VERSION,
    };
    storage.set(AUTH_STORAGE_KEY, &serde_json::to_string(&blob)?)
}

/// Remove every trace of the session, including the legacy key
pub fn clear_session(storage: &dyn SessionStorage) -> Result<(), StorageError> {
    storage.remove(AUTH_STORAGE_KEY)?;
    storage.remove(LEGACY_TOKEN_KEY)
}

// ============================================================================
// In-memory storage
// ============================================================================

/// Volatile storage, used by tests and one-shot processes
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

// ============================================================================
// File storage
// ============================================================================

/// All keys in one JSON object file
///
/// Every call re-reads the file so concurrent CLI invocations observe each
/// other's writes. Writes go through a temporary file and a rename.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding unreadable storage file");
                Ok(BTreeMap::new())
            }
        }
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?).map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error(e))?;
        }

        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        let mut map = self.load()?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.save(&map)?;
        }
        Ok(())
    }
}
