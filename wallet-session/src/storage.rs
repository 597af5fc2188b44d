// wallet-session/src/storage.rs
use common::PersistedSession;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::StorageError;

/// Where the `{address, token, walletKind}` triple lives between runs.
///
/// Implementations write and clear the three entries as a unit; `load` only
/// returns a session when all three are present.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>, StorageError>;

    fn save(&self, session: &PersistedSession) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;

    /// Bearer token for authenticated API calls
    fn token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.map(|s| s.auth_token))
    }
}

/// Process-local store, the default for tests and short-lived tools
#[derive(Debug, Default)]
pub struct MemoryStore {
    entry: Mutex<Option<PersistedSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self { entry: Mutex::new(Some(session)) }
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        Ok(self.entry.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<(), StorageError> {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

// On-disk layout; entries are optional so a hand-edited file with a missing
// key reads as "no session" instead of an error
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEntries {
    #[serde(rename = "walletAccount", default)]
    wallet_address: Option<String>,
    #[serde(rename = "authToken", default)]
    auth_token: Option<String>,
    #[serde(rename = "walletType", default)]
    wallet_kind: Option<String>,
}

/// JSON file store. Writes go through a sibling temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, contents)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entries: StoredEntries = serde_json::from_slice(&raw)?;
        match (entries.wallet_address, entries.auth_token, entries.wallet_kind) {
            (Some(wallet_address), Some(auth_token), Some(wallet_kind))
                if !wallet_address.is_empty() && !auth_token.is_empty() =>
            {
                Ok(Some(PersistedSession { wallet_address, auth_token, wallet_kind }))
            },
            _ => {
                tracing::debug!("Session file {} is incomplete, ignoring", self.path.display());
                Ok(None)
            },
        }
    }

    fn save(&self, session: &PersistedSession) -> Result<(), StorageError> {
        let entries = StoredEntries {
            wallet_address: Some(session.wallet_address.clone()),
            auth_token: Some(session.auth_token.clone()),
            wallet_kind: Some(session.wallet_kind.clone()),
        };
        let json = serde_json::to_vec_pretty(&entries)?;
        self.write_atomic(&json)?;
        tracing::debug!("Session persisted to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
