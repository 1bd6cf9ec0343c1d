//! Session credential persistence.

use crate::error::{LedgerError, Result};
use crate::types::SessionToken;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Keeps the session token across restarts so the backend can hand back
/// the same identity.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionToken>>;
    fn save(&self, token: &SessionToken) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Process-lifetime store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<SessionToken>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<SessionToken>> {
        Ok(self.token.lock().clone())
    }

    fn save(&self, token: &SessionToken) -> Result<()> {
        *self.token.lock() = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock() = None;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CredentialFile {
    auth_token: SessionToken,
}

/// JSON file store. Writes go to a sibling temp file and are renamed into
/// place.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<SessionToken>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: CredentialFile = serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::Credentials(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(file.auth_token))
    }

    fn save(&self, token: &SessionToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec(&CredentialFile {
            auth_token: token.clone(),
        })?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
