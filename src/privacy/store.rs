//! Secure store boundary
//!
//! The core never writes plaintext: callers seal through the kernel and hand
//! opaque bytes to a [`SecureStore`]. Hosts plug in their own store; the
//! two implementations here cover tests and single-user desktops.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{AgentError, Result};

/// Opaque blob storage for sealed payloads
pub trait SecureStore: Send + Sync {
    fn put(&self, name: &str, sealed: &[u8]) -> Result<()>;
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStore for MemoryStore {
    fn put(&self, name: &str, sealed: &[u8]) -> Result<()> {
        self.blobs.write().insert(name.to_string(), sealed.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(name).cloned())
    }
}

/// One base64 file per blob under a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create) a store directory
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store under the platform data dir (~/.local/share/athenos on Linux)
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("athenos");
        Self::new(dir)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(AgentError::Config(format!("invalid blob name '{}'", name)));
        }
        Ok(self.dir.join(format!("{}.sealed", name)))
    }
}

impl SecureStore for FileStore {
    fn put(&self, name: &str, sealed: &[u8]) -> Result<()> {
        let path = self.path_for(name)?;

        // Write atomically via temp file
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, BASE64.encode(sealed))?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| AgentError::DecryptionFailed(format!("corrupted blob '{}': {}", name, e)))?;
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store.get("ledger").unwrap().is_none());
        store.put("ledger", &[1, 2, 3, 255]).unwrap();
        assert_eq!(store.get("ledger").unwrap(), Some(vec![1, 2, 3, 255]));
    }

    #[test]
    fn test_file_store_rejects_path_names() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.put("../escape", b"x").is_err());
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("ledger.sealed"), "!!not base64!!").unwrap();
        assert!(matches!(store.get("ledger"), Err(AgentError::DecryptionFailed(_))));
    }
}
