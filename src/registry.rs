//! Session path registry.
//!
//! Maps each chat session id to the file holding its history. The registry
//! is itself a JSON file (an array of `{session_id, path}` objects, in
//! creation order) written with the same atomic replace as the histories.
//!
//! ```json
//! [
//!     {
//!         "session_id": "Trip Planning",
//!         "path": "data/chats/Trip_Planning_history.json"
//!     }
//! ]
//! ```

use std::path::{Path, PathBuf};

use docchat_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::persist;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub session_id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SessionPathRegistry {
    file: PathBuf,
    entries: Vec<RegistryEntry>,
}

impl SessionPathRegistry {
    /// Empty registry that will persist to `file`.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            entries: Vec::new(),
        }
    }

    /// Read the registry file; a missing file is an empty registry.
    pub async fn load(file: &Path) -> Result<Self> {
        let entries = persist::read_json(file).await?.unwrap_or_default();
        Ok(Self {
            file: file.to_path_buf(),
            entries,
        })
    }

    /// Record `session_id → path`. Fails if the id is already registered.
    pub fn register(&mut self, session_id: &str, path: impl Into<PathBuf>) -> Result<()> {
        if self.get(session_id).is_some() {
            return Err(Error::DuplicateSession(session_id.to_string()));
        }
        self.entries.push(RegistryEntry {
            session_id: session_id.to_string(),
            path: path.into(),
        });
        Ok(())
    }

    /// Drop the entry for `session_id` and return it.
    pub fn unregister(&mut self, session_id: &str) -> Result<RegistryEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.session_id == session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
        Ok(self.entries.remove(pos))
    }

    pub fn get(&self, session_id: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|e| e.session_id == session_id)
            .map(|e| e.path.as_path())
    }

    /// Entries in creation order.
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Most recently registered session.
    pub fn latest(&self) -> Option<&RegistryEntry> {
        self.entries.last()
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub async fn persist(&self) -> Result<()> {
        persist::write_json(&self.file, &self.entries).await
    }
}
