//! Chat creation, deletion, and lookup.
//!
//! [`ChatDirectory`] owns the [`SessionPathRegistry`] and the histories
//! directory. Creating a chat writes an empty history file and registers
//! it; deleting one unregisters it and removes the file. Either way the
//! registry file is rewritten before the call returns.

use std::path::{Path, PathBuf};

use docchat_core::models::ChatHistory;
use docchat_core::{Error, Result};
use tracing::{info, warn};

use crate::config::PathsConfig;
use crate::memory::{history_file_name, validate_session_id, ConversationMemory, LoadStatus};
use crate::persist;
use crate::registry::{RegistryEntry, SessionPathRegistry};

pub struct ChatDirectory {
    histories_dir: PathBuf,
    registry: SessionPathRegistry,
}

impl ChatDirectory {
    pub async fn open(paths: &PathsConfig) -> Result<Self> {
        Ok(Self {
            histories_dir: paths.chat_histories.clone(),
            registry: SessionPathRegistry::load(&paths.registry).await?,
        })
    }

    /// Create an empty chat named `name` and return its history path.
    ///
    /// Fails with [`Error::DuplicateSession`] if the name is taken, or if
    /// its history file is already owned by another chat or exists on disk
    /// (`"a b"` and `"a_b"` share a file name).
    pub async fn create(&mut self, name: &str) -> Result<PathBuf> {
        validate_session_id(name)?;
        if self.registry.get(name).is_some() {
            return Err(Error::DuplicateSession(name.to_string()));
        }
        let path = self.histories_dir.join(history_file_name(name));
        if let Some(owner) = self.registry.entries().iter().find(|e| e.path == path) {
            warn!(chat = name, owner = %owner.session_id, "history file already in use");
            return Err(Error::DuplicateSession(name.to_string()));
        }
        let on_disk = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::persistence(&path, e))?;
        if on_disk {
            warn!(chat = name, path = %path.display(), "history file already exists");
            return Err(Error::DuplicateSession(name.to_string()));
        }
        persist::write_json(&path, &ChatHistory::new()).await?;

        let previous = self.registry.clone();
        self.registry.register(name, &path)?;
        if let Err(e) = self.registry.persist().await {
            self.registry = previous;
            remove_history_file(&path).await;
            return Err(e);
        }

        info!(chat = name, path = %path.display(), "chat created");
        Ok(path)
    }

    /// Remove chat `name` and its history file.
    pub async fn delete(&mut self, name: &str) -> Result<()> {
        let previous = self.registry.clone();
        let entry = self.registry.unregister(name)?;
        if let Err(e) = self.registry.persist().await {
            self.registry = previous;
            return Err(e);
        }
        remove_history_file(&entry.path).await;
        info!(chat = name, "chat deleted");
        Ok(())
    }

    /// Chats in creation order.
    pub fn list(&self) -> &[RegistryEntry] {
        self.registry.entries()
    }

    /// Chat to use when the caller does not name one.
    pub fn latest(&self) -> Option<&RegistryEntry> {
        self.registry.latest()
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.registry.get(name)
    }

    /// Load chat `name` into a fresh [`ConversationMemory`].
    pub async fn open_memory(&self, name: &str) -> Result<(ConversationMemory, LoadStatus)> {
        let path = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownSession(name.to_string()))?;
        let mut memory = ConversationMemory::new(&self.histories_dir);
        let status = memory.open(name, path).await?;
        Ok((memory, status))
    }
}

async fn remove_history_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove history file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(root: &Path) -> PathsConfig {
        PathsConfig {
            manifest: root.join("files.json"),
            chat_histories: root.join("chats"),
            registry: root.join("chat_paths.json"),
            index: root.join("index"),
        }
    }

    #[tokio::test]
    async fn test_create_and_delete_chat() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(tmp.path());
        let mut chats = ChatDirectory::open(&paths).await.unwrap();

        let path = chats.create("Trip Planning").await.unwrap();
        assert_eq!(path, paths.chat_histories.join("Trip_Planning_history.json"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");

        let reopened = ChatDirectory::open(&paths).await.unwrap();
        assert_eq!(reopened.list().len(), 1);
        assert_eq!(reopened.path("Trip Planning"), Some(path.as_path()));

        chats.delete("Trip Planning").await.unwrap();
        assert!(!path.exists());
        assert!(chats.list().is_empty());
        let reopened = ChatDirectory::open(&paths).await.unwrap();
        assert!(reopened.list().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(tmp.path());
        let mut chats = ChatDirectory::open(&paths).await.unwrap();
        let path = chats.create("a").await.unwrap();
        std::fs::write(&path, r#"[{"role":"human","content":"hi"}]"#).unwrap();

        assert!(matches!(
            chats.create("a").await,
            Err(Error::DuplicateSession(_))
        ));
        assert!(std::fs::read_to_string(&path).unwrap().contains("hi"));
        assert_eq!(chats.list().len(), 1);
    }

    #[tokio::test]
    async fn test_names_sharing_a_history_file_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(tmp.path());
        let mut chats = ChatDirectory::open(&paths).await.unwrap();
        let path = chats.create("a b").await.unwrap();
        std::fs::write(&path, r#"[{"role":"human","content":"precious"}]"#).unwrap();

        assert!(matches!(
            chats.create("a_b").await,
            Err(Error::DuplicateSession(ref n)) if n == "a_b"
        ));
        assert!(std::fs::read_to_string(&path).unwrap().contains("precious"));
        assert_eq!(chats.list().len(), 1);
        assert!(chats.path("a_b").is_none());

        // Deleting the survivor still removes only its own file.
        chats.delete("a b").await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unregistered_file_on_disk_is_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(tmp.path());
        let mut chats = ChatDirectory::open(&paths).await.unwrap();
        std::fs::create_dir_all(&paths.chat_histories).unwrap();
        let stray = paths.chat_histories.join("old_history.json");
        std::fs::write(&stray, r#"[{"role":"ai","content":"kept"}]"#).unwrap();

        assert!(matches!(
            chats.create("old").await,
            Err(Error::DuplicateSession(_))
        ));
        assert!(std::fs::read_to_string(&stray).unwrap().contains("kept"));
        assert!(chats.list().is_empty());
    }

    #[tokio::test]
    async fn test_names_escaping_the_histories_dir_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(tmp.path());
        let mut chats = ChatDirectory::open(&paths).await.unwrap();

        for name in ["../escape", "nested/chat", ""] {
            assert!(matches!(
                chats.create(name).await,
                Err(Error::InvalidSessionName(_))
            ));
        }
        assert!(!tmp.path().join("escape_history.json").exists());
        assert!(chats.list().is_empty());
        assert!(!paths.registry.exists());
    }

    #[tokio::test]
    async fn test_delete_unknown_and_missing_file() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(tmp.path());
        let mut chats = ChatDirectory::open(&paths).await.unwrap();
        assert!(matches!(
            chats.delete("ghost").await,
            Err(Error::UnknownSession(_))
        ));

        let path = chats.create("b").await.unwrap();
        std::fs::remove_file(&path).unwrap();
        chats.delete("b").await.unwrap();
        assert!(chats.list().is_empty());
    }

    #[tokio::test]
    async fn test_open_memory_for_missing_file() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(tmp.path());
        let mut chats = ChatDirectory::open(&paths).await.unwrap();
        let path = chats.create("c").await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let (memory, status) = chats.open_memory("c").await.unwrap();
        assert_eq!(status, LoadStatus::Missing);
        assert!(memory.history("c").unwrap().is_empty());
        assert!(chats.latest().is_some());
    }
}
