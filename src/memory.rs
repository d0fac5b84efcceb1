//! Per-session conversation memory.
//!
//! A [`ConversationMemory`] holds the ordered message logs of the sessions
//! it has opened, each tied to the JSON file it was loaded from.
//! [`append`](ConversationMemory::append) only touches memory;
//! [`persist`](ConversationMemory::persist) atomically rewrites the whole
//! file. A history file that does not exist loads as an empty log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use docchat_core::models::{ChatHistory, Role};
use docchat_core::{Error, Result};
use tracing::{debug, warn};

use crate::persist;

/// Whether [`load`] found the history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Found,
    /// The file was absent; an empty log was returned instead.
    Missing,
}

/// File name used for a session's history inside the histories directory.
///
/// `"Trip Planning"` → `"Trip_Planning_history.json"`.
pub fn history_file_name(session_id: &str) -> String {
    format!("{}_history.json", session_id.replace(' ', "_"))
}

/// Reject session ids that would not map to a plain file name inside the
/// histories directory.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let invalid = session_id.trim().is_empty()
        || session_id.contains(&['/', '\\', '\0'][..])
        || session_id.contains("..");
    if invalid {
        return Err(Error::InvalidSessionName(session_id.to_string()));
    }
    Ok(())
}

/// Read a history file.
///
/// A missing file is not an error: the log comes back empty with
/// [`LoadStatus::Missing`] and a warning is logged.
pub async fn load(path: &Path) -> Result<(ChatHistory, LoadStatus)> {
    match persist::read_json::<ChatHistory>(path).await? {
        Some(history) => Ok((history, LoadStatus::Found)),
        None => {
            warn!(
                "{}; starting with an empty history",
                Error::MissingHistoryFile(path.to_path_buf())
            );
            Ok((ChatHistory::new(), LoadStatus::Missing))
        }
    }
}

#[derive(Debug)]
struct SessionLog {
    path: PathBuf,
    history: ChatHistory,
}

#[derive(Debug)]
pub struct ConversationMemory {
    histories_dir: PathBuf,
    sessions: HashMap<String, SessionLog>,
}

impl ConversationMemory {
    /// Sessions created through [`get_or_create`](Self::get_or_create) get
    /// their file under `histories_dir`.
    pub fn new(histories_dir: impl Into<PathBuf>) -> Self {
        Self {
            histories_dir: histories_dir.into(),
            sessions: HashMap::new(),
        }
    }

    /// Load `session_id` from `path`, replacing anything held for it.
    pub async fn open(&mut self, session_id: &str, path: &Path) -> Result<LoadStatus> {
        let (history, status) = load(path).await?;
        debug!(session = session_id, messages = history.len(), "session loaded");
        self.sessions.insert(
            session_id.to_string(),
            SessionLog {
                path: path.to_path_buf(),
                history,
            },
        );
        Ok(status)
    }

    /// The session's log, creating an empty one if it is not held yet.
    pub fn get_or_create(&mut self, session_id: &str) -> &ChatHistory {
        let histories_dir = &self.histories_dir;
        &self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionLog {
                path: histories_dir.join(history_file_name(session_id)),
                history: ChatHistory::new(),
            })
            .history
    }

    /// Add one message in memory. Nothing is written to disk.
    pub fn append(&mut self, session_id: &str, role: Role, content: impl Into<String>) -> Result<()> {
        let log = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
        log.history.push(role, content);
        Ok(())
    }

    pub fn history(&self, session_id: &str) -> Option<&ChatHistory> {
        self.sessions.get(session_id).map(|log| &log.history)
    }

    /// Backing file of a held session.
    pub fn path(&self, session_id: &str) -> Option<&Path> {
        self.sessions.get(session_id).map(|log| log.path.as_path())
    }

    /// Overwrite the session's file with its full in-memory log.
    ///
    /// On failure the previous file content is left in place.
    pub async fn persist(&self, session_id: &str) -> Result<()> {
        let log = self
            .sessions
            .get(session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
        persist::write_json(&log.path, &log.history).await?;
        debug!(session = session_id, messages = log.history.len(), "session persisted");
        Ok(())
    }

    /// Stop holding a session. Its file is not touched.
    pub fn forget(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }
}
