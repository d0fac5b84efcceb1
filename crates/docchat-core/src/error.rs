//! Error taxonomy shared by every docchat component.
//!
//! Only [`Error::MissingHistoryFile`] is ever recovered locally (a missing
//! session file loads as an empty log). Everything else propagates to the
//! component boundary so callers can match on the variant.

use std::path::PathBuf;

/// Result alias used across the docchat crates.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `add` was called with a document name already in the manifest.
    #[error("a document named '{0}' already exists")]
    DuplicateDocument(String),

    /// `delete` (or any lookup) referenced a name absent from the manifest.
    #[error("unknown document '{0}'")]
    UnknownDocument(String),

    /// A chat with this session id is already registered.
    #[error("a chat named '{0}' already exists")]
    DuplicateSession(String),

    /// A session id that cannot be mapped to a history file name.
    #[error("invalid chat name '{0}': must be non-empty and contain no path separators or '..'")]
    InvalidSessionName(String),

    /// No chat with this session id is registered or loaded.
    #[error("unknown chat '{0}'")]
    UnknownSession(String),

    /// A session history file does not exist on disk.
    #[error("history file not found: {}", .0.display())]
    MissingHistoryFile(PathBuf),

    /// One or more provider credentials are absent or empty.
    #[error("missing credential(s): {}", .0.join(", "))]
    MissingCredential(Vec<String>),

    /// The embedding or generation capability failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The vector index rejected an insert, delete, or search.
    #[error("vector index error: {0}")]
    Index(String),

    /// Writing (or reading) a backing file failed.
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A backing file exists but does not contain the expected JSON.
    #[error("corrupt file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration or prompt template.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn generation(err: impl std::fmt::Display) -> Self {
        Error::Generation(err.to_string())
    }

    /// True for errors raised by the upstream embedding/generation services.
    pub fn is_generation_failure(&self) -> bool {
        matches!(self, Error::Generation(_))
    }

    /// True when a turn was generated but could not be written to disk.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Error::Persistence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_lists_every_key() {
        let err = Error::MissingCredential(vec![
            "COHERE_API_KEY".to_string(),
            "GOOGLE_API_KEY".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "missing credential(s): COHERE_API_KEY, GOOGLE_API_KEY"
        );
    }

    #[test]
    fn test_classification_helpers() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(Error::persistence("/tmp/x.json", io).is_persistence_failure());
        assert!(Error::generation("timeout").is_generation_failure());
        assert!(!Error::UnknownDocument("a".into()).is_generation_failure());
    }
}
