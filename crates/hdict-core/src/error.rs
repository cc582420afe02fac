use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A single key that could not be written during a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFailure {
    pub key: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum HdictError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Key not found: '{0}'")]
    KeyNotFound(String),

    #[error("Cannot {action} a read-only key '{key}'")]
    ReadOnlyKey { key: String, action: &'static str },

    #[error("Cannot {0}: container is opened in read mode")]
    ModeViolation(String),

    #[error("Key '{0}' already exists in the file and append mode does not rewrite existing keys")]
    AppendConflict(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Index {index:?} out of bounds for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    #[error("Container is closed")]
    Closed,

    #[error("Cannot patch '{path}' in place: {reason}")]
    Unpatchable { path: String, reason: String },

    #[error("File is locked by another writer: {0}")]
    FileLocked(PathBuf),

    #[error("File already exists: {0} (open in overwrite mode to replace it)")]
    FileExists(PathBuf),

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Save failed for {} key(s): {}", .0.len(), describe_failures(.0))]
    SaveFailed(Vec<SaveFailure>),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl HdictError {
    /// Keys that failed to save, if this is an aggregate save error.
    pub fn failed_keys(&self) -> Vec<&str> {
        match self {
            HdictError::SaveFailed(failures) => failures.iter().map(|f| f.key.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

fn describe_failures(failures: &[SaveFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("'{}' ({})", f.key, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, HdictError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_message_names_key() {
        let err = HdictError::ReadOnlyKey {
            key: "alpha".into(),
            action: "set",
        };
        assert_eq!(err.to_string(), "Cannot set a read-only key 'alpha'");
    }

    #[test]
    fn test_save_failed_lists_every_key() {
        let err = HdictError::SaveFailed(vec![
            SaveFailure {
                key: "a".into(),
                reason: "disk full".into(),
            },
            SaveFailure {
                key: "b/c".into(),
                reason: "disk full".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("Save failed for 2 key(s)"));
        assert!(msg.contains("'a'"));
        assert!(msg.contains("'b/c'"));
        assert_eq!(err.failed_keys(), vec!["a", "b/c"]);
    }
}
