use crate::config::store::StoreConfig;
use crate::error::{HdictError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How the backing file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// The file must exist; nothing may be modified.
    #[default]
    Read,
    /// Create a new file. Refuses to touch an existing one.
    Write,
    /// Open an existing file (or create it) and add to it.
    Append,
    /// Create the file, truncating whatever is there.
    Overwrite,
}

impl OpenMode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::Append => "a",
            OpenMode::Overwrite => "o",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenMode {
    type Err = HdictError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write" => Ok(OpenMode::Write),
            "a" | "append" => Ok(OpenMode::Append),
            "o" | "overwrite" => Ok(OpenMode::Overwrite),
            other => Err(HdictError::Config(format!("unknown open mode '{other}'"))),
        }
    }
}

/// What append mode does when a key that already existed in the file at open
/// time is assigned or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppendPolicy {
    /// Replace the stored value (default).
    #[default]
    Overwrite,
    /// Fail with `AppendConflict`; only new keys may be written.
    Reject,
}

/// What happens to unsaved changes when a container is closed or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClosePolicy {
    /// Save every dirty key before releasing the file (default).
    #[default]
    Flush,
    /// Release the file and log a warning naming every unsaved key.
    Warn,
}

/// Configuration for a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Path of the backing file. `None` keeps the container purely in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Open mode (default: read)
    #[serde(default)]
    pub mode: OpenMode,

    /// Load every value while opening (default: true)
    ///
    /// When disabled only the key index is read and values are materialized
    /// on first access.
    #[serde(default = "default_true")]
    pub open_on_init: bool,

    /// Write every mutation through to the file immediately (default: false)
    #[serde(default)]
    pub save_on_edit: bool,

    /// Behaviour of append mode on pre-existing keys (default: overwrite)
    #[serde(default)]
    pub append_policy: AppendPolicy,

    /// Behaviour on close with unsaved changes (default: flush)
    #[serde(default)]
    pub close_policy: ClosePolicy,

    /// Distinct dirty regions tracked per array before they are collapsed
    /// into their bounding region (default: 64)
    #[serde(default = "default_max_regions")]
    pub max_regions_per_key: usize,

    /// File store options
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            path: None,
            mode: OpenMode::default(),
            open_on_init: default_true(),
            save_on_edit: false,
            append_policy: AppendPolicy::default(),
            close_policy: ClosePolicy::default(),
            max_regions_per_key: default_max_regions(),
            store: StoreConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_regions() -> usize {
    64
}

impl ContainerConfig {
    pub fn new(path: impl Into<PathBuf>, mode: OpenMode) -> Self {
        Self {
            path: Some(path.into()),
            mode,
            ..Default::default()
        }
    }

    /// In-memory container with no backing file.
    pub fn in_memory() -> Self {
        Self {
            mode: OpenMode::Write,
            ..Default::default()
        }
    }

    /// Build from a mode string such as `"r"`, `"a"` or `"w="`; a trailing
    /// `=` enables save-on-edit.
    pub fn from_mode_str(path: impl Into<PathBuf>, mode: &str) -> Result<Self> {
        let (mode, save_on_edit) = match mode.strip_suffix('=') {
            Some(base) => (base, true),
            None => (mode, false),
        };
        let config = Self::new(path, mode.parse()?).with_save_on_edit(save_on_edit);
        config.validate()?;
        Ok(config)
    }

    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_open_on_init(mut self, enabled: bool) -> Self {
        self.open_on_init = enabled;
        self
    }

    /// Shorthand for `with_open_on_init(false)`.
    pub fn lazy(self) -> Self {
        self.with_open_on_init(false)
    }

    pub fn with_save_on_edit(mut self, enabled: bool) -> Self {
        self.save_on_edit = enabled;
        self
    }

    pub fn with_append_policy(mut self, policy: AppendPolicy) -> Self {
        self.append_policy = policy;
        self
    }

    pub fn with_close_policy(mut self, policy: ClosePolicy) -> Self {
        self.close_policy = policy;
        self
    }

    pub fn with_max_regions_per_key(mut self, max: usize) -> Self {
        self.max_regions_per_key = max;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Reject contradictory settings.
    pub fn validate(&self) -> Result<()> {
        if self.mode == OpenMode::Read && self.save_on_edit {
            return Err(HdictError::Config(
                "save_on_edit cannot be enabled in read mode".into(),
            ));
        }
        if self.max_regions_per_key == 0 {
            return Err(HdictError::Config(
                "max_regions_per_key must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_string_with_save_on_edit() {
        let cfg = ContainerConfig::from_mode_str("data.hdc", "a=").unwrap();
        assert_eq!(cfg.mode, OpenMode::Append);
        assert!(cfg.save_on_edit);

        let cfg = ContainerConfig::from_mode_str("data.hdc", "r").unwrap();
        assert_eq!(cfg.mode, OpenMode::Read);
        assert!(!cfg.save_on_edit);

        assert!(ContainerConfig::from_mode_str("data.hdc", "r=").is_err());
        assert!(ContainerConfig::from_mode_str("data.hdc", "x").is_err());
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: ContainerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ContainerConfig::default());
        assert!(cfg.open_on_init);
        assert_eq!(cfg.append_policy, AppendPolicy::Overwrite);
        assert_eq!(cfg.close_policy, ClosePolicy::Flush);
        assert_eq!(cfg.store.lock_retries, 5);
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = ContainerConfig::new("x.hdc", OpenMode::Append)
            .lazy()
            .with_append_policy(AppendPolicy::Reject)
            .with_close_policy(ClosePolicy::Warn);
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"append\""));
        let back: ContainerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
