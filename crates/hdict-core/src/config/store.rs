use serde::{Deserialize, Serialize};

/// Configuration for a file-backed store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Take an advisory lock on a sibling `.lock` file while the store is
    /// writable (default: true)
    #[serde(default = "default_true")]
    pub use_lock_file: bool,

    /// How many times to retry a held lock before failing with `FileLocked`
    /// (default: 5)
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Delay between lock attempts in milliseconds (default: 200)
    #[serde(default = "default_lock_retry_delay")]
    pub lock_retry_delay_ms: u64,

    /// Call `fsync` when the index is flushed (default: true)
    ///
    /// Disabling this trades durability across power loss for write latency;
    /// a process crash still leaves the last flushed index intact.
    #[serde(default = "default_true")]
    pub sync_on_flush: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_lock_file: default_true(),
            lock_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay(),
            sync_on_flush: default_true(),
        }
    }
}

impl StoreConfig {
    pub fn with_lock_file(mut self, enabled: bool) -> Self {
        self.use_lock_file = enabled;
        self
    }

    pub fn with_lock_retries(mut self, retries: u32, delay_ms: u64) -> Self {
        self.lock_retries = retries;
        self.lock_retry_delay_ms = delay_ms;
        self
    }

    pub fn with_sync_on_flush(mut self, enabled: bool) -> Self {
        self.sync_on_flush = enabled;
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_lock_retries() -> u32 {
    5
}

fn default_lock_retry_delay() -> u64 {
    200
}
