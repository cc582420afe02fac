use serde::{Deserialize, Serialize};

/// Current on-disk format version written by stores.
pub const FORMAT_VERSION: u32 = 1;

/// Metadata kept alongside a store's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    /// Format version of the file
    pub format_version: u32,

    /// Creation timestamp (ISO 8601)
    pub created_at: String,

    /// Last updated timestamp (ISO 8601)
    pub updated_at: String,
}

impl StoreMeta {
    pub fn new() -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            format_version: FORMAT_VERSION,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

impl Default for StoreMeta {
    fn default() -> Self {
        Self::new()
    }
}
