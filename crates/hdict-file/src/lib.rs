//! Single-file store backend for hdict
//!
//! Stores a tree of groups and datasets in one file:
//! - Dataset writes append a data block, so a failed write never damages
//!   data already on disk
//! - Region writes patch a block in place, so a one-element change costs
//!   one element of I/O
//! - A JSON index and a fixed footer are appended on flush; opening reads
//!   the last intact footer
//! - `compact` drops superseded blocks
//! - Writable opens hold an advisory lock on `<file>.lock`

pub mod format;
mod lock;
mod store;

pub use lock::LockFile;
pub use store::{FileStore, FileStoreStats};
