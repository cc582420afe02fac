//! hdict Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use hdict::prelude::*;
//! ```

// Core types
pub use crate::{Container, EntryState, HdictError, KeyNode, Result, SyncArray};

// Values
pub use crate::{DType, NdArray, Scalar, Value, ValueKind};

// Configs
pub use crate::{AppendPolicy, ClosePolicy, ContainerConfig, OpenMode, StoreConfig};

// Traits
pub use crate::{AttrAccess, HierarchicalStore, ValueCodec};

// Stores
pub use crate::{FileStore, MemoryStore};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;
