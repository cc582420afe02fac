//! hdict: a lazily loaded dictionary kept in sync with a hierarchical file
//!
//! hdict provides:
//! - **Container**: named values (scalars, strings, arrays, nested maps and
//!   opaque JSON) addressed by slash-joined keys
//! - **Lazy loading**: open reads the key listing only; values and groups
//!   load on first access, one level at a time
//! - **Dirty tracking**: save writes only what changed, down to the element
//!   regions of an array, either on demand or on every edit
//! - **Key locks**: per-key read-only status, checked before any mutation
//! - **Live arrays**: `SyncArray` handles whose element writes go straight
//!   to the container
//!
//! # Quick Start
//!
//! ```no_run
//! use hdict::prelude::*;
//!
//! # fn main() -> Result<()> {
//! // Create a file and write through on every edit
//! let data = Container::open_str("./run.hdc", "w=")?;
//! data.set("gain", 2.5)?;
//! data.set("trace", vec![0.0, 0.0, 0.0])?;
//!
//! // Element writes patch only the touched bytes
//! let mut trace = data.array("trace")?;
//! trace.set(&[1], 4.0)?;
//! data.close()?;
//!
//! // Reopen lazily: nothing is read until it is used
//! let data = Container::open(ContainerConfig::new("./run.hdc", OpenMode::Read).lazy())?;
//! assert_eq!(data.keys_unloaded()?.len(), 2);
//! println!("{}", data.get("gain")?.as_float().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod attr;
pub mod container;
pub mod prelude;
pub mod sync_array;

mod dirty;
mod entry;
mod lock;
mod summary;

// Re-export core types
pub use hdict_core::{
    config::{AppendPolicy, ClosePolicy, ContainerConfig, OpenMode, StoreConfig},
    error::{HdictError, Result, SaveFailure},
    traits::{HierarchicalStore, ValueCodec},
    types::{key, DType, Dataset, NdArray, NodeInfo, Region, Scalar, Value, ValueKind},
    DefaultCodec,
};

// Re-export implementations
pub use hdict_core::{MemoryStore, WriteOp};
pub use hdict_file::{FileStore, FileStoreStats};

// Re-export main types from this crate
pub use attr::AttrAccess;
pub use container::{Container, EntryState, KeyNode};
pub use sync_array::SyncArray;
