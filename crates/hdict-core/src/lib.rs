//! hdict core: traits and types for hierarchical dictionary storage
//!
//! This crate defines the pieces shared by every hdict backend:
//! - Value model: scalars, strings, n-dimensional arrays, nested mappings
//!   and opaque JSON payloads
//! - `HierarchicalStore`: groups and datasets addressed by slash-joined paths,
//!   with in-place region patching
//! - `ValueCodec`: conversion between values and stored datasets
//! - `MemoryStore`: an in-process store that records every write
//!
//! The `hdict` crate builds the lazy, dirty-tracking container on top of these.

pub mod codec;
pub mod config;
pub mod error;
pub mod observe;
pub mod store;
pub mod traits;
pub mod types;

pub use codec::DefaultCodec;
pub use config::{AppendPolicy, ClosePolicy, ContainerConfig, OpenMode, StoreConfig};
pub use error::{HdictError, Result, SaveFailure};
pub use store::{MemoryStore, WriteOp};
pub use traits::{HierarchicalStore, ValueCodec};
pub use types::{
    merge_region, ArrayData, DType, Dataset, DatasetInfo, NdArray, NodeInfo, Region, Scalar,
    StoreMeta, Value, ValueKind,
};
