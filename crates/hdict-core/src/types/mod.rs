pub mod array;
pub mod dataset;
pub mod key;
pub mod meta;
pub mod region;
pub mod value;

pub use array::{element_count, ArrayData, DType, Element, NdArray, Scalar};
pub use dataset::{Dataset, DatasetInfo, NodeInfo};
pub use meta::{StoreMeta, FORMAT_VERSION};
pub use region::{merge_region, Region};
pub use value::{Value, ValueKind};
