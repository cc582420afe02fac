pub mod codec;
pub mod store;

pub use codec::ValueCodec;
pub use store::HierarchicalStore;
