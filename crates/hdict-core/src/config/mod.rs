pub mod container;
pub mod store;

pub use container::{AppendPolicy, ClosePolicy, ContainerConfig, OpenMode};
pub use store::StoreConfig;
