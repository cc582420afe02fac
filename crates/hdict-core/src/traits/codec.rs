use crate::error::Result;
use crate::types::{Dataset, Value};

/// Converts between native values and the datasets a store holds
///
/// Only leaf values pass through a codec. Nested mappings are laid out as
/// groups by the caller, one dataset per leaf.
pub trait ValueCodec: Send + Sync {
    /// Encode a leaf value
    ///
    /// Returns `Codec` for values that have no stored representation; such
    /// values are surfaced, never coerced.
    fn encode(&self, value: &Value) -> Result<Dataset>;

    /// Check that `value` can be encoded, without producing the dataset
    ///
    /// Called when a value is assigned so unrepresentable values fail at the
    /// assignment rather than at the next save.
    fn check(&self, value: &Value) -> Result<()> {
        self.encode(value).map(|_| ())
    }

    /// Decode a dataset read from the store
    fn decode(&self, dataset: &Dataset) -> Result<Value>;
}
