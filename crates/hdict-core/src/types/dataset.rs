use crate::error::{HdictError, Result};
use crate::types::array::{element_count, DType};
use serde::{Deserialize, Serialize};

/// A primitive leaf as held by a hierarchical store: typed bytes plus shape.
///
/// Numeric data is little-endian and row-major. Text dtypes carry UTF-8 bytes
/// and an empty shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl Dataset {
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let dataset = Self { dtype, shape, data };
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn text(dtype: DType, text: &str) -> Self {
        Self {
            dtype,
            shape: Vec::new(),
            data: text.as_bytes().to_vec(),
        }
    }

    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }

    /// Check that the byte length matches dtype and shape.
    pub fn validate(&self) -> Result<()> {
        match self.dtype.element_size() {
            Some(size) => {
                let expected = self.element_count() * size;
                if self.data.len() != expected {
                    return Err(HdictError::Corrupt(format!(
                        "{} dataset of shape {:?} needs {} bytes, has {}",
                        self.dtype,
                        self.shape,
                        expected,
                        self.data.len()
                    )));
                }
            }
            None => {
                if !self.shape.is_empty() {
                    return Err(HdictError::Corrupt(format!(
                        "{} dataset must have an empty shape",
                        self.dtype
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            dtype: self.dtype,
            shape: self.shape.clone(),
            byte_len: self.data.len() as u64,
        }
    }
}

/// Metadata of a stored dataset, readable without loading its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub byte_len: u64,
}

/// What lives at a path in a hierarchical store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeInfo {
    Group,
    Dataset(DatasetInfo),
}

impl NodeInfo {
    pub fn is_group(&self) -> bool {
        matches!(self, NodeInfo::Group)
    }
}
