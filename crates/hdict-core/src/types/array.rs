//! Dense n-dimensional arrays with a typed element buffer.
//!
//! `NdArray` is deliberately small: a shape, a dtype and a flat row-major
//! buffer. It supports what the container needs from an array library:
//! element and range assignment, reshape/resize and a little-endian byte
//! encoding for storage.

use crate::error::{HdictError, Result};
use crate::types::region::Region;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type tag of a stored dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    U8,
    I64,
    F64,
    /// UTF-8 text, always stored with an empty shape.
    Utf8,
    /// JSON text for values with no native representation.
    Json,
}

impl DType {
    /// Size in bytes of one element, or `None` for variable-width text types.
    pub fn element_size(&self) -> Option<usize> {
        match self {
            DType::Bool | DType::U8 => Some(1),
            DType::I64 | DType::F64 => Some(8),
            DType::Utf8 | DType::Json => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.element_size().is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::U8 => "u8",
            DType::I64 => "i64",
            DType::F64 => "f64",
            DType::Utf8 => "utf8",
            DType::Json => "json",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single array element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<u8> for Scalar {
    fn from(v: u8) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

/// Flat element buffer of an [`NdArray`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    U8(Vec<u8>),
    I64(Vec<i64>),
    F64(Vec<f64>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::U8(v) => v.len(),
            ArrayData::I64(v) => v.len(),
            ArrayData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::U8(_) => DType::U8,
            ArrayData::I64(_) => DType::I64,
            ArrayData::F64(_) => DType::F64,
        }
    }

    fn zeros(dtype: DType, len: usize) -> Result<Self> {
        match dtype {
            DType::Bool => Ok(ArrayData::Bool(vec![false; len])),
            DType::U8 => Ok(ArrayData::U8(vec![0; len])),
            DType::I64 => Ok(ArrayData::I64(vec![0; len])),
            DType::F64 => Ok(ArrayData::F64(vec![0.0; len])),
            other => Err(HdictError::Codec(format!(
                "{other} is not an array element type"
            ))),
        }
    }
}

/// Rust element types that can back an [`NdArray`].
pub trait Element: Copy {
    fn wrap(values: Vec<Self>) -> ArrayData;
}

impl Element for bool {
    fn wrap(values: Vec<Self>) -> ArrayData {
        ArrayData::Bool(values)
    }
}

impl Element for u8 {
    fn wrap(values: Vec<Self>) -> ArrayData {
        ArrayData::U8(values)
    }
}

impl Element for i64 {
    fn wrap(values: Vec<Self>) -> ArrayData {
        ArrayData::I64(values)
    }
}

impl Element for f64 {
    fn wrap(values: Vec<Self>) -> ArrayData {
        ArrayData::F64(values)
    }
}

/// Number of elements described by `shape` (1 for a zero-dimensional shape).
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let expected = element_count(&shape);
        if expected != data.len() {
            return Err(HdictError::Codec(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array over `values`.
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        let shape = vec![values.len()];
        Self {
            shape,
            data: T::wrap(values),
        }
    }

    pub fn from_shape_vec<T: Element>(shape: Vec<usize>, values: Vec<T>) -> Result<Self> {
        Self::new(shape, T::wrap(values))
    }

    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Result<Self> {
        let data = ArrayData::zeros(dtype, element_count(&shape))?;
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            ArrayData::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.data {
            ArrayData::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match &self.data {
            ArrayData::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Row-major flat offset of a multi-dimensional index.
    pub fn flat_index(&self, index: &[usize]) -> Result<usize> {
        let out_of_bounds = || HdictError::IndexOutOfBounds {
            index: index.to_vec(),
            shape: self.shape.clone(),
        };
        if index.len() != self.shape.len() {
            return Err(out_of_bounds());
        }
        let mut offset = 0usize;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return Err(out_of_bounds());
            }
            offset = offset * dim + i;
        }
        Ok(offset)
    }

    pub fn get_flat(&self, offset: usize) -> Option<Scalar> {
        match &self.data {
            ArrayData::Bool(v) => v.get(offset).map(|&b| Scalar::Bool(b)),
            ArrayData::U8(v) => v.get(offset).map(|&n| Scalar::Int(n as i64)),
            ArrayData::I64(v) => v.get(offset).map(|&n| Scalar::Int(n)),
            ArrayData::F64(v) => v.get(offset).map(|&x| Scalar::Float(x)),
        }
    }

    pub fn get(&self, index: &[usize]) -> Result<Scalar> {
        let offset = self.flat_index(index)?;
        self.get_flat(offset)
            .ok_or_else(|| HdictError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            })
    }

    /// Check that `value` can be stored in this array without loss of type.
    fn check_assignable(&self, value: Scalar) -> Result<()> {
        let ok = match (&self.data, value) {
            (ArrayData::Bool(_), Scalar::Bool(_)) => true,
            (ArrayData::U8(_), Scalar::Bool(_)) => true,
            (ArrayData::U8(_), Scalar::Int(n)) => (0..=255).contains(&n),
            (ArrayData::I64(_), Scalar::Bool(_) | Scalar::Int(_)) => true,
            (ArrayData::F64(_), _) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(HdictError::Codec(format!(
                "cannot store {value} in a {} array",
                self.dtype()
            )))
        }
    }

    /// Caller must have bounds-checked `offset` and run `check_assignable`.
    fn store(&mut self, offset: usize, value: Scalar) {
        match (&mut self.data, value) {
            (ArrayData::Bool(v), Scalar::Bool(b)) => v[offset] = b,
            (ArrayData::U8(v), Scalar::Bool(b)) => v[offset] = b as u8,
            (ArrayData::U8(v), Scalar::Int(n)) => v[offset] = n as u8,
            (ArrayData::I64(v), Scalar::Bool(b)) => v[offset] = b as i64,
            (ArrayData::I64(v), Scalar::Int(n)) => v[offset] = n,
            (ArrayData::F64(v), Scalar::Bool(b)) => v[offset] = if b { 1.0 } else { 0.0 },
            (ArrayData::F64(v), Scalar::Int(n)) => v[offset] = n as f64,
            (ArrayData::F64(v), Scalar::Float(x)) => v[offset] = x,
            _ => {}
        }
    }

    fn check_range(&self, start: usize, count: usize) -> Result<()> {
        if start.checked_add(count).map_or(true, |end| end > self.len()) {
            return Err(HdictError::IndexOutOfBounds {
                index: vec![start + count.saturating_sub(1)],
                shape: vec![self.len()],
            });
        }
        Ok(())
    }

    /// Assign one element by flat offset, returning the touched region.
    pub fn set_flat(&mut self, offset: usize, value: Scalar) -> Result<Region> {
        self.check_range(offset, 1)?;
        self.check_assignable(value)?;
        self.store(offset, value);
        Ok(Region::single(offset))
    }

    pub fn set(&mut self, index: &[usize], value: Scalar) -> Result<Region> {
        let offset = self.flat_index(index)?;
        self.set_flat(offset, value)
    }

    /// Assign a contiguous run of elements. Either every value is stored or
    /// none is.
    pub fn write_range(&mut self, start: usize, values: &[Scalar]) -> Result<Region> {
        self.check_range(start, values.len())?;
        for value in values {
            self.check_assignable(*value)?;
        }
        for (i, value) in values.iter().enumerate() {
            self.store(start + i, *value);
        }
        Ok(Region::new(start, start + values.len()))
    }

    pub fn fill(&mut self, value: Scalar) -> Result<Region> {
        self.check_assignable(value)?;
        for offset in 0..self.len() {
            self.store(offset, value);
        }
        Ok(Region::new(0, self.len()))
    }

    /// Change the shape without touching the data.
    pub fn reshape(&mut self, shape: Vec<usize>) -> Result<()> {
        if element_count(&shape) != self.len() {
            return Err(HdictError::Codec(format!(
                "cannot reshape {} elements into {:?}",
                self.len(),
                shape
            )));
        }
        self.shape = shape;
        Ok(())
    }

    /// Change the shape, truncating the flat buffer or extending it with `fill`.
    pub fn resize(&mut self, shape: Vec<usize>, fill: Scalar) -> Result<()> {
        self.check_assignable(fill)?;
        let old_len = self.len();
        let new_len = element_count(&shape);
        match &mut self.data {
            ArrayData::Bool(v) => v.resize(new_len, false),
            ArrayData::U8(v) => v.resize(new_len, 0),
            ArrayData::I64(v) => v.resize(new_len, 0),
            ArrayData::F64(v) => v.resize(new_len, 0.0),
        }
        for offset in old_len..new_len {
            self.store(offset, fill);
        }
        self.shape = shape;
        Ok(())
    }

    /// Little-endian bytes of the elements in `region`.
    pub fn region_bytes(&self, region: Region) -> Result<Vec<u8>> {
        self.check_range(region.start, region.len())?;
        let range = region.start..region.end;
        Ok(match &self.data {
            ArrayData::Bool(v) => v[range].iter().map(|&b| b as u8).collect(),
            ArrayData::U8(v) => v[range].to_vec(),
            ArrayData::I64(v) => v[range].iter().flat_map(|n| n.to_le_bytes()).collect(),
            ArrayData::F64(v) => v[range].iter().flat_map(|x| x.to_le_bytes()).collect(),
        })
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        match &self.data {
            ArrayData::Bool(v) => v.iter().map(|&b| b as u8).collect(),
            ArrayData::U8(v) => v.clone(),
            ArrayData::I64(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
            ArrayData::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }

    pub fn from_le_bytes(dtype: DType, shape: Vec<usize>, bytes: &[u8]) -> Result<Self> {
        let size = dtype.element_size().ok_or_else(|| {
            HdictError::Codec(format!("{dtype} is not an array element type"))
        })?;
        let count = element_count(&shape);
        if bytes.len() != count * size {
            return Err(HdictError::Codec(format!(
                "{} bytes cannot hold {} {} elements",
                bytes.len(),
                count,
                dtype
            )));
        }
        let data = match dtype {
            DType::Bool => ArrayData::Bool(bytes.iter().map(|&b| b != 0).collect()),
            DType::U8 => ArrayData::U8(bytes.to_vec()),
            DType::I64 => ArrayData::I64(
                bytes
                    .chunks_exact(8)
                    .map(|c| i64::from_le_bytes(c.try_into().unwrap_or([0; 8])))
                    .collect(),
            ),
            DType::F64 => ArrayData::F64(
                bytes
                    .chunks_exact(8)
                    .map(|c| f64::from_le_bytes(c.try_into().unwrap_or([0; 8])))
                    .collect(),
            ),
            DType::Utf8 | DType::Json => {
                return Err(HdictError::Codec(format!("{dtype} is not an array element type")))
            }
        };
        Ok(Self { shape, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_index_row_major() {
        let arr = NdArray::zeros(DType::F64, vec![2, 3]).unwrap();
        assert_eq!(arr.flat_index(&[0, 0]).unwrap(), 0);
        assert_eq!(arr.flat_index(&[0, 2]).unwrap(), 2);
        assert_eq!(arr.flat_index(&[1, 0]).unwrap(), 3);
        assert_eq!(arr.flat_index(&[1, 2]).unwrap(), 5);
        assert!(matches!(
            arr.flat_index(&[2, 0]),
            Err(HdictError::IndexOutOfBounds { .. })
        ));
        assert!(arr.flat_index(&[1]).is_err());
    }

    #[test]
    fn test_set_returns_touched_region() {
        let mut arr = NdArray::from_vec(vec![1i64, 2, 3, 4]);
        let region = arr.set(&[2], Scalar::Int(30)).unwrap();
        assert_eq!(region, Region::single(2));
        assert_eq!(arr.as_i64().unwrap(), &[1, 2, 30, 4]);
    }

    #[test]
    fn test_type_mismatch_is_rejected_without_mutation() {
        let mut arr = NdArray::from_vec(vec![1i64, 2, 3]);
        let err = arr.write_range(0, &[Scalar::Int(9), Scalar::Float(0.5)]);
        assert!(matches!(err, Err(HdictError::Codec(_))));
        assert_eq!(arr.as_i64().unwrap(), &[1, 2, 3]);

        let mut bytes = NdArray::from_vec(vec![0u8; 2]);
        assert!(bytes.set_flat(0, Scalar::Int(256)).is_err());
        assert!(bytes.set_flat(0, Scalar::Int(255)).is_ok());
    }

    #[test]
    fn test_float_array_accepts_ints() {
        let mut arr = NdArray::from_vec(vec![0.0f64; 3]);
        arr.set_flat(1, Scalar::Int(7)).unwrap();
        assert_eq!(arr.as_f64().unwrap(), &[0.0, 7.0, 0.0]);
    }

    #[test]
    fn test_reshape_and_resize() {
        let mut arr = NdArray::from_vec(vec![1i64, 2, 3, 4, 5, 6]);
        arr.reshape(vec![2, 3]).unwrap();
        assert_eq!(arr.get(&[1, 0]).unwrap(), Scalar::Int(4));
        assert!(arr.reshape(vec![4, 2]).is_err());

        arr.resize(vec![3, 3], Scalar::Int(-1)).unwrap();
        assert_eq!(arr.len(), 9);
        assert_eq!(arr.get(&[2, 2]).unwrap(), Scalar::Int(-1));
        assert_eq!(arr.get(&[0, 1]).unwrap(), Scalar::Int(2));

        arr.resize(vec![2], Scalar::Int(0)).unwrap();
        assert_eq!(arr.as_i64().unwrap(), &[1, 2]);
    }

    #[test]
    fn test_region_bytes_slice_of_full_encoding() {
        let arr = NdArray::from_vec(vec![1.5f64, -2.0, 3.25]);
        let full = arr.to_le_bytes();
        let part = arr.region_bytes(Region::new(1, 3)).unwrap();
        assert_eq!(part, full[8..24].to_vec());

        let decoded = NdArray::from_le_bytes(DType::F64, vec![3], &full).unwrap();
        assert_eq!(decoded, arr);
    }

    #[test]
    fn test_from_le_bytes_rejects_length_mismatch() {
        let err = NdArray::from_le_bytes(DType::I64, vec![2], &[0u8; 15]);
        assert!(matches!(err, Err(HdictError::Codec(_))));
    }
}
