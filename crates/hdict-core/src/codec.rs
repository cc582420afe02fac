//! Default value codec.
//!
//! Scalars are stored as zero-dimensional numeric datasets, strings as UTF-8
//! text and arrays as their little-endian element bytes. Values with no
//! native layout are stored as JSON text under the `json` dtype.

use crate::error::{HdictError, Result};
use crate::traits::ValueCodec;
use crate::types::{DType, Dataset, NdArray, Scalar, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec;

impl DefaultCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_shape_only(&self, value: &Value) -> Result<()> {
        match value {
            Value::Array(arr) if arr.ndim() == 0 => Err(zero_dimensional()),
            Value::Map(_) => Err(mapping_not_dataset()),
            _ => Ok(()),
        }
    }
}

fn zero_dimensional() -> HdictError {
    HdictError::Codec("zero-dimensional arrays are not supported; store a scalar".into())
}

fn mapping_not_dataset() -> HdictError {
    HdictError::Codec("mappings are stored as groups, not datasets".into())
}

impl ValueCodec for DefaultCodec {
    fn encode(&self, value: &Value) -> Result<Dataset> {
        match value {
            Value::Bool(b) => Ok(Dataset {
                dtype: DType::Bool,
                shape: Vec::new(),
                data: vec![*b as u8],
            }),
            Value::Int(n) => Ok(Dataset {
                dtype: DType::I64,
                shape: Vec::new(),
                data: n.to_le_bytes().to_vec(),
            }),
            Value::Float(x) => Ok(Dataset {
                dtype: DType::F64,
                shape: Vec::new(),
                data: x.to_le_bytes().to_vec(),
            }),
            Value::Str(s) => Ok(Dataset::text(DType::Utf8, s)),
            Value::Array(arr) => {
                if arr.ndim() == 0 {
                    // would read back as a scalar
                    return Err(zero_dimensional());
                }
                Ok(Dataset {
                    dtype: arr.dtype(),
                    shape: arr.shape().to_vec(),
                    data: arr.to_le_bytes(),
                })
            }
            Value::Json(json) => {
                let text = serde_json::to_string(json)
                    .map_err(|e| HdictError::Codec(format!("unencodable JSON value: {e}")))?;
                Ok(Dataset::text(DType::Json, &text))
            }
            Value::Map(_) => Err(mapping_not_dataset()),
        }
    }

    fn check(&self, value: &Value) -> Result<()> {
        match value {
            Value::Array(_) | Value::Map(_) => self.encode_shape_only(value),
            _ => Ok(()),
        }
    }

    fn decode(&self, dataset: &Dataset) -> Result<Value> {
        dataset.validate()?;
        match dataset.dtype {
            DType::Utf8 => String::from_utf8(dataset.data.clone())
                .map(Value::Str)
                .map_err(|e| HdictError::Codec(format!("invalid UTF-8 text: {e}"))),
            DType::Json => serde_json::from_slice(&dataset.data)
                .map(Value::Json)
                .map_err(|e| HdictError::Serialization(e.to_string())),
            dtype => {
                let arr = NdArray::from_le_bytes(dtype, dataset.shape.clone(), &dataset.data)?;
                if !dataset.shape.is_empty() {
                    return Ok(Value::Array(arr));
                }
                match arr.get_flat(0) {
                    Some(Scalar::Bool(b)) if dtype == DType::Bool => Ok(Value::Bool(b)),
                    Some(Scalar::Bool(b)) => Ok(Value::Int(b as i64)),
                    Some(Scalar::Int(n)) => Ok(Value::Int(n)),
                    Some(Scalar::Float(x)) => Ok(Value::Float(x)),
                    None => Err(HdictError::Corrupt("empty scalar dataset".into())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(value: Value) -> Value {
        let codec = DefaultCodec;
        let ds = codec.encode(&value).unwrap();
        codec.decode(&ds).unwrap()
    }

    #[test]
    fn test_scalars_are_zero_dimensional() {
        let ds = DefaultCodec.encode(&Value::Int(5)).unwrap();
        assert_eq!(ds.dtype, DType::I64);
        assert!(ds.shape.is_empty());
        assert_eq!(roundtrip(Value::Int(-5)), Value::Int(-5));
        assert_eq!(roundtrip(Value::Bool(true)), Value::Bool(true));
        assert_eq!(roundtrip(Value::Float(0.25)), Value::Float(0.25));
    }

    #[test]
    fn test_array_keeps_shape_and_dtype() {
        let arr = NdArray::from_shape_vec(vec![2, 2], vec![1.0f64, 2.0, 3.0, 4.0]).unwrap();
        let ds = DefaultCodec.encode(&Value::Array(arr.clone())).unwrap();
        assert_eq!(ds.shape, vec![2, 2]);
        assert_eq!(ds.data.len(), 32);
        assert_eq!(roundtrip(Value::Array(arr.clone())), Value::Array(arr));
    }

    #[test]
    fn test_opaque_values_go_through_json() {
        let value = Value::Json(json!({"list": [1, [2, 3]], "name": "x"}));
        let ds = DefaultCodec.encode(&value).unwrap();
        assert_eq!(ds.dtype, DType::Json);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_unrepresentable_values_are_surfaced() {
        assert!(matches!(
            DefaultCodec.encode(&Value::map([("a", 1)])),
            Err(HdictError::Codec(_))
        ));
        let zero_d = Value::Array(NdArray::zeros(DType::F64, vec![]).unwrap());
        assert!(DefaultCodec.encode(&zero_d).is_err());
        assert!(DefaultCodec.check(&zero_d).is_err());
        assert!(DefaultCodec.check(&Value::from(vec![1.0, 2.0])).is_ok());
    }

    #[test]
    fn test_decode_rejects_bad_text() {
        let ds = Dataset {
            dtype: DType::Utf8,
            shape: vec![],
            data: vec![0xff, 0xfe],
        };
        assert!(matches!(DefaultCodec.decode(&ds), Err(HdictError::Codec(_))));
        let ds = Dataset::text(DType::Json, "{not json");
        assert!(matches!(
            DefaultCodec.decode(&ds),
            Err(HdictError::Serialization(_))
        ));
    }
}
