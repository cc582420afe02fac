use crate::container::Container;
use hdict_core::{
    error::{HdictError, Result},
    types::{key, Value},
};

/// Attribute-style access to top-level keys
///
/// Names are single key segments. A name of the form `i<digits>` that is not
/// itself a key falls back to the key `<digits>`, so numerically named keys
/// stay reachable through identifier-like names.
pub trait AttrAccess {
    fn attr(&self, name: &str) -> Result<Value>;

    fn set_attr(&self, name: &str, value: impl Into<Value>) -> Result<()>;

    fn remove_attr(&self, name: &str) -> Result<()>;
}

impl Container {
    fn attr_key(&self, name: &str) -> Result<String> {
        key::validate_segment(name)?;
        if self.contains(name)? {
            return Ok(name.to_string());
        }
        if let Some(digits) = numeric_alias(name) {
            if self.contains(digits)? {
                return Ok(digits.to_string());
            }
        }
        Ok(name.to_string())
    }
}

impl AttrAccess for Container {
    fn attr(&self, name: &str) -> Result<Value> {
        let key = self.attr_key(name)?;
        self.get(&key).map_err(|e| match e {
            HdictError::KeyNotFound(_) => HdictError::KeyNotFound(name.to_string()),
            other => other,
        })
    }

    fn set_attr(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let key = self.attr_key(name)?;
        self.set(&key, value)
    }

    fn remove_attr(&self, name: &str) -> Result<()> {
        let key = self.attr_key(name)?;
        self.remove(&key)
    }
}

/// `"i42"` → `"42"`.
fn numeric_alias(name: &str) -> Option<&str> {
    let digits = name.strip_prefix('i')?;
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
}
