//! Live array handles.
//!
//! A [`SyncArray`] starts out unbound, owning a plain [`NdArray`]. Once it
//! is stored in a container (or obtained from [`Container::array`]) it holds
//! only a `Weak` reference to the container state plus its key; every
//! mutation goes through the container, which marks the touched region dirty
//! and, under save-on-edit, writes it immediately.
//!
//! [`Container::array`]: crate::Container::array

use crate::container::ContainerInner;
use hdict_core::{
    error::{HdictError, Result},
    types::{DType, NdArray, Region, Scalar},
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// What an array mutation did to the stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrayChange {
    /// Only these flat elements changed.
    Region(Region),
    /// Shape or length changed; the whole value must be rewritten.
    Structural,
}

#[derive(Debug, Clone)]
enum Binding {
    Unbound(NdArray),
    Bound {
        container: Weak<Mutex<ContainerInner>>,
        key: String,
    },
}

#[derive(Debug, Clone)]
pub struct SyncArray {
    binding: Binding,
}

impl SyncArray {
    /// Unbound handle owning `array`.
    pub fn new(array: NdArray) -> Self {
        Self {
            binding: Binding::Unbound(array),
        }
    }

    pub(crate) fn bound(container: Weak<Mutex<ContainerInner>>, key: String) -> Self {
        Self {
            binding: Binding::Bound { container, key },
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.binding, Binding::Bound { .. })
    }

    /// Key this handle is bound to.
    pub fn key(&self) -> Option<&str> {
        match &self.binding {
            Binding::Bound { key, .. } => Some(key),
            Binding::Unbound(_) => None,
        }
    }

    pub fn get(&self, index: &[usize]) -> Result<Scalar> {
        self.read(|arr| arr.get(index))?
    }

    pub fn shape(&self) -> Result<Vec<usize>> {
        self.read(|arr| arr.shape().to_vec())
    }

    pub fn dtype(&self) -> Result<DType> {
        self.read(NdArray::dtype)
    }

    pub fn len(&self) -> Result<usize> {
        self.read(NdArray::len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.read(NdArray::is_empty)
    }

    /// Copy of the current contents.
    pub fn to_array(&self) -> Result<NdArray> {
        self.read(NdArray::clone)
    }

    pub fn set(&mut self, index: &[usize], value: impl Into<Scalar>) -> Result<()> {
        let value = value.into();
        self.write("write", |arr| arr.set(index, value).map(ArrayChange::Region))
    }

    pub fn set_flat(&mut self, offset: usize, value: impl Into<Scalar>) -> Result<()> {
        let value = value.into();
        self.write("write", |arr| {
            arr.set_flat(offset, value).map(ArrayChange::Region)
        })
    }

    /// Overwrite consecutive flat elements starting at `start`.
    pub fn write_range(&mut self, start: usize, values: &[Scalar]) -> Result<()> {
        self.write("write", |arr| {
            arr.write_range(start, values).map(ArrayChange::Region)
        })
    }

    pub fn fill(&mut self, value: impl Into<Scalar>) -> Result<()> {
        let value = value.into();
        self.write("write", |arr| arr.fill(value).map(ArrayChange::Region))
    }

    /// Change the shape, keeping the element count.
    pub fn reshape(&mut self, shape: Vec<usize>) -> Result<()> {
        self.write("reshape", |arr| {
            arr.reshape(shape).map(|_| ArrayChange::Structural)
        })
    }

    /// Change the shape, truncating or padding with `fill` in flat order.
    pub fn resize(&mut self, shape: Vec<usize>, fill: impl Into<Scalar>) -> Result<()> {
        let fill = fill.into();
        self.write("resize", |arr| {
            arr.resize(shape, fill).map(|_| ArrayChange::Structural)
        })
    }

    /// Write this key's pending changes, leaving other keys dirty.
    pub fn save(&self) -> Result<()> {
        match &self.binding {
            Binding::Unbound(_) => Err(HdictError::InvalidState(
                "array is not bound to a container".into(),
            )),
            Binding::Bound { container, key } => {
                let inner = upgrade(container)?;
                let mut guard = inner.lock();
                guard.save_marks(Some(std::slice::from_ref(key)))
            }
        }
    }

    fn read<R>(&self, f: impl FnOnce(&NdArray) -> R) -> Result<R> {
        match &self.binding {
            Binding::Unbound(arr) => Ok(f(arr)),
            Binding::Bound { container, key } => {
                let inner = upgrade(container)?;
                let mut guard = inner.lock();
                guard.with_array(key, f)
            }
        }
    }

    fn write(
        &mut self,
        action: &'static str,
        f: impl FnOnce(&mut NdArray) -> Result<ArrayChange>,
    ) -> Result<()> {
        match &mut self.binding {
            Binding::Unbound(arr) => f(arr).map(|_| ()),
            Binding::Bound { container, key } => {
                let inner = upgrade(container)?;
                let mut guard = inner.lock();
                guard.mutate_array(key, action, f)
            }
        }
    }
}

impl From<NdArray> for SyncArray {
    fn from(array: NdArray) -> Self {
        Self::new(array)
    }
}

fn upgrade(container: &Weak<Mutex<ContainerInner>>) -> Result<Arc<Mutex<ContainerInner>>> {
    container.upgrade().ok_or(HdictError::Closed)
}
