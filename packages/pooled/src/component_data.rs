//! Containers for component data.
//!
//! Pools never see concrete component types. Values cross into a pool as a
//! `ComponentValueRef`, a byte slice tagged with the type it was taken from,
//! and leave it by copying those bytes back out through `Pod`.

use crate::component::{Component, ComponentTypeID};
use crate::error::{Error, Result};

/// A safe reference to a component value.
#[derive(Debug, Clone, Copy)]
pub struct ComponentValueRef<'a> {
    type_id: ComponentTypeID,
    slice: &'a [u8],
}

impl<'a> ComponentValueRef<'a> {
    /// Create a `ComponentValueRef` from a raw byte slice.
    ///
    /// The length is checked against the registered layout of `type_id`.
    pub fn from_raw(type_id: ComponentTypeID, data: &'a [u8]) -> Result<ComponentValueRef<'a>> {
        let registration = type_id.registration();
        let expected = registration.layout().size();

        if data.len() != expected {
            return Err(Error::TypeMismatch {
                name: registration.name(),
                expected,
                actual: data.len(),
            });
        }

        Ok(ComponentValueRef {
            type_id,
            slice: data,
        })
    }

    /// Get the type ID of the stored component value reference.
    pub fn type_id(&self) -> ComponentTypeID {
        self.type_id
    }

    /// Return the raw bytes of the component.
    pub fn as_slice(&self) -> &'a [u8] {
        self.slice
    }

    /// Return the number of bytes the value occupies.
    pub fn len(&self) -> usize {
        self.slice.len()
    }

    /// Returns true for zero-sized values such as tags.
    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    /// Attempt to copy this value back out as the component type.
    pub fn downcast<T: Component>(&self) -> Option<T> {
        if T::type_id() == self.type_id {
            Some(bytemuck::pod_read_unaligned(self.slice))
        } else {
            None
        }
    }
}

impl<'a, T: Component> From<&'a T> for ComponentValueRef<'a> {
    fn from(v: &'a T) -> Self {
        ComponentValueRef {
            type_id: T::type_id(),
            slice: bytemuck::bytes_of(v),
        }
    }
}
