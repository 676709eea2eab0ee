//! Base definitions for components.
//!
//! Entities carry no data of their own; everything attached to them is a
//! component. Each component type is allocated a unique ID the first time it is
//! used, and its memory layout is recorded alongside so that pools can be
//! created for it without knowing the concrete type.
//!
//! Use the `component` macro to make a plain-old-data struct usable as a
//! component, and the `tag` macro for payload-free marker structs.

use std::alloc::Layout;
use std::any::type_name;
use std::fmt::{self, Debug, Formatter};
use std::sync::{PoisonError, RwLock};

use bytemuck::Pod;
use once_cell::sync::{Lazy, OnceCell};

/// A component type ID which is unique for a specific component type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeID(usize);

struct ComponentRegistry {
    component_types: Vec<ComponentRegistration>,
}

static COMPONENT_REGISTRY: Lazy<RwLock<ComponentRegistry>> = Lazy::new(|| {
    RwLock::new(ComponentRegistry {
        component_types: Vec::new(),
    })
});

impl ComponentTypeID {
    /// Create a new globally unique `ComponentTypeID`.
    ///
    /// Calling this twice for the same type yields two distinct IDs, so this is
    /// normally only called through `AutoComponentTypeID`.
    pub fn register<T: Component>() -> ComponentTypeID {
        let mut r = COMPONENT_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        let id = ComponentTypeID(r.component_types.len());
        r.component_types.push(ComponentRegistration::new::<T>(id));
        log::trace!("registered component {} as #{}", type_name::<T>(), id.0);
        id
    }

    /// Fetch the registration information for a component type.
    pub fn registration(&self) -> ComponentRegistration {
        let r = COMPONENT_REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        r.component_types[self.0]
    }

    /// Return the inner unique ID.
    pub fn id(&self) -> usize {
        self.0
    }

    /// Fetch the memory layout of this component type.
    pub fn layout(&self) -> Layout {
        self.registration().layout()
    }

    /// Return the name of this component type.
    pub fn name(&self) -> &'static str {
        self.registration().name()
    }
}

impl Debug for ComponentTypeID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A struct for lazily assigning unique `ComponentTypeID`s.
pub struct AutoComponentTypeID(OnceCell<ComponentTypeID>);

impl AutoComponentTypeID {
    /// Create a new `AutoComponentTypeID`.
    pub const fn new() -> AutoComponentTypeID {
        AutoComponentTypeID(OnceCell::new())
    }

    /// Get the `ComponentTypeID` this struct wraps, registering it on first use.
    pub fn get<T: Component>(&self) -> ComponentTypeID {
        *self.0.get_or_init(ComponentTypeID::register::<T>)
    }
}

impl Default for AutoComponentTypeID {
    fn default() -> Self {
        AutoComponentTypeID::new()
    }
}

/// The component trait is implemented on all component types.
///
/// `Pod` guarantees the value has a fixed byte footprint with no padding and
/// that any bit pattern of that size is a valid value, which is what allows a
/// pool to hold it as raw bytes.
pub trait Component: Pod + Debug {
    /// Get the unique type ID of this component.
    fn type_id() -> ComponentTypeID;

    /// Get the memory layout of an instance of this component.
    fn layout() -> Layout {
        Layout::new::<Self>()
    }
}

/// A component with no payload, used only to filter joins.
pub trait Tag: Component {}

/// The dynamic description of a type implementing `Component`.
#[derive(Clone, Copy)]
pub struct ComponentRegistration {
    type_id: ComponentTypeID,
    layout: Layout,
    name: &'static str,
}

impl ComponentRegistration {
    /// Create a ComponentRegistration for a static type.
    pub fn new<T: Component>(type_id: ComponentTypeID) -> ComponentRegistration {
        ComponentRegistration {
            type_id,
            layout: T::layout(),
            name: type_name::<T>(),
        }
    }

    /// Return the unique type ID for this registration.
    pub fn type_id(&self) -> ComponentTypeID {
        self.type_id
    }

    /// Return the memory layout of a single instance of this component.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the name of this component type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentRegistration {
    fn eq(&self, other: &ComponentRegistration) -> bool {
        self.type_id.eq(&other.type_id)
    }
}

impl Eq for ComponentRegistration {}

impl Debug for ComponentRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<ComponentRegistration #{} {}>", self.type_id.id(), self.name)
    }
}

/// Implement the `Component` trait on a type.
///
/// The type must implement `bytemuck::Pod` and `Debug`.
#[macro_export]
macro_rules! component {
    ($i:ident) => {
        const _: () = {
            static INIT_TYPE: $crate::component::AutoComponentTypeID = $crate::component::AutoComponentTypeID::new();

            impl $crate::component::Component for $i {
                fn type_id() -> $crate::component::ComponentTypeID {
                    INIT_TYPE.get::<$i>()
                }
            }

            ()
        };
    };
}

/// Implement the `Tag` trait on a unit struct.
///
/// The struct must be zero-sized and implement `Clone`, `Copy` and `Debug`.
#[macro_export]
macro_rules! tag {
    ($i:ident) => {
        const _: () = {
            assert!(::core::mem::size_of::<$i>() == 0, "tags cannot carry a payload");

            unsafe impl $crate::bytemuck::Zeroable for $i {}
            unsafe impl $crate::bytemuck::Pod for $i {}
            impl $crate::component::Tag for $i {}

            ()
        };
        $crate::component!($i);
    };
}
