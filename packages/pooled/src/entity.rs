//! Entity handles.

use std::fmt::{self, Display, Formatter};

/// The ID of a single entity.
///
/// The inner value doubles as the entity's row in every component pool. IDs are
/// unique per registry while the entity is alive, and are reused once it has
/// been destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u32);

impl Entity {
    /// The handle which refers to no entity. Freed slots hold this value.
    pub const NONE: Entity = Entity(u32::MAX);

    /// Create a new `Entity` given its row.
    pub(crate) fn new(id: usize) -> Entity {
        debug_assert!(id < u32::MAX as usize, "entity id space exhausted");
        Entity(id as u32)
    }

    /// Return the inner ID, which is also the entity's row index.
    pub fn id(&self) -> usize {
        self.0 as usize
    }

    /// Returns true if this is `Entity::NONE`.
    pub fn is_none(&self) -> bool {
        *self == Entity::NONE
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::NONE
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Entity(none)")
        } else {
            write!(f, "Entity({})", self.0)
        }
    }
}
