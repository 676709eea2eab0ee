//! An entity component system.
//!
//! Every component type lives in its own byte pool, indexed by entity ID, with
//! a validity bit per row. Joins walk the pools in lock-step.

pub use arena::{RowRead, TypedByteArena};
pub use command_buffer::{CommandBuffer, PendingEntity, Target};
pub use component::{
    Component,
    ComponentTypeID,
    Tag,
};
pub use entity::Entity;
pub use error::{Error, Result};
pub use query::Query;
pub use registry::{EntityRegistry, RegistryConfig};
pub use simulation::{Simulation, SimulationBuilder};
pub use system::{
    BoxUnit,
    Context,
    Resources,
    UpdateUnit,
};

#[doc(hidden)]
pub use bytemuck;

pub mod component;
pub mod component_data;
mod entity;
mod error;

pub mod arena;
pub mod registry;
pub mod query;

mod command_buffer;

pub mod system;
pub mod simulation;
