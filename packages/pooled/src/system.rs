//! Update units and the context they run in.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::command_buffer::CommandBuffer;
use crate::component::Component;
use crate::entity::Entity;
use crate::error::Result;
use crate::query::Query;
use crate::registry::EntityRegistry;

/// A unit of per-frame logic.
///
/// `S` is whatever the embedding program hands to every unit each frame, such
/// as a render target. Units are run in the order they were registered.
pub trait UpdateUnit<S: ?Sized> {
    /// Run one frame of this unit.
    fn execute(&mut self, ctx: &mut Context<'_>, surface: &mut S, elapsed: f32) -> Result<()>;

    /// A name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Boxed unit, as stored by a `Simulation`.
pub type BoxUnit<S> = Box<dyn UpdateUnit<S>>;

/// Values shared between units, keyed by type.
#[derive(Default)]
pub struct Resources {
    values: HashMap<TypeId, Box<dyn Any>>,
}

impl Resources {
    /// Create an empty set of resources.
    pub fn new() -> Resources {
        Resources::default()
    }

    /// Insert a resource, returning the previous value of the same type.
    pub fn insert<R: 'static>(&mut self, value: R) -> Option<R> {
        self.values.insert(TypeId::of::<R>(), Box::new(value))
            .and_then(|old| old.downcast::<R>().ok())
            .map(|old| *old)
    }

    /// Remove a resource.
    pub fn remove<R: 'static>(&mut self) -> Option<R> {
        self.values.remove(&TypeId::of::<R>())
            .and_then(|old| old.downcast::<R>().ok())
            .map(|old| *old)
    }

    /// Borrow a resource.
    pub fn get<R: 'static>(&self) -> Option<&R> {
        self.values.get(&TypeId::of::<R>())
            .and_then(|v| v.downcast_ref::<R>())
    }

    /// Mutably borrow a resource.
    pub fn get_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.values.get_mut(&TypeId::of::<R>())
            .and_then(|v| v.downcast_mut::<R>())
    }

    /// Returns true if a resource of type `R` is present.
    pub fn contains<R: 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<R>())
    }

    /// Return the number of resources.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no resources.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Everything a unit can reach while it runs.
///
/// `registry` and `commands` are separate fields so that a unit can record
/// commands from inside a join over the registry.
pub struct Context<'a> {
    pub registry: &'a mut EntityRegistry,
    pub commands: &'a mut CommandBuffer,
    resources: &'a mut Resources,
    frame: u64,
    elapsed: f32,
}

impl<'a> Context<'a> {
    /// Create a context for a single frame.
    pub fn new(
        registry: &'a mut EntityRegistry,
        commands: &'a mut CommandBuffer,
        resources: &'a mut Resources,
        frame: u64,
        elapsed: f32,
    ) -> Context<'a> {
        Context {
            registry,
            commands,
            resources,
            frame,
            elapsed,
        }
    }

    /// The number of frames completed before this one.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Seconds since the previous frame.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Copy a component out of an entity.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<T> {
        self.registry.get_component(entity)
    }

    /// Attach a component to an entity straight away.
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Result<()> {
        self.registry.add_component(entity, component)
    }

    /// Detach a component from an entity straight away.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        self.registry.remove_component::<T>(entity)
    }

    /// Begin a join over the registry.
    pub fn query(&mut self) -> Query<'_> {
        self.registry.query()
    }

    /// Borrow a shared resource.
    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.resources.get()
    }

    /// Mutably borrow a shared resource.
    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.resources.get_mut()
    }

    /// Return a copy of a resource.
    pub fn get_resource<R: Clone + 'static>(&self) -> Option<R> {
        self.resources.get::<R>().cloned()
    }

    /// Insert or replace a resource. It is visible to every later unit.
    pub fn insert_resource<R: 'static>(&mut self, value: R) -> Option<R> {
        self.resources.insert(value)
    }
}

#[cfg(test)]
mod test {
    use bytemuck::{Pod, Zeroable};

    use super::*;
    use crate::component;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
    struct Fuel(f32);
    component!(Fuel);

    #[derive(Debug, Clone, PartialEq)]
    struct Gravity(f32);

    struct Burn;

    impl UpdateUnit<Vec<String>> for Burn {
        fn execute(&mut self, ctx: &mut Context<'_>, log: &mut Vec<String>, elapsed: f32) -> Result<()> {
            let rate = ctx.get_resource::<Gravity>().map_or(1.0, |g| g.0);
            let Context { registry, commands, .. } = ctx;
            registry.query().for_each_entity(|e, fuel: &mut Fuel| {
                fuel.0 -= rate * elapsed;
                if fuel.0 <= 0.0 {
                    commands.destroy(e);
                }
            })?;
            log.push(format!("frame {}", ctx.frame()));
            Ok(())
        }
    }

    #[test]
    fn test_resources() {
        let mut resources = Resources::new();
        assert!(resources.is_empty());
        assert_eq!(resources.insert(Gravity(9.8)), None);
        assert_eq!(resources.insert(Gravity(1.6)), Some(Gravity(9.8)));
        assert_eq!(resources.get::<Gravity>(), Some(&Gravity(1.6)));
        resources.get_mut::<Gravity>().unwrap().0 = 3.7;
        assert!(resources.contains::<Gravity>());
        assert!(!resources.contains::<u32>());
        assert_eq!(resources.remove::<Gravity>(), Some(Gravity(3.7)));
        assert_eq!(resources.len(), 0);
    }

    #[test]
    fn test_unit_queues_commands_from_join() {
        let mut registry = EntityRegistry::new();
        let mut commands = CommandBuffer::new();
        let mut resources = Resources::new();
        resources.insert(Gravity(2.0));

        let full = registry.create_entity();
        registry.add_component(full, Fuel(10.0)).unwrap();
        let empty = registry.create_entity();
        registry.add_component(empty, Fuel(1.0)).unwrap();

        let mut log = Vec::new();
        let mut ctx = Context::new(&mut registry, &mut commands, &mut resources, 3, 1.0);
        assert_eq!(ctx.elapsed(), 1.0);
        Burn.execute(&mut ctx, &mut log, 1.0).unwrap();
        assert_eq!(ctx.get_component::<Fuel>(full), Some(Fuel(8.0)));
        assert!(!ctx.commands.is_empty());
        assert_eq!(log, vec!["frame 3".to_string()]);

        commands.apply(&mut registry).unwrap();
        assert!(registry.is_alive(full));
        assert!(!registry.is_alive(empty));
    }

    #[test]
    fn test_default_name() {
        assert!(UpdateUnit::<Vec<String>>::name(&Burn).ends_with("Burn"));
    }
}
