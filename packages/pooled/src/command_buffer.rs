use crate::component::{Component, ComponentTypeID, Tag};
use crate::component_data::ComponentValueRef;
use crate::entity::Entity;
use crate::error::Result;
use crate::registry::EntityRegistry;

/// An entity which will be created when a `CommandBuffer` is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingEntity(usize);

/// The entity a buffered command applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Entity(Entity),
    Pending(PendingEntity),
}

impl From<Entity> for Target {
    fn from(entity: Entity) -> Self {
        Target::Entity(entity)
    }
}

impl From<PendingEntity> for Target {
    fn from(pending: PendingEntity) -> Self {
        Target::Pending(pending)
    }
}

#[derive(Clone, Debug)]
enum Command {
    Spawn,
    Destroy(Target),
    Set(Target, ComponentTypeID, usize, usize),
    Remove(Target, ComponentTypeID),
}

/// A command buffer for entity changes.
///
/// Pools cannot change shape while a join is walking them, so structural
/// changes discovered during a traversal are recorded here and applied once
/// the traversal is over. Commands are applied in the order they were
/// recorded.
#[derive(Clone, Debug, Default)]
pub struct CommandBuffer {
    component_data: Vec<u8>,
    commands: Vec<Command>,
    pending: usize,
}

impl CommandBuffer {
    /// Create a new, empty, command buffer.
    pub fn new() -> CommandBuffer {
        CommandBuffer::default()
    }

    /// Return the number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Discard every recorded command.
    pub fn clear(&mut self) {
        self.component_data.clear();
        self.commands.clear();
        self.pending = 0;
    }

    /// Create an entity when the buffer is applied.
    pub fn spawn(&mut self) -> PendingEntity {
        let pending = PendingEntity(self.pending);
        self.pending += 1;
        self.commands.push(Command::Spawn);
        pending
    }

    /// Destroy an entity when the buffer is applied.
    pub fn destroy(&mut self, target: impl Into<Target>) {
        self.commands.push(Command::Destroy(target.into()));
    }

    /// Set a single component on an entity.
    pub fn set_component<T: Component>(&mut self, target: impl Into<Target>, component: &T) {
        let v = ComponentValueRef::from(component);
        let data = v.as_slice();

        let start = self.component_data.len();
        let end = start + data.len();
        self.component_data.extend_from_slice(data);
        self.commands.push(Command::Set(target.into(), v.type_id(), start, end));
    }

    /// Attach a tag to an entity.
    pub fn add_tag<T: Tag>(&mut self, target: impl Into<Target>, tag: T) {
        self.set_component(target, &tag)
    }

    /// Remove a single component from an entity.
    pub fn remove_component<T: Component>(&mut self, target: impl Into<Target>) {
        self.commands.push(Command::Remove(target.into(), T::type_id()));
    }

    /// Apply every recorded command to `registry` and empty the buffer.
    ///
    /// Returns the entities created, in the order `spawn` was called. If a
    /// command fails, the remaining commands are discarded.
    pub fn apply(&mut self, registry: &mut EntityRegistry) -> Result<Vec<Entity>> {
        let mut spawned = Vec::with_capacity(self.pending);

        if !self.commands.is_empty() {
            log::debug!("applying {} buffered commands", self.commands.len());
        }

        let result = self.replay(registry, &mut spawned);
        self.clear();
        result.map(|_| spawned)
    }

    fn replay(&self, registry: &mut EntityRegistry, spawned: &mut Vec<Entity>) -> Result<()> {
        let resolve = |target: Target, spawned: &[Entity]| match target {
            Target::Entity(entity) => Some(entity),
            Target::Pending(PendingEntity(idx)) => {
                let entity = spawned.get(idx).copied();
                if entity.is_none() {
                    log::warn!("command refers to unknown pending entity #{}", idx);
                }
                entity
            }
        };

        for command in self.commands.iter() {
            match *command {
                Command::Spawn => spawned.push(registry.create_entity()),
                Command::Destroy(target) => {
                    if let Some(entity) = resolve(target, spawned) {
                        registry.destroy_entity(entity);
                    }
                }
                Command::Set(target, type_id, start, end) => {
                    if let Some(entity) = resolve(target, spawned) {
                        let value = ComponentValueRef::from_raw(type_id, &self.component_data[start..end])?;
                        registry.set_raw(entity, value)?;
                    }
                }
                Command::Remove(target, type_id) => {
                    if let Some(entity) = resolve(target, spawned) {
                        registry.remove_raw(entity, type_id);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use bytemuck::{Pod, Zeroable};

    use super::*;
    use crate::{component, tag};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
    struct Health(i32);
    component!(Health);

    #[derive(Debug, Clone, Copy)]
    struct Doomed;
    tag!(Doomed);

    #[test]
    fn test_spawn_and_set() {
        let mut registry = EntityRegistry::new();
        let mut commands = CommandBuffer::new();

        let a = commands.spawn();
        let b = commands.spawn();
        commands.set_component(b, &Health(2));
        commands.set_component(a, &Health(1));
        commands.add_tag(a, Doomed);
        assert_eq!(commands.len(), 5);

        let spawned = commands.apply(&mut registry).unwrap();
        assert_eq!(spawned.iter().map(|e| e.id()).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(registry.get_component::<Health>(spawned[0]), Some(Health(1)));
        assert_eq!(registry.get_component::<Health>(spawned[1]), Some(Health(2)));
        assert!(registry.has_component::<Doomed>(spawned[0]));
        assert!(commands.is_empty());
    }

    #[test]
    fn test_commands_apply_in_order() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        let mut commands = CommandBuffer::new();

        commands.set_component(e, &Health(4));
        commands.remove_component::<Health>(e);
        commands.apply(&mut registry).unwrap();
        assert_eq!(registry.get_component::<Health>(e), None);

        commands.remove_component::<Health>(e);
        commands.set_component(e, &Health(5));
        commands.apply(&mut registry).unwrap();
        assert_eq!(registry.get_component::<Health>(e), Some(Health(5)));
    }

    #[test]
    fn test_destroy_deferred_during_join() {
        let mut registry = EntityRegistry::new();
        let mut commands = CommandBuffer::new();
        for i in 0..6 {
            let e = registry.create_entity();
            registry.add_component(e, Health(i)).unwrap();
        }

        registry.query().for_each_entity(|e, health: &mut Health| {
            if health.0 % 2 == 1 {
                commands.destroy(e);
                let replacement = commands.spawn();
                commands.set_component(replacement, &Health(health.0 * 10));
            }
        }).unwrap();
        assert_eq!(registry.live_count(), 6);

        commands.apply(&mut registry).unwrap();
        let mut values = Vec::new();
        registry.query().for_each(|h: &mut Health| values.push(h.0)).unwrap();
        assert_eq!(values, vec![0, 10, 2, 30, 4, 50]);
    }

    #[test]
    fn test_unknown_pending_is_skipped() {
        let mut registry = EntityRegistry::new();
        let mut other = CommandBuffer::new();
        other.spawn();
        let stray = other.spawn();

        let mut commands = CommandBuffer::new();
        commands.set_component(stray, &Health(1));
        assert!(commands.apply(&mut registry).unwrap().is_empty());
        assert!(registry.is_empty());
    }
}
