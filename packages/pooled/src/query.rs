//! Joins over component pools.
//!
//! A join walks every entity slot in ascending order and calls an action for
//! each row which is valid in all of the joined pools and in the pool of every
//! required tag. The action receives mutable references straight into the
//! pools' storage.
//!
//! Required tags live on the registry rather than the `Query`, and a traversal
//! always clears them. Tags must be declared again before each traversal.

use crate::arena::TypedByteArena;
use crate::component::{Component, ComponentTypeID, Tag};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::registry::EntityRegistry;

impl EntityRegistry {
    /// Start (or continue) building a query.
    pub fn query(&mut self) -> Query<'_> {
        Query {
            registry: self,
        }
    }
}

/// A join builder over an `EntityRegistry`.
///
/// The registry stays mutably borrowed until the traversal finishes, so no
/// entity can be created or destroyed while pools are being walked. Changes
/// which must happen mid-traversal go through a `CommandBuffer`.
pub struct Query<'a> {
    registry: &'a mut EntityRegistry,
}

/// Decides whether a row satisfies the required tags of a traversal.
struct RowFilter<'r> {
    rows: usize,
    tags: &'r [(ComponentTypeID, TypedByteArena)],
}

impl<'r> RowFilter<'r> {
    fn rows(&self) -> usize {
        self.rows
    }

    fn accepts(&self, row: usize) -> bool {
        self.tags.iter().all(|(_, arena)| arena.is_valid_at(row))
    }
}

/// Pools lifted out of a registry for the length of one traversal.
///
/// Dropping this puts every pool back and clears the required tags, whether
/// the traversal returned or unwound.
struct TakenPools<'r, const N: usize> {
    registry: &'r mut EntityRegistry,
    joined_ids: [ComponentTypeID; N],
    joined: Vec<TypedByteArena>,
    tags: Vec<(ComponentTypeID, TypedByteArena)>,
}

impl<'r, const N: usize> TakenPools<'r, N> {
    /// Take every joined pool and every tag pool, in order. Returns false if
    /// any of them does not exist.
    fn take(&mut self, tags: &[ComponentTypeID]) -> bool {
        for type_id in self.joined_ids.iter() {
            match self.registry.take_arena(*type_id) {
                Some(arena) => self.joined.push(arena),
                None => return false,
            }
        }

        for tag in tags.iter() {
            match self.registry.take_arena(*tag) {
                Some(arena) => self.tags.push((*tag, arena)),
                None => return false,
            }
        }

        true
    }
}

impl<'r, const N: usize> Drop for TakenPools<'r, N> {
    fn drop(&mut self) {
        for (type_id, arena) in self.joined_ids.iter().zip(self.joined.drain(..)) {
            self.registry.restore_arena(*type_id, arena);
        }

        for (type_id, arena) in self.tags.drain(..) {
            self.registry.restore_arena(type_id, arena);
        }

        self.registry.required_tags.clear();
    }
}

impl<'a> Query<'a> {
    /// Require that visited entities carry the tag `T`.
    pub fn with_tag<T: Tag>(self) -> Self {
        self.registry.required_tags.push(T::type_id());
        self
    }

    /// Return the tags the next traversal will require.
    pub fn required_tags(&self) -> &[ComponentTypeID] {
        &self.registry.required_tags
    }

    /// Take the joined pools out of the registry, run `traverse` over them and
    /// put them back.
    ///
    /// If any joined or tag pool does not exist yet, nothing is visited.
    /// Required tags are cleared in every case, including when `traverse`
    /// panics.
    fn join<const N: usize, F>(self, joined: [ComponentTypeID; N], traverse: F) -> Result<usize>
        where F: FnOnce(&mut [TypedByteArena; N], &RowFilter<'_>) -> Result<usize>
    {
        let registry = self.registry;
        let mut tags = std::mem::take(&mut registry.required_tags);

        for (idx, type_id) in joined.iter().enumerate() {
            if joined[..idx].contains(type_id) {
                return Err(Error::AliasedJoin(type_id.name()));
            }
        }

        // A tag which is also joined is already checked by the join itself.
        tags.retain(|tag| !joined.contains(tag));
        tags.sort();
        tags.dedup();

        let rows = registry.len();
        let mut pools = TakenPools {
            registry,
            joined_ids: joined,
            joined: Vec::with_capacity(N),
            tags: Vec::with_capacity(tags.len()),
        };

        if !pools.take(&tags) {
            log::trace!("join over {:?} has a missing pool, skipping", joined);
            return Ok(0);
        }

        let TakenPools { joined, tags, .. } = &mut pools;
        let filter = RowFilter {
            rows,
            tags: tags.as_slice(),
        };

        let result = match <&mut [TypedByteArena; N]>::try_from(joined.as_mut_slice()) {
            Ok(arenas) => traverse(arenas, &filter),
            Err(_) => Ok(0),
        };
        result
    }

    /// Call `action` for every entity with a component of type `A`.
    ///
    /// Returns the number of entities visited.
    pub fn for_each<A: Component>(self, mut action: impl FnMut(&mut A)) -> Result<usize> {
        self.for_each_entity(|_, a: &mut A| action(a))
    }

    /// Call `action` for every entity with a component of type `A`, passing the
    /// entity as well.
    pub fn for_each_entity<A: Component>(self, mut action: impl FnMut(Entity, &mut A)) -> Result<usize> {
        self.join([A::type_id()], |[a], filter| {
            let mut a = a.rows_mut::<A>()?;
            let mut visits = 0;

            for row in 0..filter.rows() {
                if !filter.accepts(row) {
                    continue;
                }

                if let Some(a) = a.get_mut(row) {
                    action(Entity::new(row), a);
                    visits += 1;
                }
            }

            Ok(visits)
        })
    }

    /// Call `action` for every entity with components of both types `A` and `B`.
    pub fn for_each2<A, B>(self, mut action: impl FnMut(&mut A, &mut B)) -> Result<usize>
        where A: Component, B: Component
    {
        self.join([A::type_id(), B::type_id()], |[a, b], filter| {
            let mut a = a.rows_mut::<A>()?;
            let mut b = b.rows_mut::<B>()?;
            let mut visits = 0;

            for row in 0..filter.rows() {
                if !(a.is_valid(row) && b.is_valid(row) && filter.accepts(row)) {
                    continue;
                }

                if let (Some(a), Some(b)) = (a.get_mut(row), b.get_mut(row)) {
                    action(a, b);
                    visits += 1;
                }
            }

            Ok(visits)
        })
    }

    /// Call `action` for every entity with components of types `A`, `B` and `C`.
    pub fn for_each3<A, B, C>(self, mut action: impl FnMut(&mut A, &mut B, &mut C)) -> Result<usize>
        where A: Component, B: Component, C: Component
    {
        self.join([A::type_id(), B::type_id(), C::type_id()], |[a, b, c], filter| {
            let mut a = a.rows_mut::<A>()?;
            let mut b = b.rows_mut::<B>()?;
            let mut c = c.rows_mut::<C>()?;
            let mut visits = 0;

            for row in 0..filter.rows() {
                if !(a.is_valid(row) && b.is_valid(row) && c.is_valid(row) && filter.accepts(row)) {
                    continue;
                }

                if let (Some(a), Some(b), Some(c)) = (a.get_mut(row), b.get_mut(row), c.get_mut(row)) {
                    action(a, b, c);
                    visits += 1;
                }
            }

            Ok(visits)
        })
    }
}

#[cfg(test)]
mod test {
    use bytemuck::{Pod, Zeroable};

    use super::*;
    use crate::{component, tag};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
    struct Position {
        x: f32,
        y: f32,
    }
    component!(Position);

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
    struct Velocity {
        x: f32,
        y: f32,
    }
    component!(Velocity);

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
    struct Quad {
        position: [f32; 2],
        size: [f32; 2],
    }
    component!(Quad);

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
    struct Mass(f32);
    component!(Mass);

    #[derive(Debug, Clone, Copy)]
    struct PlayerTag;
    tag!(PlayerTag);

    #[derive(Debug, Clone, Copy)]
    struct EnemyTag;
    tag!(EnemyTag);

    #[derive(Debug, Clone, Copy)]
    struct UnusedTag;
    tag!(UnusedTag);

    #[test]
    fn test_join_requires_all_components() {
        let mut registry = EntityRegistry::new();
        let e0 = registry.create_entity();
        let e1 = registry.create_entity();
        registry.add_component(e0, Position { x: 0.0, y: 0.0 }).unwrap();
        registry.add_component(e0, Velocity { x: 1.0, y: 2.0 }).unwrap();
        registry.add_component(e1, Position { x: 5.0, y: 5.0 }).unwrap();

        let mut visited = Vec::new();
        let visits = registry.query().for_each2(|p: &mut Position, v: &mut Velocity| {
            p.x += v.x;
            p.y += v.y;
            visited.push(*p);
        }).unwrap();

        assert_eq!(visits, 1);
        assert_eq!(visited, vec![Position { x: 1.0, y: 2.0 }]);
        assert_eq!(registry.get_component::<Position>(e0), Some(Position { x: 1.0, y: 2.0 }));
        assert_eq!(registry.get_component::<Position>(e1), Some(Position { x: 5.0, y: 5.0 }));
    }

    #[test]
    fn test_tag_filter() {
        let mut registry = EntityRegistry::new();
        let e0 = registry.create_entity();
        let e1 = registry.create_entity();
        registry.add_tag(e0, PlayerTag).unwrap();
        registry.add_component(e0, Quad::default()).unwrap();
        registry.add_component(e1, Quad::default()).unwrap();

        let mut visited = Vec::new();
        registry.query()
            .with_tag::<PlayerTag>()
            .for_each_entity(|e, _: &mut Quad| visited.push(e))
            .unwrap();
        assert_eq!(visited, vec![e0]);

        let visits = registry.query().for_each(|_: &mut Quad| {}).unwrap();
        assert_eq!(visits, 2);
    }

    #[test]
    fn test_tags_cleared_after_traversal() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.add_component(e, Quad::default()).unwrap();

        // Nothing matches, the tags are still cleared.
        registry.query().with_tag::<EnemyTag>().for_each(|_: &mut Quad| {}).unwrap();
        assert!(registry.query().required_tags().is_empty());

        // A missing pool visits nothing and still clears.
        let visits = registry.query().with_tag::<PlayerTag>().for_each(|_: &mut Mass| {}).unwrap();
        assert_eq!(visits, 0);
        assert!(registry.query().required_tags().is_empty());

        // Tags declared without a traversal carry over to the next one.
        registry.query().with_tag::<PlayerTag>();
        assert_eq!(registry.query().required_tags(), &[PlayerTag::type_id()]);
        assert_eq!(registry.query().for_each(|_: &mut Quad| {}).unwrap(), 0);
        assert_eq!(registry.query().for_each(|_: &mut Quad| {}).unwrap(), 1);
    }

    #[test]
    fn test_tag_without_pool_matches_nothing() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.add_component(e, Mass(1.0)).unwrap();

        let visits = registry.query().with_tag::<UnusedTag>().for_each(|_: &mut Mass| {}).unwrap();
        assert_eq!(visits, 0);
    }

    #[test]
    fn test_joined_tag() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.add_tag(e, PlayerTag).unwrap();

        let visits = registry.query().with_tag::<PlayerTag>().for_each(|_: &mut PlayerTag| {}).unwrap();
        assert_eq!(visits, 1);
    }

    #[test]
    fn test_aliased_join() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.add_component(e, Mass(1.0)).unwrap();

        let result = registry.query()
            .with_tag::<PlayerTag>()
            .for_each2(|_: &mut Mass, _: &mut Mass| {});
        assert!(matches!(result, Err(Error::AliasedJoin(_))));
        assert!(registry.query().required_tags().is_empty());
        assert_eq!(registry.get_component::<Mass>(e), Some(Mass(1.0)));
    }

    #[test]
    fn test_panic_restores_pools() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.add_component(e, Mass(7.0)).unwrap();
        registry.add_component(e, Velocity { x: 1.0, y: 1.0 }).unwrap();
        registry.add_tag(e, PlayerTag).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.query()
                .with_tag::<PlayerTag>()
                .for_each2(|_: &mut Mass, _: &mut Velocity| panic!("action failed"))
        }));
        assert!(result.is_err());

        assert_eq!(registry.get_component::<Mass>(e), Some(Mass(7.0)));
        assert_eq!(registry.get_component::<Velocity>(e), Some(Velocity { x: 1.0, y: 1.0 }));
        assert!(registry.has_component::<PlayerTag>(e));
        assert!(registry.query().required_tags().is_empty());
        assert_eq!(registry.arena::<Mass>().map(|a| a.len()), Some(registry.len()));

        let other = registry.create_entity();
        registry.add_component(other, Mass(3.0)).unwrap();
        let mut masses = Vec::new();
        registry.query().for_each(|m: &mut Mass| masses.push(m.0)).unwrap();
        assert_eq!(masses, vec![7.0, 3.0]);
    }

    #[test]
    fn test_repeated_tag() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.add_component(e, Mass(1.0)).unwrap();
        registry.add_tag(e, EnemyTag).unwrap();

        let visits = registry.query()
            .with_tag::<EnemyTag>()
            .with_tag::<EnemyTag>()
            .for_each(|_: &mut Mass| {})
            .unwrap();
        assert_eq!(visits, 1);
        assert!(registry.has_component::<EnemyTag>(e));
    }

    #[test]
    fn test_visited_entity_owns_its_data() {
        let mut registry = EntityRegistry::new();
        let entities: Vec<Entity> = (0..6).map(|_| registry.create_entity()).collect();
        for e in entities.iter() {
            registry.add_component(*e, Position { x: e.id() as f32, y: 0.0 }).unwrap();
            if e.id() % 2 == 0 {
                registry.add_component(*e, Velocity { x: e.id() as f32 * 10.0, y: 0.0 }).unwrap();
            }
        }

        let mut positions = Vec::new();
        registry.query().for_each_entity(|e, p: &mut Position| positions.push((e, *p))).unwrap();

        let mut paired = Vec::new();
        for (e, p) in positions {
            if let Some(v) = registry.get_component::<Velocity>(e) {
                paired.push((e.id(), p.x, v.x));
            }
        }
        assert_eq!(paired, vec![(0, 0.0, 0.0), (2, 2.0, 20.0), (4, 4.0, 40.0)]);
    }

    #[test]
    fn test_three_way_join() {
        let mut registry = EntityRegistry::new();
        let entities: Vec<Entity> = (0..5).map(|_| registry.create_entity()).collect();
        for e in entities.iter() {
            registry.add_component(*e, Position::default()).unwrap();
            registry.add_component(*e, Velocity { x: 1.0, y: 0.0 }).unwrap();
        }
        registry.add_component(entities[1], Mass(2.0)).unwrap();
        registry.add_component(entities[4], Mass(4.0)).unwrap();
        registry.destroy_entity(entities[4]);

        let visits = registry.query().for_each3(|p: &mut Position, v: &mut Velocity, m: &mut Mass| {
            p.x += v.x * m.0;
        }).unwrap();

        assert_eq!(visits, 1);
        assert_eq!(registry.get_component::<Position>(entities[1]), Some(Position { x: 2.0, y: 0.0 }));
    }

    #[test]
    fn test_ascending_order() {
        let mut registry = EntityRegistry::new();
        let entities: Vec<Entity> = (0..10).map(|_| registry.create_entity()).collect();
        for e in entities.iter() {
            registry.add_component(*e, Mass(e.id() as f32)).unwrap();
        }
        registry.destroy_entity(entities[2]);
        registry.destroy_entity(entities[7]);
        let reused = registry.create_entity();
        registry.add_component(reused, Mass(100.0)).unwrap();

        let mut order = Vec::new();
        registry.query().for_each_entity(|e, _: &mut Mass| order.push(e.id())).unwrap();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5, 6, 8, 9]);
    }

    #[test]
    fn test_join_matches_predicate() {
        let mut registry = EntityRegistry::new();
        let entities: Vec<Entity> = (0..64).map(|_| registry.create_entity()).collect();

        let mut seed = 0x2545_f491u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for e in entities.iter() {
            let bits = next();
            if bits & 1 != 0 {
                registry.add_component(*e, Position { x: e.id() as f32, y: 0.0 }).unwrap();
            }
            if bits & 2 != 0 {
                registry.add_component(*e, Velocity::default()).unwrap();
            }
            if bits & 4 != 0 {
                registry.add_tag(*e, PlayerTag).unwrap();
            }
            if bits & 8 != 0 {
                registry.add_tag(*e, EnemyTag).unwrap();
            }
            if bits & 16 != 0 {
                registry.remove_component::<Position>(*e);
            }
            if bits & 0x300 == 0x300 {
                registry.destroy_entity(*e);
            }
        }

        for (player, enemy) in [(false, false), (true, false), (false, true), (true, true)] {
            let expected: Vec<usize> = entities.iter()
                .filter(|e| registry.has_component::<Position>(**e) && registry.has_component::<Velocity>(**e))
                .filter(|e| !player || registry.has_component::<PlayerTag>(**e))
                .filter(|e| !enemy || registry.has_component::<EnemyTag>(**e))
                .map(|e| e.id())
                .collect();

            let mut query = registry.query();
            if player {
                query = query.with_tag::<PlayerTag>();
            }
            if enemy {
                query = query.with_tag::<EnemyTag>();
            }

            let mut visited = Vec::new();
            query.for_each2(|p: &mut Position, _: &mut Velocity| visited.push(p.x as usize)).unwrap();

            assert_eq!(visited, expected);
            assert!(registry.query().required_tags().is_empty());
        }
    }
}
