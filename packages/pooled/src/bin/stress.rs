use bytemuck::{Pod, Zeroable};

use pooled::{component, CommandBuffer, EntityRegistry};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct MyComponent(i32);
component!(MyComponent);

fn main() -> pooled::Result<()> {
    env_logger::init();

    let mut registry = EntityRegistry::new();
    let mut to_delete = Vec::new();

    for _ in 0..8 {
        let mut command_buffer = CommandBuffer::new();

        for id in to_delete.drain(..) {
            command_buffer.destroy(id);
        }

        for _ in 0..512 {
            let entity = command_buffer.spawn();
            command_buffer.set_component(entity, &MyComponent(32));
        }

        let spawned = command_buffer.apply(&mut registry)?;
        for (idx, entity) in spawned.into_iter().enumerate() {
            if idx % 12 == 11 {
                to_delete.push(entity);
            }
        }

        registry.query().for_each(|c: &mut MyComponent| c.0 += 1)?;
    }

    for entity in to_delete.drain(..) {
        registry.destroy_entity(entity);
    }

    let slots = registry.len();
    registry.compact();
    println!("live: {}, slots: {} -> {}", registry.live_count(), slots, registry.len());

    if let Some(arena) = registry.arena::<MyComponent>() {
        println!("pool: {} rows, {} valid, capacity {}", arena.len(), arena.valid_count(), arena.capacity());
    }

    Ok(())
}
