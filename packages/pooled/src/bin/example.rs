use bytemuck::{Pod, Zeroable};

use pooled::{component, tag, EntityRegistry};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct MyComponent(i32);
component!(MyComponent);

#[derive(Debug, Clone, Copy)]
pub struct Highlighted;
tag!(Highlighted);

fn main() -> pooled::Result<()> {
    env_logger::init();

    let mut registry = EntityRegistry::new();
    let entity = registry.create_entity();
    registry.add_component(entity, MyComponent(3))?;
    registry.add_tag(entity, Highlighted)?;

    println!("entity: {}", entity);
    println!("component: {:?}", registry.get_component::<MyComponent>(entity));

    for type_id in registry.component_types() {
        if let Some(arena) = registry.arena_by_id(type_id) {
            println!("pool {:?}: {:?}", type_id, arena);
        }
    }

    let visited = registry.query()
        .with_tag::<Highlighted>()
        .for_each(|c: &mut MyComponent| c.0 *= 2)?;
    println!("visited {} highlighted entities", visited);

    registry.destroy_entity(entity);
    println!("after destroy: {:?}", registry.get_component::<MyComponent>(entity));
    Ok(())
}
