use std::collections::HashMap;
use std::io::Write;

use bytemuck::{Pod, Zeroable};

use pooled::{component, tag, Context, Entity, Error, Simulation, UpdateUnit};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Position(f32, f32);
component!(Position);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Velocity(f32, f32);
component!(Velocity);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Mass(f32);
component!(Mass);

/// Bodies which still attract others.
#[derive(Debug, Clone, Copy)]
pub struct Attracting;
tag!(Attracting);

#[derive(Debug, Clone, Copy)]
struct Physics {
    g: f32,
    time_step: f32,
}

struct Canvas {
    dest: Box<dyn Write>,
    last_positions: HashMap<Entity, (f32, f32)>,
}

struct ApplyAcceleration;

impl UpdateUnit<Canvas> for ApplyAcceleration {
    fn execute(&mut self, ctx: &mut Context<'_>, _canvas: &mut Canvas, _elapsed: f32) -> pooled::Result<()> {
        let physics = ctx.get_resource::<Physics>()
            .ok_or_else(|| Error::unit("accelerate", "missing physics constants"))?;

        let mut positions = Vec::new();
        ctx.query()
            .with_tag::<Attracting>()
            .for_each_entity(|e, p: &mut Position| positions.push((e, *p)))?;
        let bodies: Vec<_> = positions.into_iter()
            .filter_map(|(e, p)| ctx.get_component::<Mass>(e).map(|m| (e, p, m)))
            .filter(|(_, _, Mass(m))| *m >= 0.00001)
            .collect();
        let own_positions: HashMap<_, _> = bodies.iter().map(|(e, p, _)| (*e, *p)).collect();

        let Context { registry, commands, .. } = ctx;
        registry.query()
            .with_tag::<Attracting>()
            .for_each_entity(|id_a, Velocity(vx_a, vy_a): &mut Velocity| {
                let Some(&Position(x_a, y_a)) = own_positions.get(&id_a) else {
                    return;
                };

                *vx_a = 0.0;
                *vy_a = 0.0;

                for &(id_b, Position(x_b, y_b), Mass(m_b)) in bodies.iter() {
                    if id_b == id_a {
                        continue;
                    }

                    let dx = x_b - x_a;
                    let dy = y_b - y_a;
                    let r2 = dx * dx + dy * dy;

                    // Bodies are overlapped!
                    if r2 < 0.0005 {
                        commands.set_component(id_a, &Mass(0.0));
                        commands.remove_component::<Attracting>(id_a);
                        return;
                    }

                    let a = (physics.g * m_b) / r2;
                    let r = r2.sqrt();
                    *vx_a += physics.time_step * ((dx * a) / r);
                    *vy_a += physics.time_step * ((dy * a) / r);
                }
            })?;

        Ok(())
    }

    fn name(&self) -> &str {
        "accelerate"
    }
}

struct ApplyVelocity;

impl UpdateUnit<Canvas> for ApplyVelocity {
    fn execute(&mut self, ctx: &mut Context<'_>, _canvas: &mut Canvas, _elapsed: f32) -> pooled::Result<()> {
        let time_step = ctx.resource::<Physics>().map_or(1.0, |p| p.time_step);
        ctx.query().for_each2(|Position(x, y): &mut Position, Velocity(vx, vy): &mut Velocity| {
            *x += time_step * *vx;
            *y += time_step * *vy;
        })?;
        Ok(())
    }

    fn name(&self) -> &str {
        "move"
    }
}

struct Render;

const SIZE: (i32, i32) = (500, 500);
const OFFSET: (f32, f32) = (250.0, 250.0);
const SCALE: (f32, f32) = (200.0, 200.0);
const FRAMES_PER_STROKE: u64 = 10;

impl UpdateUnit<Canvas> for Render {
    fn execute(&mut self, ctx: &mut Context<'_>, canvas: &mut Canvas, _elapsed: f32) -> pooled::Result<()> {
        if ctx.frame() % FRAMES_PER_STROKE != FRAMES_PER_STROKE - 1 {
            return Ok(());
        }

        let mut positions = Vec::new();
        ctx.query().for_each_entity(|e, p: &mut Position| positions.push((e, *p)))?;

        for (id, Position(x, y)) in positions {
            let Some(Velocity(vx, vy)) = ctx.get_component::<Velocity>(id) else {
                continue;
            };
            let v2 = (vx * vx + vy * vy).sqrt();
            let a = 1.0 - (v2 / 0.03).max(0.0).min(0.7);

            if let Some((lx, ly)) = canvas.last_positions.get(&id) {
                let x1 = lx * SCALE.0 + OFFSET.0;
                let y1 = ly * SCALE.1 + OFFSET.1;
                let x2 = x * SCALE.0 + OFFSET.0;
                let y2 = y * SCALE.1 + OFFSET.1;

                write!(&mut canvas.dest,
                       "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" style=\"stroke:rgba(255,0,0,{});stroke-width:1\" />",
                       x1, y1, x2, y2, a)
                    .map_err(|err| Error::unit("render", err))?;
            }

            canvas.last_positions.insert(id, (x, y));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "render"
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut sim = Simulation::builder()
        .resource(Physics { g: 10.0, time_step: 1.0 })
        .unit(ApplyAcceleration)
        .unit(ApplyVelocity)
        .unit(Render)
        .on_error(|err| log::error!("simulation failed: {}", err))
        .build();

    // Populate registry!
    {
        const SQRT_NUM_ENTITIES: usize = 2;
        const SCALE: f32 = 2.0 / ((SQRT_NUM_ENTITIES - 1) as f32);

        let commands = sim.commands_mut();
        for x in 0..SQRT_NUM_ENTITIES {
            for y in 0..SQRT_NUM_ENTITIES {
                let x = ((x as f32) * SCALE) - 1.0;
                let y = ((y as f32) * SCALE) - 1.0;

                let vx = y * 0.003;
                let vy = -x * 0.003;

                let id = commands.spawn();
                commands.set_component(id, &Mass(0.00001));
                commands.set_component(id, &Position(x, y));
                commands.set_component(id, &Velocity(vx, vy));
                commands.add_tag(id, Attracting);
            }
        }
    }

    const NUM_ITER: usize = 100;

    let mut canvas = Canvas {
        dest: Box::new(std::io::stdout()),
        last_positions: HashMap::new(),
    };

    write!(&mut canvas.dest, "<?xml version=\"1.0\" standalone=\"no\"?>\n")?;
    write!(&mut canvas.dest, "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.0//EN\" \"http://www.w3.org/TR/2001/REC-SVG-20010904/DTD/svg10.dtd\">\n")?;
    write!(&mut canvas.dest, "<svg xmlns=\"http://www.w3.org/2000/svg\" height=\"{}\" width=\"{}\">", SIZE.0, SIZE.1)?;
    write!(&mut canvas.dest, "<rect width=\"100%\" height=\"100%\" fill=\"black\"/>")?;

    for _ in 0..NUM_ITER * FRAMES_PER_STROKE as usize {
        sim.execute_all(&mut canvas, 1.0)?;
    }

    write!(&mut canvas.dest, "</svg>")?;
    Ok(())
}
