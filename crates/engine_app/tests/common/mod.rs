//! Shared fixtures: a small movement simulation.

#![allow(dead_code)]

use engine_app::{World, WorldConfig};
use engine_component::{Component, Components, Entity, Query};
use engine_net::MessageType;
use serde::{Deserialize, Serialize};

pub const NAMESPACE: &str = "arena";
pub const BASE_MS: u64 = 1_700_000_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: i64,
    pub dy: i64,
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Far;

impl Component for Far {
    fn type_name() -> &'static str {
        "Far"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Steer {
    pub target: Entity,
    pub dx: i64,
    pub dy: i64,
}

pub type SteerMessage = MessageType<Steer, Position>;

pub fn config() -> WorldConfig {
    WorldConfig::default()
        .with_namespace(NAMESPACE)
        .with_verify_signatures(false)
}

/// A world that spawns three movers on tick 0, applies `steer` messages,
/// moves everything with a velocity, and tags movers past x = 5 as `Far`.
pub fn movement_world(config: WorldConfig) -> (World, SteerMessage) {
    let mut world = World::new(config);
    world.register_component::<Position>().unwrap();
    world.register_component::<Velocity>().unwrap();
    world.register_component::<Far>().unwrap();
    let steer = world.register_message::<Steer, Position>("steer").unwrap();

    world
        .register_init_system("spawn", |ctx| {
            for i in 0..3 {
                ctx.create(
                    Components::new()
                        .with(Position { x: i, y: 0 })
                        .with(Velocity { dx: 1, dy: i }),
                )?;
            }
            Ok(())
        })
        .unwrap();

    let handler = steer.clone();
    world
        .register_system("steer", move |ctx| {
            ctx.each_message(&handler, |ctx, msg| {
                let Steer { target, dx, dy } = *msg.value;
                ctx.set(target, &Velocity { dx, dy })?;
                Ok(ctx.get::<Position>(target)?)
            });
            Ok(())
        })
        .unwrap();

    let mut moving = Query::new(
        engine_cql::compile("CONTAINS(Position, Velocity)", world.components()).unwrap(),
    );
    world
        .register_system("movement", move |ctx| {
            let mut result = Ok(());
            ctx.each(&mut moving, |ctx, e| {
                let step = ctx.get::<Velocity>(e).and_then(|v| {
                    ctx.update::<Position>(e, |p| {
                        p.x += v.dx;
                        p.y += v.dy;
                    })
                });
                result = step;
                result.is_ok()
            });
            Ok(result?)
        })
        .unwrap();

    let mut near = Query::new(
        engine_cql::compile("CONTAINS(Position) & !CONTAINS(Far)", world.components()).unwrap(),
    );
    world
        .register_system("tag_far", move |ctx| {
            for e in ctx.entities(&mut near) {
                if ctx.get::<Position>(e)?.x > 5 {
                    ctx.add_component(e, &Far)?;
                }
            }
            Ok(())
        })
        .unwrap();

    (world, steer)
}

/// MessagePack image of a world's archetypes: layouts, entity order and
/// column bytes.
pub fn archetype_bytes(world: &World) -> Vec<u8> {
    let snapshot = world.store().snapshot(world.components());
    rmp_serde::to_vec_named(&snapshot.archetypes).unwrap()
}
