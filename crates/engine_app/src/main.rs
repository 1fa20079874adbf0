//! # engine_app: demo coordinator
//!
//! Runs a small arena world: players with health, an `attack` message that
//! damages a target, and a cleanup system removing the dead. A background
//! task submits attacks while the tick loop runs.
//!
//! Configuration comes from the environment (see [`WorldConfig::from_env`]);
//! log filtering from `RUST_LOG`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use engine_app::{MemoryStateStore, Rejection, TickConfig, TickLoop, World, WorldConfig, now_ms};
use engine_component::{Component, Components, Entity, Query};
use engine_net::{AcceptAll, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Health(i64);

impl Component for Health {
    fn type_name() -> &'static str {
        "Health"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Player {
    name: String,
}

impl Component for Player {
    fn type_name() -> &'static str {
        "Player"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Attack {
    target: Entity,
    damage: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AttackResult {
    remaining: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let config = WorldConfig::from_env()?;
    info!(namespace = %config.namespace, "engine coordinator starting");

    let mut world = World::new(config.clone())
        .with_verifier(Arc::new(AcceptAll))
        .with_state_store(Arc::new(MemoryStateStore::new()));
    world.register_component::<Health>()?;
    world.register_component::<Player>()?;
    let attack = world.register_message::<Attack, AttackResult>("attack")?;

    world.register_init_system("spawn_players", |ctx| {
        for name in ["ada", "grace", "linus"] {
            ctx.create(
                Components::new()
                    .with(Player { name: name.to_string() })
                    .with(Health(100)),
            )?;
        }
        Ok(())
    })?;

    let handler = attack.clone();
    world.register_system("combat", move |ctx| {
        ctx.each_message(&handler, |ctx, msg| {
            let Attack { target, damage } = *msg.value;
            ctx.update::<Health>(target, |h| h.0 -= damage)?;
            Ok(AttackResult {
                remaining: ctx.get::<Health>(target)?.0,
            })
        });
        Ok(())
    })?;

    let living_filter = engine_cql::compile("CONTAINS(Player, Health)", world.components())?;
    let mut living = Query::new(living_filter);
    world.register_system("cleanup", move |ctx| {
        let mut dead = Vec::new();
        ctx.each(&mut living, |ctx, entity| {
            if ctx.get::<Health>(entity).is_ok_and(|h| h.0 <= 0) {
                dead.push(entity);
            }
            true
        });
        for entity in dead {
            let player: Player = ctx.get(entity)?;
            info!(player = %player.name, tick = ctx.tick(), "player defeated");
            ctx.remove(entity)?;
        }
        Ok(())
    })?;

    world.start()?;
    let submitter = world.submitter()?;
    let mut ticks = world.subscribe_ticks();

    let tick_loop = TickLoop::new(
        world,
        TickConfig {
            tick_rate: 10.0,
            max_ticks: 50,
        },
    );

    // Entities are allocated from 1, in spawn order.
    let namespace = config.namespace.clone();
    let client = tokio::spawn(async move {
        let mut round = 0u64;
        while ticks.changed().await.is_ok() {
            round += 1;
            let body = Attack {
                target: Entity(round % 3 + 1),
                damage: 15,
            };
            let tx = match attack.encode(&body) {
                Ok(bytes) => Transaction::new("arena", namespace.as_str(), now_ms(), bytes),
                Err(e) => {
                    warn!(error = %e, "failed to encode attack");
                    continue;
                }
            };
            match submitter.submit(attack.id(), tx) {
                Ok(hash) => info!(%hash, round, "attack submitted"),
                Err(Rejection::Closed) => break,
                Err(reason) => warn!(%reason, "attack rejected"),
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    });

    let mut world = tick_loop.run().await?;
    world.stop();
    client.abort();

    let last = world.current_tick().saturating_sub(1);
    let receipts = world.receipts();
    for tick in receipts.oldest_tick().unwrap_or(last)..=last {
        for receipt in receipts.for_tick(tick).unwrap_or_default() {
            info!(
                tick,
                tx = %receipt.tx_hash,
                ok = receipt.is_success(),
                errors = ?receipt.errors,
                "receipt"
            );
        }
    }

    info!(
        ticks = world.current_tick(),
        entities = world.store().entity_count(),
        "engine coordinator shut down"
    );
    Ok(())
}
