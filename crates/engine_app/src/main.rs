//! # engine_app — demo driver
//!
//! Runs a small particle simulation on the tick engine:
//!
//! - `emitter` spawns a burst of particles on the first tick.
//! - `integrate` (parallel) moves every particle with a velocity.
//! - `age` (parallel) counts lifetimes down and despawns expired particles.
//! - `report` (serial) logs the live particle count and requests exit once
//!   every particle is gone.
//!
//! Worker count, tick rate, and tick limit come from `ENGINE_WORKERS`,
//! `ENGINE_TICK_RATE`, and `ENGINE_MAX_TICKS`.

use anyhow::Result;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine_app::{Environment, EnvironmentConfig};
use engine_component::{Component, SetOp, SetSpec};
use engine_system::{Command, CommandBatch, FnSystem, Pipeline};

const PARTICLES: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Position(Vec3);

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Velocity(Vec3);

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Remaining ticks before the particle expires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Lifetime(u32);

impl Component for Lifetime {
    fn type_name() -> &'static str {
        "Lifetime"
    }
}

fn build_pipeline() -> Result<Pipeline> {
    let emitter = Pipeline::new(FnSystem::new("emitter", Vec::new(), |ctx, _| {
        let mut batch = CommandBatch::new();
        if ctx.tick_id != 1 {
            return Ok(batch);
        }
        for i in 0..PARTICLES {
            let angle = i as f32 / PARTICLES as f32 * std::f32::consts::TAU;
            let command = Command::spawn()
                .with(&Position(Vec3::ZERO))?
                .with(&Velocity(Vec3::new(angle.cos(), angle.sin(), 0.0)))?
                .with(&Lifetime(30 + i % 30))?
                .build();
            batch.push(command)?;
        }
        Ok(batch)
    }))?;

    let integrate = Pipeline::new(FnSystem::new(
        "integrate",
        vec![
            SetSpec::new(SetOp::Intersect)
                .with_component::<Position>()
                .with_component::<Velocity>(),
        ],
        |ctx, access| {
            let dt = ctx.dt as f32;
            for row in access.rows(0) {
                let Some(velocity) = row.read::<Velocity>().map(|v| v.0) else {
                    continue;
                };
                if let Some(mut position) = row.write::<Position>() {
                    position.0 += velocity * dt;
                }
            }
            Ok(CommandBatch::new())
        },
    ))?;

    let age = Pipeline::new(FnSystem::new(
        "age",
        vec![SetSpec::unite([Lifetime::component_type_id()])],
        |_, access| {
            let mut batch = CommandBatch::new();
            for row in access.rows(0) {
                let remaining = row.read::<Lifetime>().map_or(0, |l| l.0);
                if remaining <= 1 {
                    batch.push(Command::despawn(row.entity()))?;
                } else {
                    batch.push(Command::update(row.entity(), &Lifetime(remaining - 1))?)?;
                }
            }
            Ok(batch)
        },
    ))?;

    let report = Pipeline::new(FnSystem::new(
        "report",
        vec![SetSpec::unite([Position::component_type_id()])],
        |ctx, access| {
            let live = access.rows(0).count();
            let mut batch = CommandBatch::new();
            if ctx.tick_id % 10 == 0 {
                info!(tick_id = ctx.tick_id, live, "particles");
            }
            if ctx.tick_id > 1 && live == 0 {
                batch.push(Command::Exit)?;
            }
            Ok(batch)
        },
    ))?;

    Ok(emitter
        .with_parallel(integrate)
        .with_parallel(age)
        .with_serial(report))
}

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let config = EnvironmentConfig::from_env()?;
    info!(?config, "engine starting");

    let mut env = Environment::new(config)?;
    env.register_component::<Position>()?;
    env.register_component::<Velocity>()?;
    env.register_component::<Lifetime>()?;
    env.set_root(build_pipeline()?)?;

    let ticks = env.run()?;

    info!(ticks, entities = env.world().entity_count(), "engine shut down");
    Ok(())
}
