//! The driver: world ownership and the tick loop.
//!
//! Each tick runs in two phases:
//!
//! 1. The root pipeline executes as a single task on the worker pool and the
//!    driver waits for it. Systems only read structure during this phase.
//! 2. The returned commands are applied in order on the driver thread. Every
//!    entity they touch is offered to the pipeline tree again, so component
//!    sets are up to date before the next tick starts.
//!
//! The loop stops after `max_ticks`, when a command requests exit, or on the
//! first error.

use std::time::{Duration, Instant};

use tracing::{debug, debug_span, info, trace, warn};

use engine_component::{BoxedComponent, Component, ComponentRecord, ComponentTypeId, Entity};
use engine_system::{CommandError, CommandTarget, ExecutionError, Pipeline, TickContext};
use engine_task::{Scheduler, Shared, WorkerPool};

use crate::config::EnvironmentConfig;
use crate::error::EnvError;
use crate::world::World;

/// Owns the world, the worker pool, and the root of the pipeline tree.
#[derive(Debug)]
pub struct Environment {
    /// Driver configuration.
    config: EnvironmentConfig,
    /// Workers shared by every pipeline node.
    pool: Shared<WorkerPool>,
    /// The canonical world state.
    world: World,
    /// Root of the execution tree, if one was installed.
    root: Option<Shared<Pipeline>>,
    /// Current tick counter.
    tick_id: u64,
    /// Set by an exit command; checked between ticks.
    exit_requested: bool,
}

impl Environment {
    /// Create an environment and start its worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Pool`] if a worker thread cannot be spawned.
    pub fn new(config: EnvironmentConfig) -> Result<Self, EnvError> {
        let pool = WorkerPool::new(config.resolved_worker_count())?;
        info!(
            workers = pool.worker_count(),
            tick_rate = config.tick_rate,
            max_ticks = config.max_ticks,
            "environment created"
        );
        Ok(Self {
            config,
            pool: Shared::new(pool),
            world: World::new(),
            root: None,
            tick_id: 0,
            exit_requested: false,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns a reference to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Returns the worker pool.
    #[must_use]
    pub fn pool(&self) -> &Shared<WorkerPool> {
        &self.pool
    }

    /// Returns the installed pipeline root.
    #[must_use]
    pub fn root(&self) -> Option<&Pipeline> {
        self.root.as_deref()
    }

    /// Register component type `T` and create its table.
    ///
    /// Types must be registered before a pipeline declaring them is
    /// installed, and before records of them can be decoded.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Component`] on a type id collision.
    pub fn register_component<T: Component>(&mut self) -> Result<bool, EnvError> {
        let added = self.world.register_component::<T>()?;
        if added {
            debug!(component = T::type_name(), "component registered");
        }
        Ok(added)
    }

    /// Install `root` as the pipeline tree.
    ///
    /// Every declared set is bound to the world's tables and every live
    /// entity is registered, so the tree starts in sync with the world.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Component`] if a set declares an unregistered
    /// type; the previous tree stays installed.
    pub fn set_root(&mut self, root: Pipeline) -> Result<(), EnvError> {
        root.bind(self.world.tables())?;
        let mut admitted = 0usize;
        for entity in self.world.entities() {
            if root.register_entity(entity) {
                admitted += 1;
            }
        }
        info!(
            root = root.name(),
            systems = root.system_count(),
            entities = self.world.entity_count(),
            admitted,
            "pipeline installed"
        );
        self.root = Some(Shared::new(root));
        Ok(())
    }

    /// Create an entity with `components`, outside of a tick.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::World`] if a component type is unregistered or
    /// repeated.
    pub fn spawn(&mut self, components: Vec<BoxedComponent>) -> Result<Entity, EnvError> {
        Ok(self.applier().spawn_boxed(components)?)
    }

    /// Destroy `entity`. Returns `false` if it did not exist.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.applier().despawn_entity(entity)
    }

    /// Attach `component` to `entity`, outside of a tick.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::World`] if the entity is unknown, already owns a
    /// `T`, or `T` is unregistered.
    pub fn insert_component<T: Component>(
        &mut self,
        entity: Entity,
        component: T,
    ) -> Result<(), EnvError> {
        Ok(self.applier().insert_boxed(entity, Box::new(component))?)
    }

    /// Detach `entity`'s `T` component. Returns `false` if it had none.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::World`] if the entity is unknown.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<bool, EnvError> {
        Ok(self
            .applier()
            .remove_type(entity, T::component_type_id())?)
    }

    /// Stop the run loop before the next tick.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    /// Returns `true` once exit has been requested.
    #[must_use]
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Run one tick and apply its commands.
    ///
    /// Returns the number of commands applied.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Execution`] if the pipeline fails (no command of
    /// the tick is applied), or [`EnvError::Command`] if a command fails
    /// (commands before it stay applied).
    pub fn tick(&mut self, dt: f64) -> Result<usize, EnvError> {
        self.tick_id += 1;
        let tick_id = self.tick_id;
        let span = debug_span!("tick", tick_id);
        let _entered = span.enter();

        let Some(root) = self.root.clone() else {
            trace!("no pipeline installed");
            return Ok(0);
        };

        let ctx = TickContext::new(tick_id, dt).with_span(span.clone());
        let root_name = root.name().to_owned();
        let scheduler = Scheduler::new(self.pool.clone());
        let pool = self.pool.clone();
        scheduler.enqueue(move || root.execute_contained(&ctx, &pool));

        let result = scheduler
            .wait_for_completion()
            .into_inner()
            .unwrap_or_else(|| {
                Err(ExecutionError::TaskPanicked {
                    node: root_name,
                    message: "root task produced no result".into(),
                })
            });
        let batch = result.map_err(|source| EnvError::Execution { tick_id, source })?;

        let applied = batch.len();
        let mut applier = self.applier();
        for command in &batch {
            command
                .apply(&mut applier)
                .map_err(|source| EnvError::Command {
                    tick_id,
                    kind: command.kind(),
                    source,
                })?;
        }

        debug!(
            tick_id,
            dt,
            commands = applied,
            entities = self.world.entity_count(),
            "tick complete"
        );
        Ok(applied)
    }

    /// Run ticks until `max_ticks` is reached or exit is requested.
    ///
    /// With a positive tick rate the loop sleeps out the remainder of each
    /// tick's budget and `dt` is the fixed budget; otherwise ticks run back
    /// to back and `dt` is the measured time since the previous tick.
    ///
    /// Returns the number of ticks run.
    ///
    /// # Errors
    ///
    /// Returns the first tick error; the loop stops there.
    pub fn run(&mut self) -> Result<u64, EnvError> {
        let budget = self.config.tick_duration();
        let mut tick_count = 0u64;
        let mut last = Instant::now();

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        while !self.exit_requested {
            let start = Instant::now();
            let dt = budget.map_or_else(|| start.duration_since(last), |budget| budget);
            last = start;

            self.tick(dt.as_secs_f64())?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                break;
            }

            if let Some(budget) = budget {
                pace(self.tick_id, start.elapsed(), budget);
            }
        }

        info!(
            ticks = tick_count,
            exit_requested = self.exit_requested,
            "tick loop complete"
        );
        Ok(tick_count)
    }

    fn applier(&mut self) -> Applier<'_> {
        Applier {
            world: &mut self.world,
            root: self.root.as_deref(),
            exit_requested: &mut self.exit_requested,
        }
    }
}

fn pace(tick_id: u64, elapsed: Duration, budget: Duration) {
    if elapsed < budget {
        std::thread::sleep(budget - elapsed);
    } else {
        warn!(
            tick_id,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "tick exceeded time budget"
        );
    }
}

/// World mutations that keep the pipeline tree's sets in sync.
struct Applier<'a> {
    world: &'a mut World,
    root: Option<&'a Pipeline>,
    exit_requested: &'a mut bool,
}

impl Applier<'_> {
    fn admit(&self, entity: Entity) {
        if let Some(root) = self.root {
            let admitted = root.register_entity(entity);
            trace!(%entity, admitted, "entity registered");
        }
    }

    fn spawn_boxed(&mut self, components: Vec<BoxedComponent>) -> Result<Entity, CommandError> {
        let entity = self.world.spawn(components)?;
        self.admit(entity);
        Ok(entity)
    }

    fn despawn_entity(&mut self, entity: Entity) -> bool {
        if !self.world.contains(entity) {
            return false;
        }
        if let Some(root) = self.root {
            root.unregister_entity(entity);
        }
        self.world.despawn(entity)
    }

    fn insert_boxed(
        &mut self,
        entity: Entity,
        component: BoxedComponent,
    ) -> Result<(), CommandError> {
        self.world.insert(entity, component)?;
        self.admit(entity);
        Ok(())
    }

    fn remove_type(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<bool, CommandError> {
        let removed = self.world.remove(entity, type_id)?;
        if removed {
            self.admit(entity);
        }
        Ok(removed)
    }
}

impl CommandTarget for Applier<'_> {
    fn spawn(&mut self, components: &[ComponentRecord]) -> Result<Entity, CommandError> {
        let components = components
            .iter()
            .map(|record| self.world.decode(record))
            .collect::<Result<Vec<_>, _>>()?;
        self.spawn_boxed(components)
    }

    fn despawn(&mut self, entity: Entity) -> Result<(), CommandError> {
        if !self.despawn_entity(entity) {
            debug!(%entity, "despawn of missing entity ignored");
        }
        Ok(())
    }

    fn insert_component(
        &mut self,
        entity: Entity,
        component: &ComponentRecord,
    ) -> Result<(), CommandError> {
        let component = self.world.decode(component)?;
        self.insert_boxed(entity, component)
    }

    fn remove_component(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<(), CommandError> {
        match self.remove_type(entity, type_id) {
            Ok(true) => {}
            Ok(false) | Err(CommandError::EntityNotFound(_)) => {
                debug!(%entity, %type_id, "removal of missing component ignored");
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    fn update_component(
        &mut self,
        entity: Entity,
        component: &ComponentRecord,
    ) -> Result<(), CommandError> {
        let component = self.world.decode(component)?;
        self.world.replace(entity, component)
    }

    fn request_exit(&mut self) {
        *self.exit_requested = true;
    }
}
