//! The execution tree.
//!
//! A [`Pipeline`] node owns at most one system plus two lists of children.
//! Executing a node runs, in order:
//!
//! 1. its own system,
//! 2. all parallel children, fanned out over the worker pool and waited on,
//! 3. its serial children, one after another on the calling thread.
//!
//! Commands are concatenated in that order. The first error stops the node;
//! later stages do not run and the partial batch is dropped.
//!
//! Nodes are shared with worker threads through [`Shared`], so everything a
//! node does at tick time goes through `&self`. Entity registration happens
//! between ticks and takes the node's access lock for writing.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::RwLock;
use tracing::{debug, debug_span, trace};

use engine_component::{ComponentAccess, ComponentError, ComponentTables, Entity, SetSpec};
use engine_task::{Combiner, Scheduler, Shared, WorkerPool, pool::panic_message};

use crate::command::CommandBatch;
use crate::context::TickContext;
use crate::system::{ExecutionError, System};

/// A node of the execution tree.
pub struct Pipeline {
    name: String,
    system: Option<Box<dyn System>>,
    specs: Vec<SetSpec>,
    access: RwLock<ComponentAccess>,
    parallel: Vec<Shared<Pipeline>>,
    serial: Vec<Shared<Pipeline>>,
}

impl Pipeline {
    /// A node running `system`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::EmptySet`] if the system declares a set
    /// without component types.
    pub fn new(system: impl System) -> Result<Self, ComponentError> {
        Self::from_boxed(Box::new(system))
    }

    /// A node running an already boxed system.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::new`].
    pub fn from_boxed(system: Box<dyn System>) -> Result<Self, ComponentError> {
        let name = system.name().to_owned();
        let specs = system.component_sets();
        if specs.iter().any(SetSpec::is_empty) {
            return Err(ComponentError::EmptySet { owner: name });
        }
        Ok(Self {
            name,
            system: Some(system),
            specs,
            access: RwLock::new(ComponentAccess::new()),
            parallel: Vec::new(),
            serial: Vec::new(),
        })
    }

    /// A node with no system of its own, used to group children.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: None,
            specs: Vec::new(),
            access: RwLock::new(ComponentAccess::new()),
            parallel: Vec::new(),
            serial: Vec::new(),
        }
    }

    /// Add a child that runs concurrently with the other parallel children.
    #[must_use]
    pub fn with_parallel(mut self, child: Pipeline) -> Self {
        self.parallel.push(Shared::new(child));
        self
    }

    /// Add a child that runs after every parallel child and every earlier
    /// serial child.
    #[must_use]
    pub fn with_serial(mut self, child: Pipeline) -> Self {
        self.serial.push(Shared::new(child));
        self
    }

    /// The node name (its system's name, or the group name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if this node runs a system of its own.
    #[must_use]
    pub fn has_system(&self) -> bool {
        self.system.is_some()
    }

    /// Names of the parallel children, in insertion order.
    pub fn parallel_names(&self) -> impl Iterator<Item = &str> {
        self.parallel.iter().map(|child| child.name())
    }

    /// Names of the serial children, in execution order.
    pub fn serial_names(&self) -> impl Iterator<Item = &str> {
        self.serial.iter().map(|child| child.name())
    }

    /// Number of systems in this subtree.
    #[must_use]
    pub fn system_count(&self) -> usize {
        usize::from(self.system.is_some())
            + self
                .children()
                .map(|child| child.system_count())
                .sum::<usize>()
    }

    /// Number of entities admitted into this node's own sets.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.access.read().admitted_count()
    }

    /// Number of entities admitted into this node's set at `index`.
    #[must_use]
    pub fn set_len(&self, index: usize) -> Option<usize> {
        self.access.read().set(index).map(|set| set.len())
    }

    /// Materialise every declared set in the subtree against `tables`.
    ///
    /// Rows from a previous binding are discarded; entities must be
    /// registered again afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::UnknownType`] if a declared type has no
    /// table.
    pub fn bind(&self, tables: &ComponentTables) -> Result<(), ComponentError> {
        for child in self.children() {
            child.bind(tables)?;
        }
        *self.access.write() = ComponentAccess::materialize(&self.name, &self.specs, tables)?;
        debug!(node = %self.name, sets = self.specs.len(), "pipeline node bound");
        Ok(())
    }

    /// Offer `entity` to every set in the subtree: parallel children, then
    /// serial children, then this node.
    ///
    /// Returns `true` if any set admitted it.
    pub fn register_entity(&self, entity: Entity) -> bool {
        let mut admitted = false;
        for child in self.children() {
            admitted |= child.register_entity(entity);
        }
        if let Some(system) = &self.system {
            admitted |= system.register_entity(entity, &mut self.access.write());
        }
        admitted
    }

    /// Withdraw `entity` from every set in the subtree.
    pub fn unregister_entity(&self, entity: Entity) {
        for child in self.children() {
            child.unregister_entity(entity);
        }
        if let Some(system) = &self.system {
            system.unregister_entity(entity, &mut self.access.write());
        }
    }

    /// Run the subtree for one tick and return its commands.
    ///
    /// Parallel children are enqueued on `pool`; when no worker is free the
    /// pool runs them inline, so nested fan-outs never deadlock.
    ///
    /// # Errors
    ///
    /// Returns the first [`ExecutionError`] raised in the subtree.
    pub fn execute(
        &self,
        ctx: &TickContext,
        pool: &Shared<WorkerPool>,
    ) -> Result<CommandBatch, ExecutionError> {
        let span = debug_span!(parent: ctx.span(), "pipeline", node = %self.name);
        let _entered = span.enter();
        let ctx = ctx.clone().with_span(span.clone());

        let mut batch = CommandBatch::new();

        if let Some(system) = &self.system {
            let access = self.access.read();
            let own = system
                .update(&ctx, access.view())
                .map_err(|source| ExecutionError::System {
                    system: self.name.clone(),
                    source,
                })?;
            batch.append(own)?;
        }

        if !self.parallel.is_empty() {
            let scheduler = Scheduler::with_combiner(pool.clone(), BatchCombiner::new());
            for child in &self.parallel {
                let child = child.clone();
                let ctx = ctx.clone();
                let pool = pool.clone();
                scheduler.enqueue(move || child.execute_contained(&ctx, &pool));
            }
            batch.append(scheduler.wait_for_completion().into_result()?)?;
        }

        for child in &self.serial {
            batch.append(child.execute(&ctx, pool)?)?;
        }

        trace!(commands = batch.len(), "pipeline node finished");
        Ok(batch)
    }

    /// [`Pipeline::execute`], with a panic anywhere on this thread turned
    /// into [`ExecutionError::TaskPanicked`].
    ///
    /// # Errors
    ///
    /// See [`Pipeline::execute`].
    pub fn execute_contained(
        &self,
        ctx: &TickContext,
        pool: &Shared<WorkerPool>,
    ) -> Result<CommandBatch, ExecutionError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.execute(ctx, pool))).unwrap_or_else(
            |payload| {
                Err(ExecutionError::TaskPanicked {
                    node: self.name.clone(),
                    message: panic_message(payload.as_ref()).to_owned(),
                })
            },
        )
    }

    fn children(&self) -> impl Iterator<Item = &Shared<Pipeline>> {
        self.parallel.iter().chain(&self.serial)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("has_system", &self.system.is_some())
            .field("specs", &self.specs)
            .field("parallel", &self.parallel)
            .field("serial", &self.serial)
            .finish()
    }
}

/// Concatenates the batches of parallel children in completion order and
/// keeps the first error.
#[derive(Debug, Default)]
pub struct BatchCombiner {
    batch: CommandBatch,
    error: Option<ExecutionError>,
}

impl BatchCombiner {
    /// An empty combiner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The combined batch, or the first error seen.
    ///
    /// # Errors
    ///
    /// Returns the first error any child reported.
    pub fn into_result(self) -> Result<CommandBatch, ExecutionError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.batch),
        }
    }
}

impl Combiner<Result<CommandBatch, ExecutionError>> for BatchCombiner {
    fn combine(&mut self, result: Result<CommandBatch, ExecutionError>) {
        if self.error.is_some() {
            return;
        }
        match result {
            Ok(batch) => {
                if let Err(err) = self.batch.append(batch) {
                    self.error = Some(err.into());
                }
            }
            Err(err) => self.error = Some(err),
        }
    }
}
