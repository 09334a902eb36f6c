//! The system contract and execution errors.
//!
//! A system declares its component sets once, when it is placed in a
//! pipeline, and is then updated once per tick with a read-only view of the
//! entities admitted into those sets. It never mutates world structure
//! directly; it returns a [`CommandBatch`] that the driver applies between
//! ticks.

use std::collections::TryReserveError;

use engine_component::{AccessView, ComponentAccess, ComponentError, Entity, SetSpec};

use crate::command::CommandBatch;
use crate::context::TickContext;

/// An error reported by a system update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SystemError {
    message: String,
}

impl SystemError {
    /// Create an error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TryReserveError> for SystemError {
    fn from(err: TryReserveError) -> Self {
        Self::new(format!("failed to grow command batch: {err}"))
    }
}

impl From<ComponentError> for SystemError {
    fn from(err: ComponentError) -> Self {
        Self::new(err.to_string())
    }
}

/// Errors that abort the execution of a pipeline tree for one tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// A system update returned an error.
    #[error("system '{system}' failed: {source}")]
    System {
        /// Name of the failing pipeline node.
        system: String,
        #[source]
        source: SystemError,
    },

    /// Growing a command batch failed.
    #[error("failed to grow command batch: {0}")]
    Alloc(#[from] TryReserveError),

    /// A system panicked on a worker thread.
    #[error("pipeline node '{node}' panicked: {message}")]
    TaskPanicked {
        /// Name of the panicking pipeline node.
        node: String,
        /// The panic payload, when it was a string.
        message: String,
    },
}

/// A unit of per-tick logic.
///
/// Systems are shared with worker threads and updated through `&self`; any
/// state a system keeps across ticks needs its own synchronisation.
pub trait System: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// The component sets this system operates on, in the order they are
    /// exposed through [`AccessView::set`].
    ///
    /// Called once, when the system is placed in a pipeline.
    fn component_sets(&self) -> Vec<SetSpec>;

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick; commands from this and every other system
    /// in the tree are discarded.
    fn update(&self, ctx: &TickContext, access: AccessView<'_>)
    -> Result<CommandBatch, SystemError>;

    /// Offer an entity to this system's sets. Returns `true` if any set
    /// admitted it.
    fn register_entity(&self, entity: Entity, access: &mut ComponentAccess) -> bool {
        access.register_entity(entity)
    }

    /// Withdraw an entity from this system's sets.
    fn unregister_entity(&self, entity: Entity, access: &mut ComponentAccess) {
        access.unregister_entity(entity);
    }
}

/// A [`System`] built from a closure.
pub struct FnSystem<F> {
    name: String,
    sets: Vec<SetSpec>,
    update_fn: F,
}

impl<F> FnSystem<F>
where
    F: Fn(&TickContext, AccessView<'_>) -> Result<CommandBatch, SystemError>
        + Send
        + Sync
        + 'static,
{
    /// Create a system named `name` over `sets`.
    #[must_use]
    pub fn new(name: impl Into<String>, sets: Vec<SetSpec>, update_fn: F) -> Self {
        Self {
            name: name.into(),
            sets,
            update_fn,
        }
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(&TickContext, AccessView<'_>) -> Result<CommandBatch, SystemError>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn component_sets(&self) -> Vec<SetSpec> {
        self.sets.clone()
    }

    fn update(
        &self,
        ctx: &TickContext,
        access: AccessView<'_>,
    ) -> Result<CommandBatch, SystemError> {
        (self.update_fn)(ctx, access)
    }
}

impl<F> std::fmt::Debug for FnSystem<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSystem")
            .field("name", &self.name)
            .field("sets", &self.sets)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use engine_component::ComponentTypeId;

    use super::*;

    #[test]
    fn test_fn_system_reports_declaration() {
        let spec = SetSpec::intersect([ComponentTypeId(1), ComponentTypeId(2)]);
        let system = FnSystem::new("movement", vec![spec.clone()], |_, _| {
            Ok(CommandBatch::new())
        });
        assert_eq!(system.name(), "movement");
        assert_eq!(system.component_sets(), vec![spec]);
    }

    #[test]
    fn test_fn_system_update_returns_closure_result() {
        let system = FnSystem::new("failing", Vec::new(), |ctx, _| {
            Err(SystemError::new(format!("tick {}", ctx.tick_id)))
        });
        let access = ComponentAccess::new();
        let err = system
            .update(&TickContext::new(3, 0.0), access.view())
            .unwrap_err();
        assert_eq!(err.message(), "tick 3");
    }

    #[test]
    fn test_execution_error_names_system() {
        let err = ExecutionError::System {
            system: "physics".into(),
            source: SystemError::new("diverged"),
        };
        assert_eq!(err.to_string(), "system 'physics' failed: diverged");
    }
}
