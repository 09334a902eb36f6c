//! Driver error type.

use engine_component::ComponentError;
use engine_system::{CommandError, ExecutionError};
use engine_task::PoolError;

use crate::config::ConfigError;

/// Errors surfaced by an [`Environment`](crate::Environment).
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// The pipeline tree failed during a tick.
    #[error("tick {tick_id} failed: {source}")]
    Execution {
        tick_id: u64,
        #[source]
        source: ExecutionError,
    },

    /// A command failed while being applied.
    #[error("tick {tick_id}: {kind} command failed: {source}")]
    Command {
        tick_id: u64,
        kind: &'static str,
        #[source]
        source: CommandError,
    },

    /// A direct world operation failed.
    #[error(transparent)]
    World(#[from] CommandError),

    /// A component could not be registered or a set could not be bound.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// The worker pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Configuration could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
