//! # engine_system
//!
//! Systems and the tree they run in.
//!
//! - [`System`] — declares component sets and turns a read-only
//!   [`AccessView`](engine_component::AccessView) into a [`CommandBatch`].
//! - [`Command`] / [`CommandTarget`] — deferred structural changes and the
//!   driver seam that applies them.
//! - [`Pipeline`] — a node with an optional system plus parallel and serial
//!   children, executed over an [`engine_task::WorkerPool`].
//!
//! ## Usage
//!
//! ```rust
//! use engine_system::{CommandBatch, FnSystem, Pipeline, TickContext};
//! use engine_task::{Shared, WorkerPool};
//!
//! let root = Pipeline::group("root")
//!     .with_parallel(
//!         Pipeline::new(FnSystem::new("noop", Vec::new(), |_, _| Ok(CommandBatch::new())))
//!             .unwrap(),
//!     );
//!
//! let pool = Shared::new(WorkerPool::new(2).unwrap());
//! let batch = root.execute(&TickContext::new(1, 0.016), &pool).unwrap();
//! assert!(batch.is_empty());
//! ```

pub mod command;
pub mod context;
pub mod pipeline;
pub mod system;

pub use command::{Command, CommandBatch, CommandError, CommandTarget, SpawnBuilder};
pub use context::TickContext;
pub use pipeline::{BatchCombiner, Pipeline};
pub use system::{ExecutionError, FnSystem, System, SystemError};
