//! # engine_task
//!
//! Threading primitives for the tick engine.
//!
//! This crate provides:
//!
//! - [`Shared`] / [`WeakShared`] — thread-safe shared ownership with weak
//!   references that never resurrect a dropped value.
//! - [`WorkerPool`] — a fixed set of spin-polling worker threads with an
//!   inline fallback for nested fan-outs.
//! - [`Scheduler`] — a one-shot fan-out session that folds task results
//!   through a [`Combiner`].

pub mod pool;
pub mod scheduler;
pub mod shared;

pub use pool::{PoolError, Task, WorkerPool};
pub use scheduler::{Collect, Combiner, Latest, Scheduler};
pub use shared::{Shared, WeakShared};
