//! # engine_app
//!
//! The driver of the tick engine. An [`Environment`] owns the [`World`]
//! (entities, component registry, component tables), the worker pool, and
//! the root [`Pipeline`](engine_system::Pipeline). Each tick it runs the tree
//! on the pool, then applies the returned commands on its own thread.
//!
//! ```rust
//! use engine_app::{Environment, EnvironmentConfig};
//! use engine_system::{CommandBatch, FnSystem, Pipeline};
//!
//! let config = EnvironmentConfig::default()
//!     .with_worker_count(2)
//!     .with_tick_rate(0.0)
//!     .with_max_ticks(3);
//! let mut env = Environment::new(config).unwrap();
//! env.set_root(
//!     Pipeline::new(FnSystem::new("noop", Vec::new(), |_, _| Ok(CommandBatch::new()))).unwrap(),
//! )
//! .unwrap();
//! assert_eq!(env.run().unwrap(), 3);
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod world;

pub use config::{ConfigError, EnvironmentConfig};
pub use environment::Environment;
pub use error::EnvError;
pub use world::World;
