//! Wagner - name-based dependency injection and async task graph execution
//!
//! Tasks are registered on a [`Module`] under a name, together with the names
//! of the tasks they depend on. Invoking a [`Target`] resolves the tasks its
//! parameters name, runs each of them at most once and hands the values over.
//!
//! # Overview
//!
//! - Dependencies are resolved by name; cycles and missing names are reported
//!   before any producer runs
//! - A task is asynchronous if it was registered as such or depends on one
//! - [`Module::invoke`] runs synchronous graphs in dependency order
//! - [`Module::invoke_async`] launches every ready task in the same pass and
//!   fails on the first error
//! - Service tasks are memoized for the lifetime of their module
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use wagner::{BoxError, Locals, Module, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut module = Module::new("breakfast");
//!     module
//!         .register_service("bacon", &[], |_| Ok("bacon".to_string()))
//!         .register_async("eggs", &["bacon"], |args| async move {
//!             tokio::time::sleep(Duration::from_millis(5)).await;
//!             Ok::<_, BoxError>(format!("{} and eggs", args.get::<String>("bacon")?))
//!         });
//!
//!     let target = Target::new(&["eggs"], |args| args.get::<String>("eggs"));
//!     let meal = module.invoke_async(target, Locals::new())?.await??;
//!
//!     println!("{meal}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classifier;
pub mod combinators;
pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod module;
pub mod record;
pub mod resolver;
pub mod scope;
pub mod target;
pub mod task;
pub mod types;

pub use cache::ServiceCache;
pub use classifier::{Classification, Mode};
pub use combinators::{parallel, series, FanOut, ParallelError, SeriesError};
pub use context::{Args, Locals, Value};
pub use error::{
    ArgumentError, BoxError, ConfigError, ExecutionError, ModuleError, ResolveError, WagnerError, WagnerResult,
};
pub use executor::{Invocation, InvocationEvent, InvocationId};
pub use graph::Registry;
pub use module::{Module, Modules};
pub use scope::{ErrorScope, SharedError};
pub use target::Target;
pub use task::{AsyncProducer, Producer, SyncProducer, TaskDef, TaskKind};
pub use types::{InvocationStats, ModuleConfig};

use std::future::Future;
use std::pin::Pin;

/// A boxed future that is Send and can be used across thread boundaries
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// Re-export async_trait for implementing AsyncProducer
pub use async_trait::async_trait;
