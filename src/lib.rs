//! Fine-grained reactive dataflow.
//!
//! [`Data`] and [`Accumulator`] hold values; a [`Computation`] re-runs
//! whenever a value it read during its last run changes. Propagation is
//! synchronous and glitch-free: within one tick every computation runs at most
//! once and never observes a half-updated input.
//!
//! ```
//! use tickflow::{Computation, Data};
//!
//! let name = Data::new("world");
//! let greeting = Computation::new({
//!     let name = name.clone();
//!     move || format!("hello {}", name.get())
//! })?;
//!
//! name.set("there")?;
//! assert_eq!(greeting.get(), "hello there");
//! # Ok::<(), tickflow::Error>(())
//! ```
//!
//! The engine state lives in a thread local: handles are `!Send` and every
//! thread runs its own graph.

pub mod macros;

mod arena;
mod r#async;
mod batch;
mod computation;
mod data;
mod error;
mod graph;
mod on;
mod propagate;
mod runtime;
mod scope;
mod r#trait;
mod value;

pub use arena::Key;
pub use batch::{event, in_batch};
pub use computation::{toplevel, Builder, Computation, Placement, Step};
pub use data::{Accumulator, Data};
pub use error::{Error, Result};
pub use graph::NodeId;
pub use on::{on, on_reduce, on_reduce_with};
pub use r#async::{Async, Ready, Tick};
pub use r#trait::{Body, Trait};
pub use runtime::{limits, set_limits, Limits};
pub use scope::{cleanup, dispose, hold, sample, Teardown};
pub use value::{Access, Value};
