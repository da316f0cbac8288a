//! # Tedio Scoped
//!
//! Lazy singletons bound to the currently executing logical task.
//!
//! ## Overview
//!
//! An [`Activator`] binds one instance of a type to each scope entry. The
//! instance is built from the arguments given when the scope was entered, on
//! first touch, and every access made inside that scope sees it. This includes
//! accesses made after the scope's future was suspended and resumed. An
//! interleaved task that entered with other arguments sees its own instance.
//! No handle is threaded through call signatures.
//!
//! ## Features
//!
//! - **🧵 Task-scoped**: the ambient carrier follows a future across every poll
//! - **💤 Lazy**: instances are built on first touch, per scope entry
//! - **🔁 Iterator-aware**: sync and async adapters re-enter their scope on each step
//!
//! ## Quick Start
//!
//! ```rust
//! use tedio_scoped::{ScopedClass, ScopeError, scoped};
//!
//! struct Greeter {
//!     name: String,
//! }
//!
//! impl ScopedClass for Greeter {
//!     type Args = String;
//!
//!     fn construct(name: &String) -> Self {
//!         Greeter { name: name.clone() }
//!     }
//! }
//!
//! let greeter = scoped::<Greeter>();
//! let greet = || greeter.with(|g| format!("Hello, {}", g.name));
//!
//! assert_eq!(greeter.run_in_context(greet, "Peter".into()), Ok("Hello, Peter".into()));
//! assert_eq!(greet(), Err(ScopeError::MissingContext));
//! ```
//!
//! Futures keep their scope across suspension points:
//!
//! ```rust
//! # use tedio_scoped::Activator;
//! use futures::executor::block_on;
//!
//! let counter = Activator::new(|start: &u32| *start);
//! let reader = counter.clone();
//! let value = block_on(counter.scope(async move { reader.with(|n| *n) }, 7));
//! assert_eq!(value, Ok(7));
//! ```

pub mod activator;
pub mod cache;
pub mod carrier;
pub mod error;
pub mod facade;
pub mod iter;
pub mod store;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used items for convenience
pub use activator::{Activator, ActivatorBuilder, ActivatorConfig, ScopedClass, scoped, scoped_builder};
pub use cache::Instance;
pub use carrier::{Carrier, CarrierId};
pub use error::{Result, ScopeError, StepError};
pub use facade::Facade;
pub use iter::{AdapterState, ContextIter, Generator, IterGenerator};
pub use store::{ContinuationStore, EnterGuard, InContext};
pub use stream::{AsyncGenerator, ContextAsyncIter, StreamGenerator};
