//! Promise/future pairs with blocking retrieval, continuations, pluggable
//! executors and combinators.
//!
//! A [`Promise`] publishes one value or error into a shared state. The state
//! is read through a single-owner [`Future`] or a copyable [`SharedFuture`].
//! Continuations attached with `then` run on the thread that resolves the
//! state unless the handle was given another [`Executor`] with `via`.
//!
//! ```
//! use promise_future::{when_all, Error, Promise};
//! use std::thread;
//!
//! let mut left = Promise::<u32>::new();
//! let mut right = Promise::<u32>::new();
//! let mut sum = when_all((left.get_future().unwrap(), right.get_future().unwrap()))
//!     .then(|(mut l, mut r)| -> Result<u32, Error> { Ok(l.get()? + r.get()?) })
//!     .unwrap();
//!
//! let task1 = thread::spawn(move || left.set_value(1).unwrap());
//! let task2 = thread::spawn(move || right.set_value(2).unwrap());
//! task1.join().expect("The task1 thread has panicked.");
//! task2.join().expect("The task2 thread has panicked.");
//! assert_eq!(sum.get().unwrap(), 3);
//! ```
mod chain;
pub mod combinator;
mod error;
pub mod executor;
pub mod pair;
pub mod poly;
mod state;

pub use chain::Resolve;
pub use combinator::{when_all, when_all_iter, when_any, when_any_iter, Completion, FutureSet};
pub use error::{Error, Exception};
pub use executor::{inline_executor, Closure, Executor, InlineExecutor, QueuedExecutor};
pub use pair::{make_exceptional_future, make_ready_future, Future, Promise};
pub use poly::SharedFuture;
