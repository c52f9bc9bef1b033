#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![doc(test(no_crate_inject, attr(deny(rust_2018_idioms))))]

//! A single-threaded cooperative event loop for composing deferred values.
//!
//! [`Promise<T>`] is a handle on a computation that will produce a `T`
//! later. Promises compose — transform them with [`Promise::map`] and
//! [`Promise::then`], race them with [`Promise::race`], fan them out with
//! [`Promise::fork`], detach them with [`daemonize`] — and the resulting
//! graph is driven by an [`EventLoop`] pinned to the current thread:
//! [`EventLoop::wait`] pumps events until the promise you hand it has a
//! result.
//!
//! Scheduling is cooperative and strictly ordered. A readiness
//! notification produced while an event is firing runs immediately after
//! that event (depth-first), so completion chains run back-to-back
//! without queue round-trips; [`yield_now`] instead goes to the back of
//! the line, letting everything already queued run first.
//!
//! Everything is bound to the loop's thread — the one exception is
//! [`WakeHandle`](sleep::WakeHandle), which may wake a sleeping loop from
//! anywhere. Cross-thread completion belongs to a higher layer built on
//! that hook.
//!
//! # Examples
//!
//! ```
//! use pledge::{EventLoop, Promise};
//!
//! let event_loop = EventLoop::new();
//!
//! let (promise, fulfiller) = pledge::pending::<String>();
//! let greeting = promise.map(|name| format!("hello, {}", name));
//!
//! fulfiller.fulfill("world".to_string()).unwrap();
//! assert_eq!(event_loop.wait(greeting).unwrap(), "hello, world");
//! ```

mod error;
mod event;
mod event_loop;
mod node;
mod promise;
mod queue;
pub mod sleep;
mod task_set;
mod trace;

pub use crate::error::Error;
pub use crate::event_loop::{daemonize, yield_now, EventLoop, LoopHandle};
pub use crate::node::adapter::Fulfiller;
pub use crate::promise::{pending, ForkedPromise, Promise};
pub use crate::task_set::{ErrorHandler, LoggingErrorHandler, TaskSet};
