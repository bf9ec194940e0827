//! Settle-once deferred results for single-threaded event loops.
//!
//! A [`DeferredResult`] stands for the outcome of an operation that completes
//! exactly once, either fulfilled with a value or rejected with a reason.
//! Handlers chained with [`then`](DeferredResult::then) run on an injected
//! scheduler after the current call stack unwinds. Containers returned from a
//! handler are flattened into the chain.
//!
//! ```
//! use deferred_result::{DeferredResult, EventLoop, HandlerResult, LoopConfig, Resolution};
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::with_config(LoopConfig::virtual_time());
//! let handle = event_loop.handle();
//!
//! let answer = DeferredResult::<i32, String>::resolve_delay(
//!     &handle,
//!     Resolution::Value(20),
//!     Duration::from_millis(5),
//! )
//! .map(|v| v * 2)
//! .and_then(|v| -> HandlerResult<i32, String> {
//!     if v > 100 {
//!         return Err(format!("{v} is too large"));
//!     }
//!     Ok(Resolution::Value(v + 2))
//! })
//! .catch(|_| Ok(Resolution::Value(0)));
//!
//! assert_eq!(event_loop.block_on(answer), Ok(Ok(42)));
//! ```
mod combinators;
pub mod config;
mod deferred;
pub mod scheduler;

pub use config::{ClockMode, LoopConfig};
pub use deferred::{DeferredResult, DeferredState, HandlerResult, Resolution, Resolver, Settlement};
pub use scheduler::{EventLoop, Handle, Schedule, Task};

use thiserror::Error;

/// Failures of the event loop itself. Rejections are never reported here.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("the event loop ran out of work before the future completed")]
    Stalled,
    #[error("the event loop exceeded its budget of {0} tasks")]
    BudgetExhausted(usize),
}
