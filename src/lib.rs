//! A cooperative, single-threaded, run-to-completion task scheduler
//! core for resource-constrained targets.
//!
//! There is no preemption and no priority beyond fire-time order: the
//! main queue is a time-ordered intrusive list, interrupt handlers
//! hand work to foreground code through a lock-free ring rather than
//! touching the queue directly, and [`Scheduler::step`] runs at most
//! one task to completion before returning. Nothing here allocates;
//! every `Task` lives in storage the caller supplies and owns for the
//! life of the program.
//!
//! # Algorithm naivety
//!
//! Favor the straightforward data structure over the clever one, and
//! document the obligations an `unsafe` block relies on rather than
//! try to encode every one of them in the type system. `unsafe` is
//! confined to [`list`] and a handful of isolated pointer casts
//! elsewhere; everything built on top is a safe, if contract-bound,
//! API.
//!
//! # Feature flags
//!
//! - `profiling`: per-task invocation count, total and max runtime.
//! - `trace`: a fixed-capacity ring of recent scheduling events,
//!   readable through [`Scheduler::trace_log`].
//! - `std`: host-only, lets `cargo test` use heap-backed test
//!   fixtures. Never enable this for an embedded target.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod err;
pub mod idle;
pub mod list;
pub mod ring;
pub mod scheduler;
pub mod task;
pub mod time;
pub mod trace;

pub use err::SchedError;
pub use idle::default_idle_task;
pub use scheduler::{Scheduler, TaskStatus};
pub use task::{Task, TaskFn};
pub use time::{ClockSource, Duration, Timestamp};
pub use trace::Event;
