//! A single deferrable unit of work.
//!
//! A [`Task`] owns nothing the scheduler allocates: it embeds its own
//! intrusive [`Links`], its fire-time, and a deferred call the caller
//! supplies at [`Task::new`] time. The scheduler never frees a `Task`;
//! callers are expected to place them in `'static` storage (a global,
//! or something deliberately leaked at startup): a flat `&'static`
//! slice of tasks rather than anything heap-managed.
//!
//! Every field the scheduler touches after construction is wrapped in
//! [`Cell`] so that the scheduler (a process-wide singleton reached
//! through a shared reference from both foreground code and (for the
//! ISR ring only) interrupt context) can schedule, fire, and
//! reschedule a task without needing a unique `&mut Task`. This
//! mirrors the scheduler's own interior-mutable design (see
//! `scheduler.rs`): the safety of sharing a `&Task` this way rests on
//! the same single-threaded cooperative contract, not on the type
//! system.

use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

use crate::list::{Linked, Links};
use crate::time::Timestamp;

cfg_if::cfg_if! {
    if #[cfg(feature = "profiling")] {
        /// Per-task invocation counters, present only when the
        /// `profiling` feature is enabled so that release builds pay
        /// no per-task overhead.
        #[derive(Copy, Clone, Debug, Default)]
        pub struct Profile {
            pub invocations: u32,
            pub total_ticks: u64,
            pub max_ticks: u32,
            pub name: &'static str,
        }
    }
}

/// A context pointer plus a two-argument callable, invoked as
/// `callable(context, arg)` when the task fires. `arg` is always
/// `None` when the scheduler itself invokes the call (from `step`);
/// a non-`None` argument is reserved for callers that invoke a task's
/// deferred call directly, outside the scheduler.
///
/// The function pointer is `unsafe fn` because the scheduler has no
/// way to verify that `context` is a valid pointer of whatever type
/// the callable expects to receive back; that contract is between
/// the caller who built the `Task` and the callable itself.
pub type TaskFn = unsafe fn(context: *mut (), arg: Option<*mut ()>);

/// A deferrable unit of work with a fire-time and an intrusive link.
pub struct Task {
    pub(crate) links: Links<Task>,
    fire_time: Cell<Timestamp>,
    callable: TaskFn,
    context: *mut (),
    #[cfg(feature = "profiling")]
    profile: Cell<Profile>,
}

// SAFETY: every field mutated after construction is a `Cell`, and the
// crate's contract is that only single-threaded foreground code ever
// calls the non-`isr_*` entries that reach a `Task`; the ISR ring only
// ever hands a `NonNull<Task>` across the boundary without
// dereferencing it (invariant I5), so `Task` is never actually
// accessed from two execution contexts at once even though `Sync`
// lets the borrow checker believe it could be shared.
unsafe impl Sync for Task {}

unsafe impl Linked for Task {
    fn links(ptr: NonNull<Self>) -> NonNull<Links<Self>> {
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr.as_ptr()).links)) }
    }
}

impl Task {
    /// Builds a new, unscheduled task around `callable`/`context`.
    /// `name` is only stored when `profiling` is enabled.
    #[must_use]
    pub const fn new(
        callable: TaskFn,
        context: *mut (),
        #[cfg_attr(not(feature = "profiling"), allow(unused_variables))] name: &'static str,
    ) -> Self {
        Task {
            links: Links::new(),
            fire_time: Cell::new(Timestamp::ZERO),
            callable,
            context,
            #[cfg(feature = "profiling")]
            profile: Cell::new(Profile {
                invocations: 0,
                total_ticks: 0,
                max_ticks: 0,
                name,
            }),
        }
    }

    #[must_use]
    pub fn fire_time(&self) -> Timestamp {
        self.fire_time.get()
    }

    pub(crate) fn set_fire_time(&self, t: Timestamp) {
        self.fire_time.set(t);
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        !self.links.is_unlinked()
    }

    /// Invokes the deferred call. Does not touch profiling counters;
    /// callers that want this invocation profiled must time it
    /// themselves and pass the result to [`Task::record`] afterward,
    /// since this module has no clock of its own.
    pub(crate) fn invoke(&self, arg: Option<*mut ()>) {
        // SAFETY: `context` was supplied by whoever built this `Task`
        // and is only ever passed back to the same `callable`.
        unsafe { (self.callable)(self.context, arg) };
    }

    /// Records one invocation's elapsed ticks against this task's
    /// profiling counters. No-op unless `profiling` is enabled. Must
    /// be called after the invocation it accounts for actually ran,
    /// not before, or the accumulated counters are meaningless.
    #[cfg_attr(not(feature = "profiling"), allow(unused_variables))]
    pub(crate) fn record(&self, elapsed_ticks: u32) {
        #[cfg(feature = "profiling")]
        {
            let mut p = self.profile.get();
            p.invocations = p.invocations.saturating_add(1);
            p.total_ticks = p.total_ticks.saturating_add(u64::from(elapsed_ticks));
            if elapsed_ticks > p.max_ticks {
                p.max_ticks = elapsed_ticks;
            }
            self.profile.set(p);
        }
    }

    #[cfg(feature = "profiling")]
    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile.get()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Task");
        s.field("fire_time", &self.fire_time.get());
        s.field("scheduled", &self.is_scheduled());
        #[cfg(feature = "profiling")]
        s.field("name", &self.profile.get().name);
        s.finish()
    }
}
