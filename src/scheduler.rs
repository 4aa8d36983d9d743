//! The scheduler: a time-ordered main queue, an ISR handoff ring, and
//! the `step` loop that ties them together.
//!
//! # Placement
//!
//! A [`Scheduler`] embeds its own main-queue sentinel and default idle
//! task, both of which become self-referential once [`Scheduler::init`]
//! runs (see `list.rs`'s sentinel contract). **A `Scheduler` must reach
//! its final memory address before `init` is called, and must never
//! move afterward** (place it in a `static`, behind a leaked `Box`,
//! or simply never move it off the stack frame it was constructed in).
//! In practice this means a `Scheduler` is used as a process-wide
//! singleton, much like a flat task table, always reached through
//! `&'static` references rather than anything that could be relocated
//! mid-lifetime.
//!
//! Every public entry takes `&self`: the scheduler is meant to be
//! reached through a single `&'static Scheduler` from both foreground
//! code and, for the `isr_*` entries only, real interrupt context.
//! That is safe because the two sides touch disjoint, interior-mutable
//! state (the ISR ring's atomics versus everything else's `Cell`s),
//! but it is a contract, not something the borrow checker verifies:
//! non-`isr_*` entries are not ISR-safe and must never be called from
//! an interrupt handler (see section 5 of the design notes).

use core::cell::Cell;
use core::ptr::NonNull;

#[cfg(feature = "trace")]
use core::cell::RefCell;

use crate::err::SchedError;
use crate::idle::default_idle_task;
use crate::list;
use crate::ring::{IsrItem, IsrRing};
use crate::task::Task;
use crate::time::{ClockSource, Duration, Timestamp};
#[cfg(feature = "trace")]
use crate::trace::Trace;
use crate::trace::Event;

/// Observable scheduling state of a task, as returned by
/// [`Scheduler::status`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    /// Unlinked and not the currently-running task.
    Idle,
    /// Linked in the main queue, fire-time still in the future.
    Scheduled,
    /// Linked in the main queue, fire-time due now or in the past.
    Runnable,
    /// Currently being invoked by `step`.
    Active,
}

unsafe fn sentinel_noop(_context: *mut (), _arg: Option<*mut ()>) {}

/// Cooperative, run-to-completion scheduler core.
///
/// `N` is the ISR ring's backing capacity; `N - 1` ISR-posted tasks
/// may be outstanding between two `step` calls (see
/// [`crate::ring::IsrRing`]).
pub struct Scheduler<const N: usize> {
    sentinel: Task,
    clock: Cell<&'static dyn ClockSource>,
    default_idle: Task,
    idle_task: Cell<Option<NonNull<Task>>>,
    current: Cell<Option<NonNull<Task>>>,
    isr_ring: IsrRing<N>,
    #[cfg(feature = "trace")]
    trace: RefCell<Trace>,
}

// SAFETY: the only field mutated from interrupt context is
// `isr_ring`, which is internally synchronized with atomics. Every
// other field is a plain `Cell` and is only ever touched by
// foreground code, which the crate's contract keeps single-threaded
// and non-reentrant (see the module-level doc comment).
unsafe impl<const N: usize> Sync for Scheduler<N> {}

impl<const N: usize> Scheduler<N> {
    /// Builds a scheduler around `clock`. The scheduler is not yet
    /// usable: call [`Scheduler::init`] once it has reached its final
    /// address.
    #[must_use]
    pub fn new(clock: &'static dyn ClockSource) -> Self {
        Scheduler {
            sentinel: Task::new(sentinel_noop, core::ptr::null_mut(), "<sentinel>"),
            clock: Cell::new(clock),
            default_idle: default_idle_task(),
            idle_task: Cell::new(None),
            current: Cell::new(None),
            isr_ring: IsrRing::new(),
            #[cfg(feature = "trace")]
            trace: RefCell::new(Trace::new()),
        }
    }

    /// Finishes constructing the scheduler: links the main-queue
    /// sentinel to itself and installs the default idle task. Must be
    /// called exactly once, after `self` is at its final address (see
    /// the placement contract on the type), before any other method.
    pub fn init(&self) {
        list::init_sentinel(self.sentinel_ptr());
        self.idle_task.set(Some(NonNull::from(&self.default_idle)));
        self.current.set(None);
    }

    /// Drains the ISR ring and unlinks every main-queue task without
    /// invoking any of them, leaving the scheduler as if freshly
    /// `init`ialized (idle task and clock source are left untouched).
    pub fn reset(&self) {
        while self.isr_ring.get().is_some() {}
        while list::pop_front(self.sentinel_ptr()).is_some() {}
        self.current.set(None);
    }

    fn sentinel_ptr(&self) -> NonNull<Task> {
        NonNull::from(&self.sentinel)
    }

    // --- clock source ----------------------------------------------

    pub fn set_clock_source(&self, clock: &'static dyn ClockSource) {
        self.clock.set(clock);
    }

    #[must_use]
    pub fn clock_source(&self) -> &'static dyn ClockSource {
        self.clock.get()
    }

    #[must_use]
    pub fn current_time(&self) -> Timestamp {
        self.clock.get().now()
    }

    // --- idle task ---------------------------------------------------

    pub fn set_idle_task(&self, task: &'static Task) {
        self.idle_task.set(Some(NonNull::from(task)));
    }

    #[must_use]
    pub fn idle_task(&self) -> &Task {
        unsafe { self.idle_task_ptr().as_ref() }
    }

    fn idle_task_ptr(&self) -> NonNull<Task> {
        self.idle_task
            .get()
            .expect("Scheduler::init must be called before use")
    }

    /// True iff the currently-installed idle task is the built-in
    /// no-op default rather than something installed via
    /// [`Scheduler::set_idle_task`].
    fn idle_task_is_default(&self) -> bool {
        self.idle_task_ptr() == NonNull::from(&self.default_idle)
    }

    #[must_use]
    pub fn default_idle_task(&self) -> &Task {
        &self.default_idle
    }

    // --- foreground scheduling -----------------------------------------

    /// Unlinks `task` if linked, sets its fire-time to `at`, and
    /// inserts it into the main queue in fire-time order. Not ISR-safe.
    /// See [`Scheduler::isr_task_at`].
    pub fn task_at(&self, task: &'static Task, at: Timestamp) {
        let ptr = NonNull::from(task);
        list::unlink(ptr);
        task.set_fire_time(at);
        self.insert_ordered(ptr);
        self.trace(Event::TaskScheduled { at });
    }

    /// Schedules `task` `d` after the current time.
    pub fn task_in(&self, task: &'static Task, d: Duration) {
        self.task_at(task, self.current_time() + d);
    }

    /// Schedules `task` to become runnable immediately.
    pub fn task_now(&self, task: &'static Task) {
        self.task_at(task, self.current_time());
    }

    /// Re-arms the currently-running task at the current time. Yields
    /// to any task already runnable ahead of it in the queue. Returns
    /// [`SchedError::NotFound`] if called outside a task's callable.
    pub fn reschedule_now(&self) -> Result<(), SchedError> {
        let cur = self.current.get().ok_or_else(|| {
            self.trace(Event::RescheduleNotFound);
            SchedError::NotFound
        })?;
        let at = self.current_time();
        unsafe { cur.as_ref() }.set_fire_time(at);
        self.insert_ordered(cur);
        self.trace(Event::TaskScheduled { at });
        Ok(())
    }

    /// Re-arms the currently-running task `d` after its *previous*
    /// fire-time, not the current time, so a periodic task keeps
    /// cadence even when a `step` happens to run late. Returns
    /// [`SchedError::NotFound`] if called outside a task's callable.
    pub fn reschedule_in(&self, d: Duration) -> Result<(), SchedError> {
        let cur = self.current.get().ok_or_else(|| {
            self.trace(Event::RescheduleNotFound);
            SchedError::NotFound
        })?;
        let task = unsafe { cur.as_ref() };
        let at = task.fire_time() + d;
        task.set_fire_time(at);
        self.insert_ordered(cur);
        self.trace(Event::TaskScheduled { at });
        Ok(())
    }

    /// Unlinks `task`. Returns [`SchedError::NotFound`] if it was not
    /// linked.
    pub fn remove(&self, task: &'static Task) -> Result<(), SchedError> {
        let ptr = NonNull::from(task);
        match list::unlink(ptr) {
            Some(_) => {
                self.trace(Event::TaskRemoved);
                Ok(())
            }
            None => Err(SchedError::NotFound),
        }
    }

    /// Scans from the head, stopping at the first existing task whose
    /// fire-time is strictly *after* `ptr`'s, and inserts `ptr` there.
    /// Ties resolve in favor of whatever was already queued, so tasks
    /// scheduled at the same fire-time run in insertion order.
    fn insert_ordered(&self, ptr: NonNull<Task>) {
        let new_time = unsafe { ptr.as_ref() }.fire_time();
        let sentinel = self.sentinel_ptr();
        let anchor = list::traverse(sentinel, |cand| {
            if new_time.precedes(unsafe { cand.as_ref() }.fire_time()) {
                Some(cand)
            } else {
                None
            }
        })
        .unwrap_or(sentinel);
        list::insert_before(anchor, ptr);
    }

    // --- ISR-safe entries ------------------------------------------------

    /// ISR-safe: wait-free, lock-free, touches only the handoff ring,
    /// never the main queue. Sets `task`'s fire-time immediately (the
    /// drain in the next `step` will not overwrite it).
    pub fn isr_task_at(&self, task: &'static Task, at: Timestamp) -> Result<(), SchedError> {
        task.set_fire_time(at);
        self.isr_ring.put(IsrItem {
            task: NonNull::from(task),
        })
    }

    pub fn isr_task_in(&self, task: &'static Task, d: Duration) -> Result<(), SchedError> {
        self.isr_task_at(task, self.current_time() + d)
    }

    pub fn isr_task_now(&self, task: &'static Task) -> Result<(), SchedError> {
        self.isr_task_at(task, self.current_time())
    }

    // --- stepping ----------------------------------------------------------

    fn drain_isr_ring(&self) {
        let mut count: u8 = 0;
        while let Some(item) = self.isr_ring.get() {
            list::unlink(item.task);
            self.insert_ordered(item.task);
            count = count.saturating_add(1);
        }
        if count > 0 {
            self.trace(Event::IsrDrained { count });
        }
    }

    /// Drains the ISR ring, then either advances the soonest-due
    /// runnable task or invokes the idle task. Consumes at most one
    /// main-queue task per call; the caller controls loop cadence.
    pub fn step(&self) {
        self.drain_isr_ring();

        let now = self.current_time();
        let sentinel = self.sentinel_ptr();
        match list::front(sentinel) {
            Some(head) if !unsafe { head.as_ref() }.fire_time().follows(now) => {
                list::unlink(head);
                self.current.set(Some(head));
                let task = unsafe { head.as_ref() };
                self.trace(Event::TaskFired { at: task.fire_time() });
                let start = self.current_time();
                task.invoke(None);
                let end = self.current_time();
                task.record(Self::elapsed(start, end));
                self.current.set(None);
            }
            _ => {
                self.trace(Event::IdleEntered);
                let idle = self.idle_task();
                if self.idle_task_is_default() {
                    // The built-in default has no meaningful runtime
                    // to track; skip timing it at all.
                    idle.invoke(None);
                } else {
                    let start = self.current_time();
                    idle.invoke(None);
                    let end = self.current_time();
                    idle.record(Self::elapsed(start, end));
                }
            }
        }
    }

    #[cfg(feature = "profiling")]
    fn elapsed(start: Timestamp, end: Timestamp) -> u32 {
        end.ticks().wrapping_sub(start.ticks())
    }

    #[cfg(not(feature = "profiling"))]
    fn elapsed(_start: Timestamp, _end: Timestamp) -> u32 {
        0
    }

    // --- observers -----------------------------------------------------------

    #[must_use]
    pub fn is_empty(&self) -> bool {
        list::is_empty(self.sentinel_ptr())
    }

    /// O(n): walks the main queue. For diagnostics, not the hot path.
    #[must_use]
    pub fn task_count(&self) -> usize {
        list::length(self.sentinel_ptr())
    }

    #[must_use]
    pub fn current_task(&self) -> Option<&Task> {
        self.current.get().map(|p| unsafe { p.as_ref() })
    }

    #[must_use]
    pub fn next_task(&self) -> Option<&Task> {
        list::front(self.sentinel_ptr()).map(|p| unsafe { p.as_ref() })
    }

    #[must_use]
    pub fn status(&self, task: &Task) -> TaskStatus {
        if self.current.get() == Some(NonNull::from(task)) {
            return TaskStatus::Active;
        }
        if !task.is_scheduled() {
            return TaskStatus::Idle;
        }
        if task.fire_time().follows(self.current_time()) {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Runnable
        }
    }

    #[cfg(feature = "trace")]
    #[must_use]
    pub fn trace_log(&self) -> core::cell::Ref<'_, Trace> {
        self.trace.borrow()
    }

    #[cfg(feature = "trace")]
    fn trace(&self, event: Event) {
        self.trace.borrow_mut().record(event);
    }

    #[cfg(not(feature = "trace"))]
    fn trace(&self, _event: Event) {}
}
