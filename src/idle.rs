//! The built-in idle task, invoked by `Scheduler::step` when nothing
//! in the main queue is runnable.

use crate::task::Task;

unsafe fn noop(_context: *mut (), _arg: Option<*mut ()>) {}

/// Returns a fresh no-op idle [`Task`]. Callers that want a custom
/// idle task (one that, say, enters a low-power sleep mode) build
/// their own `Task` and install it with `Scheduler::set_idle_task`;
/// this one is just the harmless default installed by `Scheduler::new`.
#[must_use]
pub fn default_idle_task() -> Task {
    Task::new(noop, core::ptr::null_mut(), "idle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_idle_task_is_unscheduled_and_callable() {
        let t = default_idle_task();
        assert!(!t.is_scheduled());
        t.invoke(None);
    }
}
