//! Scheduler error kinds.
//!
//! Every fallible scheduler entry returns `Result<T, SchedError>`.
//! Success is `Ok`; there is no "no error" variant of this enum, since
//! the absence of an `Err` already says that.

use core::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedError {
    /// An operation required a present task but none applied, e.g.
    /// observing the head of an empty main queue.
    Empty,
    /// The ISR ring is at capacity; the task was not enqueued.
    Full,
    /// `reschedule_now`/`reschedule_in` called with no currently-running
    /// task, or `remove` called on a task that was not linked.
    NotFound,
    /// A scheduling call received a null task reference. Reserved for
    /// front ends that pass tasks by raw pointer; the safe `&Task`
    /// API in this crate cannot actually produce this condition.
    NullTask,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::Empty => "no task available",
            SchedError::Full => "isr ring is full",
            SchedError::NotFound => "no matching task",
            SchedError::NullTask => "null task reference",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for SchedError {}
