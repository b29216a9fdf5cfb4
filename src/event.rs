use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A single process lifecycle notification retrieved from the driver.
///
/// Held by value everywhere; two events are the same notification exactly
/// when all three fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEvent {
    pub parent_pid: u32,
    pub pid: u32,
    pub is_creation: bool,
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_creation {
            write!(
                f,
                "process created: PID={:#010x} (parent {:#010x})",
                self.pid, self.parent_pid
            )
        } else {
            write!(f, "process terminated: PID={:#010x}", self.pid)
        }
    }
}

/// Opaque user data forwarded unchanged on every dispatch.
pub type EventContext = dyn Any + Send + Sync;

/// Application-supplied receiver for delivered events.
///
/// Called once per event, on the queue's consumer thread, in the exact
/// order the driver raised them. Implementations must not call back into
/// `ProcessMonitor::start_monitoring`/`stop_monitoring`.
pub trait ProcessEventHandler: Send + Sync {
    fn on_process_event(&self, event: &ProcessEvent, context: Option<&Arc<EventContext>>);
}
