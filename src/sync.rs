use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Outcome of a composite wait on an [`EventGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Shutdown was requested; the waiter must exit its loop.
    Shutdown,
    /// Work is available (queued item or device signal).
    Ready,
}

#[derive(Default)]
struct GateState {
    shutdown: bool,
    ready: bool,
}

/// Composite {shutdown, ready} wait shared between a worker thread and
/// whoever feeds it work.
///
/// Both the queue consumer and the notification pump block on the same
/// two-way condition: "shutdown requested" or "work available". Shutdown
/// always wins and stays latched until the next `begin_cycle`; a `Ready`
/// wake consumes the ready flag, so one `raise` produces one wake.
pub struct EventGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl EventGate {
    pub fn new() -> Self {
        EventGate {
            state: Mutex::new(GateState::default()),
            cond: Condvar::new(),
        }
    }

    /// Signals that work is available and wakes the waiter.
    pub fn raise(&self) {
        let mut state = self.state.lock().unwrap();
        state.ready = true;
        self.cond.notify_all();
    }

    /// Clears a pending ready signal.
    ///
    /// Used by the queue consumer once it has observed the store empty, so
    /// a stale signal cannot trigger a spurious drain pass.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.ready = false;
    }

    /// Requests shutdown and wakes the waiter. Latched until `begin_cycle`.
    pub fn request_shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.cond.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }

    /// Clears both flags ahead of a fresh worker activation, so a previous
    /// stop/start cycle cannot leak a stale wake into the new thread.
    pub fn begin_cycle(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = false;
        state.ready = false;
    }

    /// Blocks until shutdown is requested or work becomes available.
    pub fn wait(&self) -> Wake {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.shutdown {
                return Wake::Shutdown;
            }
            if state.ready {
                state.ready = false;
                return Wake::Ready;
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Timed variant of [`wait`](Self::wait); `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Wake> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.shutdown {
                return Some(Wake::Shutdown);
            }
            if state.ready {
                state.ready = false;
                return Some(Wake::Ready);
            }
            let (guard, result) = self.cond.wait_timeout(state, timeout).unwrap();
            state = guard;
            if result.timed_out() {
                return None;
            }
        }
    }
}

impl Default for EventGate {
    fn default() -> Self {
        Self::new()
    }
}
