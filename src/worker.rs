use log::{debug, error, warn};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;

use crate::sync::EventGate;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("worker activation hook failed: {0}")]
    Activation(String),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Work executed on a [`WorkerThread`].
///
/// `run` is the body of the thread and must exit promptly once the gate
/// reports shutdown. The hooks run on the controlling thread: the
/// activation hook before the thread is spawned (its failure aborts the
/// start), the deactivation hook after the thread has been joined.
pub trait Worker: Send + Sync + 'static {
    /// Acquires whatever the run routine needs before the thread exists.
    fn before_activate(&self) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Thread body. Expected to block on `gate` and exit on shutdown.
    fn run(&self, gate: &EventGate);

    /// Releases resources acquired by `before_activate`.
    fn after_deactivate(&self) {}

    /// Receives the payload of a panic caught at the thread boundary.
    ///
    /// The thread's managed state stays consistent either way; this hook
    /// only decides where the fault is reported.
    fn on_fault(&self, fault: &str) {
        error!("worker run routine faulted: {}", fault);
    }
}

#[derive(Default)]
struct LifecycleState {
    /// Single source of truth for "the OS thread is currently running".
    active: bool,
    /// Latches once the spawned thread has flipped `active` on, so a
    /// run routine that returns immediately cannot strand the starter.
    started: bool,
}

/// Active-flag storage, deliberately guarded by its own lock so lifecycle
/// queries never contend with whatever locks the run routine takes.
struct Lifecycle {
    state: Mutex<LifecycleState>,
    cond: Condvar,
}

impl Lifecycle {
    fn new() -> Self {
        Lifecycle {
            state: Mutex::new(LifecycleState::default()),
            cond: Condvar::new(),
        }
    }

    fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    fn set_active(&self, value: bool) {
        let mut state = self.state.lock().unwrap();
        state.active = value;
        if value {
            state.started = true;
        }
        self.cond.notify_all();
    }

    fn clear_started(&self) {
        self.state.lock().unwrap().started = false;
    }

    fn wait_started(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.started {
            state = self.cond.wait(state).unwrap();
        }
    }

    fn wait_inactive(&self) {
        let mut state = self.state.lock().unwrap();
        while state.active {
            state = self.cond.wait(state).unwrap();
        }
    }
}

/// Start/stop lifecycle manager for one OS thread running a [`Worker`].
///
/// At most one live thread exists per instance. `start` and `stop` are
/// meant to be driven from a single controlling thread; the monitor
/// orchestrator provides that serialization for the components it owns.
pub struct WorkerThread<W: Worker> {
    name: String,
    worker: Arc<W>,
    gate: Arc<EventGate>,
    lifecycle: Arc<Lifecycle>,
    handle: Option<JoinHandle<()>>,
}

impl<W: Worker> WorkerThread<W> {
    /// Wraps `worker` with the gate its run routine will block on. The
    /// gate is shared so producers (queue, device signal) can reach it.
    pub fn new(name: &str, worker: Arc<W>, gate: Arc<EventGate>) -> Self {
        WorkerThread {
            name: name.to_string(),
            worker,
            gate,
            lifecycle: Arc::new(Lifecycle::new()),
            handle: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn gate(&self) -> &Arc<EventGate> {
        &self.gate
    }

    pub fn worker(&self) -> &Arc<W> {
        &self.worker
    }

    /// Spawns the worker thread; no-op when already active.
    ///
    /// Runs the activation hook first and aborts on its failure, leaving
    /// the instance fully inactive. On success, blocks until the new
    /// thread has raised the active flag.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if self.is_active() {
            return Ok(());
        }
        self.reap();

        // Clear stale wakes from a previous cycle before the activation
        // hook runs; the hook may already raise the gate (the pump's
        // signal attachment does).
        self.gate.begin_cycle();
        self.worker.before_activate()?;
        self.lifecycle.clear_started();

        let worker = Arc::clone(&self.worker);
        let gate = Arc::clone(&self.gate);
        let lifecycle = Arc::clone(&self.lifecycle);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                lifecycle.set_active(true);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.run(&gate)));
                if let Err(payload) = outcome {
                    worker.on_fault(describe_panic(payload.as_ref()));
                }
                lifecycle.set_active(false);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.lifecycle.wait_started();
                debug!("worker thread '{}' active", self.name);
                Ok(())
            }
            Err(e) => {
                // The activation hook already ran; give it back.
                self.worker.after_deactivate();
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// Signals shutdown and blocks until the thread has exited; no-op
    /// when already inactive. Runs the deactivation hook afterwards.
    pub fn stop(&mut self) {
        if !self.is_active() {
            self.reap();
            return;
        }

        // Always signal before waiting so the run routine cannot miss it.
        self.gate.request_shutdown();
        self.lifecycle.wait_inactive();
        self.reap();
        self.worker.after_deactivate();
        debug!("worker thread '{}' stopped", self.name);
    }

    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                // The panic itself was already routed through on_fault.
                warn!("worker thread '{}' exited by panic", self.name);
            }
        }
    }
}

impl<W: Worker> Drop for WorkerThread<W> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Wake;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Blocks on the gate until shutdown, counting activations and hook
    /// invocations.
    struct RecordingWorker {
        fail_activation: AtomicBool,
        activations: AtomicUsize,
        deactivations: AtomicUsize,
        wakes: AtomicUsize,
        faults: StdMutex<Vec<String>>,
        panic_on_run: AtomicBool,
    }

    impl RecordingWorker {
        fn new() -> Self {
            RecordingWorker {
                fail_activation: AtomicBool::new(false),
                activations: AtomicUsize::new(0),
                deactivations: AtomicUsize::new(0),
                wakes: AtomicUsize::new(0),
                faults: StdMutex::new(Vec::new()),
                panic_on_run: AtomicBool::new(false),
            }
        }
    }

    impl Worker for RecordingWorker {
        fn before_activate(&self) -> Result<(), WorkerError> {
            if self.fail_activation.load(Ordering::SeqCst) {
                return Err(WorkerError::Activation("refused".into()));
            }
            self.activations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn run(&self, gate: &EventGate) {
            if self.panic_on_run.load(Ordering::SeqCst) {
                panic!("boom");
            }
            loop {
                match gate.wait() {
                    Wake::Shutdown => break,
                    Wake::Ready => {
                        self.wakes.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }

        fn after_deactivate(&self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }

        fn on_fault(&self, fault: &str) {
            self.faults.lock().unwrap().push(fault.to_string());
        }
    }

    fn spawn_thread(worker: Arc<RecordingWorker>) -> WorkerThread<RecordingWorker> {
        WorkerThread::new("test-worker", worker, Arc::new(EventGate::new()))
    }

    #[test]
    fn start_then_stop_runs_both_hooks_once() {
        let worker = Arc::new(RecordingWorker::new());
        let mut thread = spawn_thread(Arc::clone(&worker));

        thread.start().unwrap();
        assert!(thread.is_active());

        thread.stop();
        assert!(!thread.is_active());
        assert_eq!(worker.activations.load(Ordering::SeqCst), 1);
        assert_eq!(worker.deactivations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_is_a_noop_while_active() {
        let worker = Arc::new(RecordingWorker::new());
        let mut thread = spawn_thread(Arc::clone(&worker));

        thread.start().unwrap();
        thread.start().unwrap();
        assert_eq!(worker.activations.load(Ordering::SeqCst), 1);

        thread.stop();
    }

    #[test]
    fn stop_is_a_noop_while_inactive() {
        let worker = Arc::new(RecordingWorker::new());
        let mut thread = spawn_thread(Arc::clone(&worker));

        thread.stop();
        assert_eq!(worker.deactivations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_activation_hook_aborts_the_start() {
        let worker = Arc::new(RecordingWorker::new());
        worker.fail_activation.store(true, Ordering::SeqCst);
        let mut thread = spawn_thread(Arc::clone(&worker));

        assert!(thread.start().is_err());
        assert!(!thread.is_active());
        assert_eq!(worker.deactivations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panic_in_run_is_reported_and_clears_the_active_flag() {
        let worker = Arc::new(RecordingWorker::new());
        worker.panic_on_run.store(true, Ordering::SeqCst);
        let mut thread = spawn_thread(Arc::clone(&worker));

        thread.start().unwrap();
        // The run routine exits on its own; wait for the flag to settle.
        while thread.is_active() {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(worker.faults.lock().unwrap().as_slice(), ["boom"]);
    }

    #[test]
    fn restart_cycles_keep_delivering_wakes() {
        let worker = Arc::new(RecordingWorker::new());
        let mut thread = spawn_thread(Arc::clone(&worker));

        for cycle in 1..=3usize {
            thread.start().unwrap();
            thread.gate().raise();
            while worker.wakes.load(Ordering::SeqCst) < cycle {
                std::thread::sleep(Duration::from_millis(5));
            }
            thread.stop();
            assert_eq!(worker.deactivations.load(Ordering::SeqCst), cycle);
        }
    }
}
