use log::{debug, error};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::event::{EventContext, ProcessEvent, ProcessEventHandler};
use crate::sync::{EventGate, Wake};
use crate::worker::{Worker, WorkerThread};

struct QueueShared {
    /// Insertion order is delivery order; nothing reorders or coalesces
    /// here (dedup happens upstream in the pump).
    items: Mutex<VecDeque<ProcessEvent>>,
    gate: Arc<EventGate>,
    handler: Arc<dyn ProcessEventHandler>,
    context: Mutex<Option<Arc<EventContext>>>,
}

impl QueueShared {
    fn push(&self, event: ProcessEvent) {
        let mut items = self.items.lock().unwrap();
        items.push_back(event);
        // Wake the consumer while the element is guaranteed present.
        self.gate.raise();
    }

    /// Removes and dispatches queued events one at a time until the store
    /// is observed empty. The callback runs outside the queue lock so a
    /// slow or reentrant handler cannot block producers.
    fn drain(&self) {
        loop {
            let next = {
                let mut items = self.items.lock().unwrap();
                match items.pop_front() {
                    Some(event) => Some(event),
                    None => {
                        // Make sure the signal is not left raised with an
                        // empty store.
                        self.gate.reset();
                        None
                    }
                }
            };
            let Some(event) = next else { break };
            let context = self.context.lock().unwrap().clone();
            self.handler.on_process_event(&event, context.as_ref());
        }
    }
}

/// Consumer-side worker: blocks on {shutdown, element available} and
/// drains on every data wake.
struct DispatchWorker {
    shared: Arc<QueueShared>,
}

impl Worker for DispatchWorker {
    fn run(&self, gate: &EventGate) {
        // Deliver anything that accumulated while the consumer was down.
        self.shared.drain();
        loop {
            match gate.wait() {
                Wake::Shutdown => break,
                Wake::Ready => self.shared.drain(),
            }
        }
        debug!("event queue consumer exited");
    }
}

/// Producer handle into an [`EventQueue`], held by the notification pump.
#[derive(Clone)]
pub struct QueueProducer {
    shared: Arc<QueueShared>,
}

impl QueueProducer {
    pub fn push(&self, event: ProcessEvent) {
        self.shared.push(event);
    }
}

/// Thread-safe unbounded FIFO of process events with its own consumer
/// thread.
///
/// Producers append through [`push`](Self::push); the internal
/// [`WorkerThread`] wakes on the shared gate and hands each event to the
/// registered [`ProcessEventHandler`] together with the opaque context.
pub struct EventQueue {
    shared: Arc<QueueShared>,
    consumer: WorkerThread<DispatchWorker>,
}

impl EventQueue {
    pub fn new(handler: Arc<dyn ProcessEventHandler>) -> Self {
        let gate = Arc::new(EventGate::new());
        let shared = Arc::new(QueueShared {
            items: Mutex::new(VecDeque::new()),
            gate: Arc::clone(&gate),
            handler,
            context: Mutex::new(None),
        });
        let worker = Arc::new(DispatchWorker {
            shared: Arc::clone(&shared),
        });
        EventQueue {
            shared,
            consumer: WorkerThread::new("event-queue-consumer", worker, gate),
        }
    }

    /// Appends an event at the tail and signals the consumer. Never
    /// blocks on dispatch and never drops events.
    pub fn push(&self, event: ProcessEvent) {
        self.shared.push(event);
    }

    /// Clonable producer handle for threads that only ever push.
    pub fn producer(&self) -> QueueProducer {
        QueueProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stores the opaque value forwarded unchanged on every dispatch.
    /// Set this before the consumer is started.
    pub fn set_context(&self, context: Option<Arc<EventContext>>) {
        *self.shared.context.lock().unwrap() = context;
    }

    /// Starts the internal consumer thread if it is not already running;
    /// returns whether it is running now.
    pub fn start_consuming(&mut self) -> bool {
        if let Err(e) = self.consumer.start() {
            error!("failed to start event queue consumer: {}", e);
        }
        self.consumer.is_active()
    }

    /// Signals the consumer to shut down without waiting for it. The
    /// blocking wait happens in [`shutdown`](Self::shutdown) when the
    /// owning orchestrator tears the pipeline down.
    pub fn stop_consuming(&self) {
        if self.consumer.is_active() {
            self.shared.gate.request_shutdown();
        }
    }

    /// Stops the consumer thread and waits for it to exit.
    pub fn shutdown(&mut self) {
        self.consumer.stop();
    }

    pub fn is_consuming(&self) -> bool {
        self.consumer.is_active()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.shared.items.lock().unwrap().len()
    }
}
