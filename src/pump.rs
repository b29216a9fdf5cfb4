use log::{debug, warn};
use std::sync::{Arc, Mutex};

use crate::device::{DeviceChannel, DeviceSource};
use crate::event::ProcessEvent;
use crate::queue::QueueProducer;
use crate::sync::{EventGate, Wake};
use crate::worker::{Worker, WorkerError, WorkerThread};

/// Converts driver signals into queued events.
///
/// The activation hook opens the notification channel and attaches the
/// driver's signal to the worker gate; the run routine fetches one record
/// per signal and forwards it unless it exactly repeats the previous one.
pub struct NotificationPump {
    source: Arc<dyn DeviceSource>,
    queue: QueueProducer,
    gate: Arc<EventGate>,
    channel: Mutex<Option<Box<dyn DeviceChannel>>>,
    last_seen: Mutex<Option<ProcessEvent>>,
}

impl NotificationPump {
    /// Wires a pump to its own gate and returns the managed thread,
    /// ready to be started.
    pub fn build(source: Arc<dyn DeviceSource>, queue: QueueProducer) -> WorkerThread<Self> {
        let gate = Arc::new(EventGate::new());
        let pump = Arc::new(NotificationPump {
            source,
            queue,
            gate: Arc::clone(&gate),
            channel: Mutex::new(None),
            last_seen: Mutex::new(None),
        });
        WorkerThread::new("notification-pump", pump, gate)
    }

    /// One fetch per device signal. A record identical to the previous
    /// one is absorbed; anything else goes to the queue. The last-seen
    /// slot is updated on every successful fetch either way.
    fn retrieve(&self) {
        let mut channel = self.channel.lock().unwrap();
        let Some(channel) = channel.as_mut() else {
            return;
        };

        match channel.fetch_event() {
            Ok(Some(event)) => {
                let mut last_seen = self.last_seen.lock().unwrap();
                if *last_seen != Some(event) {
                    self.queue.push(event);
                }
                *last_seen = Some(event);
            }
            Ok(None) => {
                // Signaled with nothing new; back to waiting.
            }
            Err(e) => {
                warn!("event fetch failed: {}", e);
            }
        }
    }
}

impl Worker for NotificationPump {
    fn before_activate(&self) -> Result<(), WorkerError> {
        let mut channel = self
            .source
            .open_channel()
            .map_err(|e| WorkerError::Activation(e.to_string()))?;
        if let Err(e) = channel.attach_signal(Arc::clone(&self.gate)) {
            // Channel drops here; no handle survives a failed activation.
            return Err(WorkerError::Activation(e.to_string()));
        }
        *self.channel.lock().unwrap() = Some(channel);
        debug!("notification pump attached to device signal");
        Ok(())
    }

    fn run(&self, gate: &EventGate) {
        loop {
            match gate.wait() {
                Wake::Shutdown => break,
                Wake::Ready => self.retrieve(),
            }
        }
        debug!("notification pump exited");
    }

    fn after_deactivate(&self) {
        // Taking the channel out makes a second call a no-op.
        if let Some(mut channel) = self.channel.lock().unwrap().take() {
            channel.detach_signal();
        }
    }
}
