use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::device::{DeviceControl, DeviceError, DeviceSource};
use crate::event::{EventContext, ProcessEventHandler};
use crate::pump::NotificationPump;
use crate::queue::EventQueue;
use crate::worker::{WorkerError, WorkerThread};

/// One live monitor per process; enforced at construction time.
static MONITOR_LIVE: AtomicBool = AtomicBool::new(false);

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("a process monitor already exists in this process")]
    AlreadyExists,
    #[error("monitoring is already active")]
    AlreadyActive,
    #[error("event queue consumer failed to start")]
    ConsumerUnavailable,
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("notification pump failed to start: {0}")]
    Pump(#[from] WorkerError),
}

struct MonitorState {
    active: bool,
    queue: EventQueue,
    pump: Option<WorkerThread<NotificationPump>>,
    control: Option<Box<dyn DeviceControl>>,
}

/// Owns the whole pipeline and sequences its activation.
///
/// Startup: set the dispatch context, start the queue consumer, open and
/// arm the device, start the pump. Teardown disarms the device first,
/// then stops the pump, then the consumer, so no event is dispatched
/// after the callback owner expects silence. A failure part-way through
/// startup unwinds the steps already taken; no half-started state
/// persists.
pub struct ProcessMonitor {
    state: Mutex<MonitorState>,
    source: Arc<dyn DeviceSource>,
}

impl ProcessMonitor {
    /// Monitor over the installed ProcObsrv driver.
    #[cfg(windows)]
    pub fn new(handler: Arc<dyn ProcessEventHandler>) -> Result<Self, MonitorError> {
        Self::with_device(
            handler,
            Arc::new(crate::device::windows::DriverDevice::default()),
        )
    }

    /// Monitor over an explicit device source.
    ///
    /// Fails with [`MonitorError::AlreadyExists`] while another monitor
    /// is alive in this process.
    pub fn with_device(
        handler: Arc<dyn ProcessEventHandler>,
        source: Arc<dyn DeviceSource>,
    ) -> Result<Self, MonitorError> {
        if MONITOR_LIVE.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::AlreadyExists);
        }
        Ok(ProcessMonitor {
            state: Mutex::new(MonitorState {
                active: false,
                queue: EventQueue::new(handler),
                pump: None,
                control: None,
            }),
            source,
        })
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    /// Activates the pipeline. Fails without side effects when already
    /// active; the device is never armed twice.
    pub fn start_monitoring(
        &self,
        context: Option<Arc<EventContext>>,
    ) -> Result<(), MonitorError> {
        let mut state = self.state.lock().unwrap();
        if state.active {
            return Err(MonitorError::AlreadyActive);
        }

        state.queue.set_context(context);
        if !state.queue.start_consuming() {
            return Err(MonitorError::ConsumerUnavailable);
        }

        let mut control = match self.source.open_control() {
            Ok(control) => control,
            Err(e) => {
                state.queue.shutdown();
                return Err(e.into());
            }
        };
        if let Err(e) = control.arm(true) {
            state.queue.shutdown();
            return Err(e.into());
        }

        let mut pump = NotificationPump::build(Arc::clone(&self.source), state.queue.producer());
        if let Err(e) = pump.start() {
            if let Err(disarm_err) = control.arm(false) {
                warn!("failed to disarm device while unwinding: {}", disarm_err);
            }
            state.queue.shutdown();
            return Err(e.into());
        }

        state.control = Some(control);
        state.pump = Some(pump);
        state.active = true;
        info!("process monitoring active");
        Ok(())
    }

    /// Deactivates the pipeline; no-op when inactive.
    pub fn stop_monitoring(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.active {
            return;
        }

        if let Some(mut control) = state.control.take() {
            if let Err(e) = control.arm(false) {
                warn!("failed to disarm device: {}", e);
            }
        }
        if let Some(mut pump) = state.pump.take() {
            pump.stop();
        }
        state.queue.stop_consuming();
        state.queue.shutdown();

        state.active = false;
        info!("process monitoring stopped");
    }
}

impl Drop for ProcessMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
        MONITOR_LIVE.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceChannel;
    use crate::event::ProcessEvent;
    use crate::sync::EventGate;
    use crossbeam::channel::{unbounded, Receiver, Sender};
    use serial_test::serial;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeDriverState {
        arm_calls: Vec<bool>,
        fetches: VecDeque<ProcessEvent>,
        gate: Option<Arc<EventGate>>,
    }

    /// In-memory device: records arm requests, hands out scripted fetch
    /// results, and lets the test raise the attached signal.
    #[derive(Default)]
    struct FakeDriver {
        state: Mutex<FakeDriverState>,
        fail_control_open: AtomicBool,
        fail_arm: AtomicBool,
    }

    impl FakeDriver {
        fn raise_with(&self, event: ProcessEvent) {
            let mut state = self.state.lock().unwrap();
            state.fetches.push_back(event);
            let gate = state.gate.clone().expect("signal not attached");
            drop(state);
            gate.raise();
        }

        fn arm_calls(&self) -> Vec<bool> {
            self.state.lock().unwrap().arm_calls.clone()
        }
    }

    struct FakeControl {
        driver: Arc<FakeDriver>,
    }

    impl DeviceControl for FakeControl {
        fn arm(&mut self, enable: bool) -> Result<(), DeviceError> {
            if self.driver.fail_arm.load(Ordering::SeqCst) {
                return Err(DeviceError::ControlFailed("arm rejected".into()));
            }
            self.driver.state.lock().unwrap().arm_calls.push(enable);
            Ok(())
        }
    }

    struct FakeChannel {
        driver: Arc<FakeDriver>,
    }

    impl DeviceChannel for FakeChannel {
        fn attach_signal(&mut self, gate: Arc<EventGate>) -> Result<(), DeviceError> {
            self.driver.state.lock().unwrap().gate = Some(gate);
            Ok(())
        }

        fn detach_signal(&mut self) {
            self.driver.state.lock().unwrap().gate = None;
        }

        fn fetch_event(&mut self) -> Result<Option<ProcessEvent>, DeviceError> {
            Ok(self.driver.state.lock().unwrap().fetches.pop_front())
        }
    }

    /// `DeviceSource` wrapper so the test can keep its own handle on the
    /// fake driver while the monitor owns the source.
    struct SourceHandle(Arc<FakeDriver>);

    impl DeviceSource for SourceHandle {
        fn open_control(&self) -> Result<Box<dyn DeviceControl>, DeviceError> {
            if self.0.fail_control_open.load(Ordering::SeqCst) {
                return Err(DeviceError::OpenFailed {
                    path: "fake".into(),
                    reason: "driver not loaded".into(),
                });
            }
            Ok(Box::new(FakeControl {
                driver: Arc::clone(&self.0),
            }))
        }

        fn open_channel(&self) -> Result<Box<dyn DeviceChannel>, DeviceError> {
            Ok(Box::new(FakeChannel {
                driver: Arc::clone(&self.0),
            }))
        }
    }

    struct ChannelHandler {
        tx: Sender<ProcessEvent>,
    }

    impl ProcessEventHandler for ChannelHandler {
        fn on_process_event(&self, event: &ProcessEvent, _context: Option<&Arc<EventContext>>) {
            let _ = self.tx.send(*event);
        }
    }

    fn monitor_over_fake() -> (ProcessMonitor, Arc<FakeDriver>, Receiver<ProcessEvent>) {
        let (tx, rx) = unbounded();
        let driver = Arc::new(FakeDriver::default());
        let monitor = ProcessMonitor::with_device(
            Arc::new(ChannelHandler { tx }),
            Arc::new(SourceHandle(Arc::clone(&driver))),
        )
        .unwrap();
        (monitor, driver, rx)
    }

    fn event(pid: u32) -> ProcessEvent {
        ProcessEvent {
            parent_pid: 4,
            pid,
            is_creation: true,
        }
    }

    #[test]
    #[serial]
    fn only_one_monitor_may_exist_at_a_time() {
        let (monitor, _driver, _rx) = monitor_over_fake();

        let (tx, _rx2) = unbounded();
        let second = ProcessMonitor::with_device(
            Arc::new(ChannelHandler { tx }),
            Arc::new(SourceHandle(Arc::new(FakeDriver::default()))),
        );
        assert!(matches!(second, Err(MonitorError::AlreadyExists)));

        drop(monitor);
        let (tx, _rx3) = unbounded();
        let third = ProcessMonitor::with_device(
            Arc::new(ChannelHandler { tx }),
            Arc::new(SourceHandle(Arc::new(FakeDriver::default()))),
        );
        assert!(third.is_ok());
    }

    #[test]
    #[serial]
    fn second_start_fails_without_double_arming() {
        let (monitor, driver, _rx) = monitor_over_fake();

        monitor.start_monitoring(None).unwrap();
        assert!(matches!(
            monitor.start_monitoring(None),
            Err(MonitorError::AlreadyActive)
        ));
        assert_eq!(driver.arm_calls(), vec![true]);

        monitor.stop_monitoring();
    }

    #[test]
    #[serial]
    fn stop_then_start_restores_delivery_repeatedly() {
        let (monitor, driver, rx) = monitor_over_fake();

        for cycle in 0..3u32 {
            monitor.start_monitoring(None).unwrap();

            driver.raise_with(event(1000 + cycle));
            let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(got.pid, 1000 + cycle);

            monitor.stop_monitoring();
            assert!(!monitor.is_active());
        }

        // Armed and disarmed symmetrically on every cycle.
        assert_eq!(driver.arm_calls(), vec![true, false, true, false, true, false]);
    }

    #[test]
    #[serial]
    fn stop_when_inactive_is_a_noop() {
        let (monitor, driver, _rx) = monitor_over_fake();
        monitor.stop_monitoring();
        assert!(driver.arm_calls().is_empty());
    }

    #[test]
    #[serial]
    fn failed_device_open_unwinds_the_consumer() {
        let (monitor, driver, rx) = monitor_over_fake();
        driver.fail_control_open.store(true, Ordering::SeqCst);

        assert!(matches!(
            monitor.start_monitoring(None),
            Err(MonitorError::Device(DeviceError::OpenFailed { .. }))
        ));
        assert!(!monitor.is_active());

        // The caller may retry later once the device is available.
        driver.fail_control_open.store(false, Ordering::SeqCst);
        monitor.start_monitoring(None).unwrap();
        driver.raise_with(event(7));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().pid, 7);

        monitor.stop_monitoring();
    }

    #[test]
    #[serial]
    fn failed_arm_unwinds_the_consumer() {
        let (monitor, driver, _rx) = monitor_over_fake();
        driver.fail_arm.store(true, Ordering::SeqCst);

        assert!(matches!(
            monitor.start_monitoring(None),
            Err(MonitorError::Device(DeviceError::ControlFailed(_)))
        ));
        assert!(!monitor.is_active());
        assert!(driver.arm_calls().is_empty());
    }
}
