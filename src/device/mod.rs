//! Boundary to the kernel-mode component that detects process creation
//! and termination. The driver itself is an external collaborator; this
//! module only fixes the contract the pipeline relies on: open, arm,
//! attach-to-signal and fetch-event.

use std::sync::Arc;
use thiserror::Error;

use crate::event::ProcessEvent;
use crate::sync::EventGate;

#[cfg(windows)]
pub mod windows;

/// Device interface published by the ProcObsrv driver.
pub const DEFAULT_DEVICE_PATH: &str = r"\\.\ProcObsrv";
/// Named kernel event the driver signals on every process event.
pub const DEFAULT_SIGNAL_NAME: &str = r"Global\ProcObsrvProcessEvent";

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open device '{path}': {reason}")]
    OpenFailed { path: String, reason: String },
    #[error("failed to attach to signal '{name}': {reason}")]
    SignalAttachFailed { name: String, reason: String },
    #[error("control request failed: {0}")]
    ControlFailed(String),
    #[error("event fetch failed: {0}")]
    FetchFailed(String),
}

/// Control-side connection: arms or disarms event generation in the
/// driver. Held open by the orchestrator for the whole active period.
pub trait DeviceControl: Send {
    fn arm(&mut self, enable: bool) -> Result<(), DeviceError>;
}

/// Notification-side connection, owned by the pump thread.
///
/// `attach_signal` subscribes the given gate to the driver's named
/// notification signal; every arrival raises the gate. `fetch_event`
/// retrieves at most one pending record and blocks cooperatively until
/// the request completes; `Ok(None)` is a legitimate empty completion
/// (spurious wake), not a fault.
pub trait DeviceChannel: Send {
    fn attach_signal(&mut self, gate: Arc<EventGate>) -> Result<(), DeviceError>;

    /// Detaches from the signal. Safe to call more than once.
    fn detach_signal(&mut self);

    fn fetch_event(&mut self) -> Result<Option<ProcessEvent>, DeviceError>;
}

/// Factory for device connections. Opening can fail when the driver is
/// not loaded or the caller lacks the required privileges; both are
/// reported as [`DeviceError::OpenFailed`] and are retryable later.
pub trait DeviceSource: Send + Sync {
    fn open_control(&self) -> Result<Box<dyn DeviceControl>, DeviceError>;
    fn open_channel(&self) -> Result<Box<dyn DeviceChannel>, DeviceError>;
}
