//! Binding to the ProcObsrv kernel driver: a control handle for the
//! activate/deactivate request, and an overlapped notification channel
//! that forwards the driver's named event into the pump's gate.

use log::{debug, warn};
use std::ffi::c_void;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    CloseHandle, BOOL, FALSE, GENERIC_READ, GENERIC_WRITE, HANDLE, TRUE, WAIT_OBJECT_0,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ,
    FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Threading::{
    CreateEventW, OpenEventW, SetEvent, WaitForMultipleObjects, INFINITE,
};
use windows::Win32::System::IO::{DeviceIoControl, GetOverlappedResult, OVERLAPPED};

use super::{
    DeviceChannel, DeviceControl, DeviceError, DeviceSource, DEFAULT_DEVICE_PATH,
    DEFAULT_SIGNAL_NAME,
};
use crate::event::ProcessEvent;
use crate::sync::EventGate;

// CTL_CODE(FILE_DEVICE_UNKNOWN, 0x800.., METHOD_BUFFERED, FILE_ANY_ACCESS)
const IOCTL_PROCOBSRV_ACTIVATE_MONITORING: u32 = 0x0022_2000;
const IOCTL_PROCOBSRV_GET_PROCINFO: u32 = 0x0022_2004;

// SYNCHRONIZE access right; all the forwarder does is wait.
const EVENT_SYNCHRONIZE: u32 = 0x0010_0000;

/// Record layout shared with the driver.
#[repr(C)]
#[derive(Default)]
struct ProcessCallbackInfo {
    parent_id: u32,
    process_id: u32,
    create: u8,
}

#[repr(C)]
struct ActivateInfo {
    activate: u8,
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn open_device(path: &str, flags: FILE_FLAGS_AND_ATTRIBUTES) -> Result<HANDLE, DeviceError> {
    let path_w = wide(path);
    unsafe {
        CreateFileW(
            PCWSTR(path_w.as_ptr()),
            (GENERIC_READ | GENERIC_WRITE).0,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            flags,
            HANDLE::default(),
        )
    }
    .map_err(|e| DeviceError::OpenFailed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Factory for connections to the installed ProcObsrv driver.
pub struct DriverDevice {
    device_path: String,
    signal_name: String,
}

impl DriverDevice {
    pub fn new(device_path: &str, signal_name: &str) -> Self {
        DriverDevice {
            device_path: device_path.to_string(),
            signal_name: signal_name.to_string(),
        }
    }
}

impl Default for DriverDevice {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_PATH, DEFAULT_SIGNAL_NAME)
    }
}

impl DeviceSource for DriverDevice {
    fn open_control(&self) -> Result<Box<dyn DeviceControl>, DeviceError> {
        // Synchronous I/O is enough for the activate request.
        let handle = open_device(&self.device_path, FILE_FLAGS_AND_ATTRIBUTES(0))?;
        debug!("opened driver control handle on {}", self.device_path);
        Ok(Box::new(DriverControl {
            handle: Some(handle),
        }))
    }

    fn open_channel(&self) -> Result<Box<dyn DeviceChannel>, DeviceError> {
        let handle = open_device(&self.device_path, FILE_FLAG_OVERLAPPED)?;
        debug!("opened driver fetch handle on {}", self.device_path);
        Ok(Box::new(DriverChannel {
            handle: Some(handle),
            signal_name: self.signal_name.clone(),
            forwarder: None,
        }))
    }
}

struct DriverControl {
    handle: Option<HANDLE>,
}

impl DeviceControl for DriverControl {
    fn arm(&mut self, enable: bool) -> Result<(), DeviceError> {
        let handle = self
            .handle
            .ok_or_else(|| DeviceError::ControlFailed("control handle closed".into()))?;
        let activate_info = ActivateInfo {
            activate: enable as u8,
        };
        let mut bytes_returned = 0u32;
        let ok: BOOL = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_PROCOBSRV_ACTIVATE_MONITORING,
                Some(&activate_info as *const ActivateInfo as *const c_void),
                mem::size_of::<ActivateInfo>() as u32,
                None,
                0,
                Some(&mut bytes_returned),
                None,
            )
        };
        if !ok.as_bool() {
            return Err(DeviceError::ControlFailed(format!(
                "activate({}) request rejected",
                enable
            )));
        }
        Ok(())
    }
}

impl Drop for DriverControl {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe {
                let _ = CloseHandle(handle);
            }
        }
    }
}

/// Waits on {detach request, driver signal} and raises the pump's gate
/// once per driver signal.
struct SignalForwarder {
    stop_event: HANDLE,
    kernel_event: HANDLE,
    thread: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    fn attach(signal_name: &str, gate: Arc<EventGate>) -> Result<Self, DeviceError> {
        let name_w = wide(signal_name);
        let kernel_event = unsafe {
            OpenEventW(EVENT_SYNCHRONIZE, FALSE, PCWSTR(name_w.as_ptr()))
        }
        .map_err(|e| DeviceError::SignalAttachFailed {
            name: signal_name.to_string(),
            reason: e.to_string(),
        })?;

        let stop_event = match unsafe { CreateEventW(None, TRUE, FALSE, PCWSTR::null()) } {
            Ok(handle) => handle,
            Err(e) => {
                unsafe {
                    let _ = CloseHandle(kernel_event);
                }
                return Err(DeviceError::SignalAttachFailed {
                    name: signal_name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let thread = thread::Builder::new()
            .name("device-signal-forwarder".to_string())
            .spawn(move || loop {
                let wait =
                    unsafe { WaitForMultipleObjects(&[stop_event, kernel_event], FALSE, INFINITE) };
                if wait == WAIT_OBJECT_0 {
                    break;
                } else if wait.0 == WAIT_OBJECT_0.0 + 1 {
                    gate.raise();
                } else {
                    warn!("signal forwarder wait failed ({:?})", wait);
                    break;
                }
            })
            .map_err(|e| DeviceError::SignalAttachFailed {
                name: signal_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(SignalForwarder {
            stop_event,
            kernel_event,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        unsafe {
            let _ = SetEvent(self.stop_event);
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        unsafe {
            let _ = CloseHandle(self.kernel_event);
            let _ = CloseHandle(self.stop_event);
        }
    }
}

struct DriverChannel {
    handle: Option<HANDLE>,
    signal_name: String,
    forwarder: Option<SignalForwarder>,
}

impl DeviceChannel for DriverChannel {
    fn attach_signal(&mut self, gate: Arc<EventGate>) -> Result<(), DeviceError> {
        self.forwarder = Some(SignalForwarder::attach(&self.signal_name, gate)?);
        Ok(())
    }

    fn detach_signal(&mut self) {
        self.forwarder = None;
    }

    fn fetch_event(&mut self) -> Result<Option<ProcessEvent>, DeviceError> {
        let handle = self
            .handle
            .ok_or_else(|| DeviceError::FetchFailed("fetch handle closed".into()))?;

        // Manual-reset completion event for this one request.
        let completion = unsafe { CreateEventW(None, TRUE, FALSE, PCWSTR::null()) }
            .map_err(|e| DeviceError::FetchFailed(e.to_string()))?;
        let mut overlapped = OVERLAPPED::default();
        overlapped.hEvent = completion;

        let mut info = ProcessCallbackInfo::default();
        let mut bytes_returned = 0u32;
        unsafe {
            // Returns FALSE with ERROR_IO_PENDING for overlapped handles;
            // the completion is observed through GetOverlappedResult.
            let _ = DeviceIoControl(
                handle,
                IOCTL_PROCOBSRV_GET_PROCINFO,
                None,
                0,
                Some(&mut info as *mut ProcessCallbackInfo as *mut c_void),
                mem::size_of::<ProcessCallbackInfo>() as u32,
                Some(&mut bytes_returned),
                Some(&mut overlapped),
            );
        }
        let completed: BOOL = unsafe {
            GetOverlappedResult(handle, &overlapped, &mut bytes_returned, TRUE)
        };
        unsafe {
            let _ = CloseHandle(completion);
        }

        if !completed.as_bool() {
            return Err(DeviceError::FetchFailed(
                "overlapped fetch did not complete".into(),
            ));
        }
        if (bytes_returned as usize) < mem::size_of::<ProcessCallbackInfo>() {
            // Signaled with nothing to report; not a fault.
            return Ok(None);
        }
        Ok(Some(ProcessEvent {
            parent_pid: info.parent_id,
            pid: info.process_id,
            is_creation: info.create != 0,
        }))
    }
}

impl Drop for DriverChannel {
    fn drop(&mut self) {
        self.detach_signal();
        if let Some(handle) = self.handle.take() {
            unsafe {
                let _ = CloseHandle(handle);
            }
        }
    }
}
