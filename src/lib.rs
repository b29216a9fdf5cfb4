//! User-mode half of a process-activity monitor.
//!
//! A kernel driver detects process creation and termination and signals
//! user mode; this crate polls that signal, retrieves event details
//! through a control-request channel, deduplicates them, queues them,
//! and dispatches them to an application callback on a dedicated thread.
//!
//! The pipeline, producer side first:
//!
//! * [`device`] — boundary to the driver (open, arm, attach-to-signal,
//!   fetch-event), with the real binding under `cfg(windows)`;
//! * [`pump`] — waits on the driver signal, fetches one event per
//!   signal, and suppresses exact adjacent duplicates;
//! * [`queue`] — thread-safe FIFO with its own consumer thread that
//!   dispatches to the registered [`ProcessEventHandler`];
//! * [`monitor`] — owns the pipeline and sequences activation and
//!   symmetric teardown;
//! * [`worker`] / [`sync`] — the start/stop thread primitive and the
//!   composite {shutdown, work} wait both sides are built on.

pub mod config;
pub mod device;
pub mod event;
pub mod monitor;
pub mod procname;
pub mod pump;
pub mod queue;
pub mod sync;
pub mod utils;
pub mod worker;

pub use event::{EventContext, ProcessEvent, ProcessEventHandler};
pub use monitor::{MonitorError, ProcessMonitor};
