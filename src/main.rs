//! Demonstration CLI: starts the monitor, spawns and terminates a few
//! test processes so events flow, and tears everything down on Enter.

use log::{error, info};
use std::process;

use procwatch::{config, utils};

fn main() {
    // Initialize logging before anything can fail
    if let Err(e) = utils::logger::init("info") {
        eprintln!("Failed to initialize logger: {}", e);
        process::exit(1);
    }

    info!("Process monitor starting up...");

    let config = match config::load() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            info!("Using default configuration");
            config::Config::default()
        }
    };

    run(&config);

    info!("Shutdown complete");
}

#[cfg(windows)]
fn run(config: &config::Config) {
    use demo::ConsoleHandler;
    use procwatch::device::windows::DriverDevice;
    use procwatch::{EventContext, ProcessMonitor};
    use std::sync::Arc;

    // The device open fails without an elevated token
    if !utils::is_admin() {
        error!("This application requires administrator privileges to open the driver.");
        error!("Please restart the application as administrator.");
        process::exit(1);
    }

    let device = Arc::new(DriverDevice::new(
        &config.device.device_path,
        &config.device.signal_name,
    ));
    let monitor = match ProcessMonitor::with_device(Arc::new(ConsoleHandler), device) {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("Failed to create monitor: {}", e);
            process::exit(1);
        }
    };

    let context: Arc<EventContext> =
        Arc::new(String::from("This could be any user-supplied data."));
    if let Err(e) = monitor.start_monitoring(Some(context)) {
        error!("Failed to start monitoring: {}", e);
        process::exit(1);
    }
    info!("Monitoring active; spawning test processes");

    demo::exercise_test_processes();

    info!("Press Enter to stop monitoring...");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    monitor.stop_monitoring();
}

#[cfg(not(windows))]
fn run(_config: &config::Config) {
    error!("The ProcObsrv driver is only available on Windows; nothing to monitor here.");
    process::exit(1);
}

#[cfg(windows)]
mod demo {
    use log::{info, warn};
    use std::process::Command;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use procwatch::{procname, EventContext, ProcessEvent, ProcessEventHandler};

    /// How many test processes get spawned to exercise the queue.
    const MAX_TEST_PROCESSES: usize = 3;

    /// Prints every delivered event on the console.
    ///
    /// The deliberate delay demonstrates the queuing: the pump keeps
    /// producing while dispatch lags, and nothing is lost or reordered.
    pub struct ConsoleHandler;

    impl ProcessEventHandler for ConsoleHandler {
        fn on_process_event(&self, event: &ProcessEvent, context: Option<&Arc<EventContext>>) {
            thread::sleep(Duration::from_millis(500));

            if event.is_creation {
                let image = procname::resolve_image_path(event.pid);
                info!("{} {}", event, image);
            } else {
                info!("{}", event);
            }

            // The opaque context travels with every dispatch unchanged.
            if let Some(label) = context.and_then(|c| c.downcast_ref::<String>()) {
                info!("  (context: {})", label);
            }
        }
    }

    /// Spawns a handful of processes, lets the monitor observe them, then
    /// terminates them so both event kinds show up.
    pub fn exercise_test_processes() {
        let mut children = Vec::new();
        for _ in 0..MAX_TEST_PROCESSES {
            match Command::new("notepad.exe").spawn() {
                Ok(child) => children.push(child),
                Err(e) => warn!("Failed to spawn test process: {}", e),
            }
        }

        thread::sleep(Duration::from_secs(5));

        for mut child in children {
            if let Err(e) = child.kill() {
                warn!("Failed to terminate test process {}: {}", child.id(), e);
            }
            let _ = child.wait();
            thread::sleep(Duration::from_millis(10));
        }
    }
}
