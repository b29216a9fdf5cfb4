//! Best-effort process-name resolution for delivered events.

use sysinfo::{PidExt, ProcessExt, System, SystemExt};

/// Resolves the image path of a process by its ID.
///
/// Best effort only: the process may already be gone by the time the
/// event is dispatched, and name lookup may need privileges we do not
/// have. Failure returns an empty string and never blocks dispatch.
///
/// # Arguments
///
/// * `pid` - The process ID to resolve
///
/// # Returns
///
/// * The image path, the bare process name if no path is known, or an
///   empty string
pub fn resolve_image_path(pid: u32) -> String {
    let mut system = System::new();
    let pid = sysinfo::Pid::from_u32(pid);

    if !system.refresh_process(pid) {
        return String::new();
    }

    match system.process(pid) {
        Some(process) => {
            let path = process.exe();
            if path.as_os_str().is_empty() {
                process.name().to_string()
            } else {
                path.display().to_string()
            }
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_the_current_process() {
        let name = resolve_image_path(std::process::id());
        assert!(!name.is_empty());
    }

    #[test]
    fn unknown_pid_yields_an_empty_string() {
        // PIDs near the top of the range are practically never live.
        assert_eq!(resolve_image_path(u32::MAX - 2), "");
    }
}
