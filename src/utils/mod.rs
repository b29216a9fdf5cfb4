pub mod logger;

/// Checks if the current process is running with administrator privileges.
///
/// Opening the monitoring driver's device interface requires an elevated
/// token, so the demonstration binary refuses to start without one.
///
/// # Returns
///
/// * `true` - If the process has administrator privileges
/// * `false` - If the process does not have administrator privileges or if the check fails
#[cfg(target_os = "windows")]
pub fn is_admin() -> bool {
    use std::process::Command;

    // "net session" succeeds only from an elevated token
    match Command::new("net").args(["session"]).output() {
        Ok(output) => output.status.success(),
        Err(e) => {
            log::warn!("Failed to check admin privileges: {}", e);
            false
        }
    }
}

/// There is no driver to talk to on non-Windows platforms.
#[cfg(not(target_os = "windows"))]
pub fn is_admin() -> bool {
    false
}
