//! Logger utility functions for the process monitor.

use env_logger::{Builder, Env};
use log::{info, LevelFilter};
use std::io;

/// Initializes the logger with custom formatting and the specified log level.
///
/// # Arguments
///
/// * `level` - The log level to use (debug, info, warn, error)
///
/// # Returns
///
/// * `Result<(), io::Error>` - Success or failure initializing the logger
pub fn init(level: &str) -> Result<(), io::Error> {
    let level_filter = match level.to_lowercase().as_str() {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info, // Default to Info if invalid level
    };

    let mut builder = Builder::from_env(Env::default());

    builder
        .format_timestamp_secs() // Add timestamps
        .format_module_path(true) // Include module path
        .filter_level(level_filter) // Set log level
        .init();

    info!("Logger initialized at {} level", level);

    Ok(())
}
