//! Scrollback soak driver library.
//!
//! Runs simulated terminal sessions against the backlog engine and reports
//! memory behaviour. The binary entry point is in main.rs.

pub mod soak;

// Re-export commonly used types
pub use soak::{run, SoakReport};

use scrollback_core::ScrollbackConfig;

/// Load configuration from `path`, or defaults when no path is given.
pub fn load_config(path: Option<&str>) -> scrollback_core::Result<ScrollbackConfig> {
    match path {
        Some(path) => ScrollbackConfig::from_file(path),
        None => Ok(ScrollbackConfig::default()),
    }
}
