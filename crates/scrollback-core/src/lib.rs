//! # scrollback-core
//!
//! Core types for the scrollback engine.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other scrollback crates. It provides:
//!
//! - Cell and color types for archived terminal rows
//! - Error types
//! - YAML configuration
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - the engine and the soak driver
//! depend on this crate, but it has no dependencies on them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use cell::{Cell, CellAttributes, Color};
pub use config::{BacklogSettings, ScrollbackConfig, SoakSettings};
pub use error::{Error, Result};
