//! # scrollback-engine
//!
//! Terminal scrollback (backlog) engine.
//!
//! This crate provides:
//! - Row snapshots of archived terminal lines
//! - Fixed-capacity per-session ring buffers with eviction and width expansion
//! - A memory ledger shared by every session
//! - A registry whose lock serializes all backlog access across threads
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on scrollback-core.
//! The escape-sequence interpreter decides when rows are archived; the UI
//! reads them back while scrolling.
//!
//! ```
//! use scrollback_engine::{Backlog, RowSnapshot};
//!
//! let backlog = Backlog::new();
//! let mut guard = backlog.lock();
//! let handle = guard.create(100).unwrap();
//! guard.register(&handle).unwrap();
//! guard.push(&handle, RowSnapshot::from_text("$ make")).unwrap();
//! assert_eq!(guard.get(&handle, 0).unwrap().text(), "$ make");
//! guard.free(handle).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod ledger;
pub mod registry;
pub mod snapshot;

// Re-export commonly used types
pub use buffer::SessionBuffer;
pub use ledger::Ledger;
pub use registry::{Backlog, BacklogGuard, BacklogStats, BufferHandle, BufferId};
pub use snapshot::RowSnapshot;
