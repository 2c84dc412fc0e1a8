//! Error types for the scrollback engine.

use thiserror::Error;

/// Main error type for scrollback operations.
///
/// Every engine operation that fails leaves the buffer and the memory ledger
/// exactly as they were before the call.
#[derive(Debug, Error)]
pub enum Error {
    /// Logical offset is not backed by a stored row
    #[error("Offset {offset} out of range (length: {length})")]
    OutOfRange {
        /// Requested backward offset
        offset: usize,
        /// Rows currently held
        length: usize,
    },

    /// Cell count does not match the width it was supposed to fill
    #[error("Width mismatch: expected {expected} cells, got {actual}")]
    WidthMismatch {
        /// Cells required
        expected: usize,
        /// Cells supplied
        actual: usize,
    },

    /// Expansion target is narrower than the stored row
    #[error("Cannot expand a {width}-cell row to {requested} cells")]
    Narrowing {
        /// Current row width
        width: usize,
        /// Width asked for
        requested: usize,
    },

    /// Row or slot storage could not be obtained
    #[error("Allocation failure for {len} {what}")]
    AllocationFailure {
        /// Kind of storage ("cells" or "slots")
        what: &'static str,
        /// Elements requested
        len: usize,
    },

    /// Buffer handle does not refer to live storage in this backlog
    #[error("Unknown backlog buffer: {0}")]
    UnknownBuffer(String),

    /// Running memory total disagrees with a full rescan
    #[error("Ledger drift: recorded {recorded} bytes, rescan found {actual} bytes")]
    LedgerDrift {
        /// Running total
        recorded: u64,
        /// Sum over stored rows
        actual: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
