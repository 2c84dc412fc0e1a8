//! Running byte total of every archived row.

/// Memory ledger updated incrementally on every insert, eviction and expansion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Ledger {
    used: u64,
}

impl Ledger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently attributed to stored rows.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Attribute `bytes` to a newly stored or grown row.
    pub fn charge(&mut self, bytes: u64) {
        self.used = self.used.saturating_add(bytes);
    }

    /// Remove `bytes` of a released row.
    ///
    /// Never goes below zero. An underflow means a row was released that was
    /// never charged.
    pub fn release(&mut self, bytes: u64) {
        match self.used.checked_sub(bytes) {
            Some(used) => self.used = used,
            None => {
                tracing::warn!(
                    "Ledger underflow: releasing {} bytes with only {} recorded",
                    bytes,
                    self.used
                );
                self.used = 0;
            }
        }
    }
}
