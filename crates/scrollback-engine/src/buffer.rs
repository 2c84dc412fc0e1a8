//! Per-session circular store of archived rows.

use scrollback_core::{Cell, Error, Result};

use crate::ledger::Ledger;
use crate::snapshot::RowSnapshot;

/// Fixed-capacity ring of [`RowSnapshot`]s for one terminal session.
///
/// Rows are addressed by logical offset: `0` is the most recently archived
/// row, `len() - 1` the oldest one still retained. Every operation that adds
/// or removes cells reports the byte delta to the [`Ledger`] it is handed, so
/// the ledger total always equals the sum of [`RowSnapshot::byte_cost`] over
/// stored rows.
#[derive(Debug, Default)]
pub struct SessionBuffer {
    /// Ring storage; `None` marks a slot that holds no row
    slots: Vec<Option<RowSnapshot>>,
    /// Slot the next push lands in
    next: usize,
    /// Rows currently held
    count: usize,
}

impl SessionBuffer {
    /// Create an empty buffer retaining at most `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            slots: alloc_slots(capacity)?,
            next: 0,
            count: 0,
        })
    }

    /// Maximum number of rows retained.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of rows currently held.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check whether no row is held.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sum of byte costs over stored rows, computed by a full scan.
    pub fn byte_cost(&self) -> u64 {
        self.slots.iter().flatten().map(RowSnapshot::byte_cost).sum()
    }

    /// Archive `row` as the most recent entry.
    ///
    /// Once the buffer is full the oldest row is evicted first. With zero
    /// capacity the row is dropped without ever being charged.
    pub fn push(&mut self, ledger: &mut Ledger, row: RowSnapshot) {
        let capacity = self.capacity();
        if capacity == 0 {
            tracing::trace!("Dropping {}-cell row: backlog disabled", row.width());
            return;
        }

        let slot = &mut self.slots[self.next];
        if let Some(evicted) = slot.take() {
            tracing::trace!("Evicting {}-cell row from slot {}", evicted.width(), self.next);
            ledger.release(evicted.byte_cost());
        }
        ledger.charge(row.byte_cost());
        *slot = Some(row);

        self.next = (self.next + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    /// Borrow the row at `offset` (0 = most recent).
    pub fn get(&self, offset: usize) -> Result<&RowSnapshot> {
        let idx = self.slot_index(offset)?;
        self.slots[idx].as_ref().ok_or(Error::OutOfRange {
            offset,
            length: self.count,
        })
    }

    /// Independent copy of the row at `offset`, unaffected by later evictions.
    pub fn extract(&self, offset: usize) -> Result<RowSnapshot> {
        self.get(offset).cloned()
    }

    /// Grow the row at `offset` to `new_width` by appending `appended`.
    ///
    /// `appended` must hold exactly `new_width - width` cells. On error the
    /// row and the ledger are unchanged.
    pub fn expand(
        &mut self,
        ledger: &mut Ledger,
        offset: usize,
        new_width: usize,
        appended: &[Cell],
    ) -> Result<&RowSnapshot> {
        let row = self.slot_mut(offset)?;
        let added = row.expand(new_width, appended)?;
        ledger.charge(RowSnapshot::byte_cost_for(added));
        Ok(&*row)
    }

    /// Replace the row at `offset` with `width` blank cells for the caller
    /// to fill in.
    pub fn renew(
        &mut self,
        ledger: &mut Ledger,
        offset: usize,
        width: usize,
    ) -> Result<&mut RowSnapshot> {
        let fresh = RowSnapshot::blank(width)?;
        let row = self.slot_mut(offset)?;
        ledger.release(row.byte_cost());
        ledger.charge(fresh.byte_cost());
        *row = fresh;
        Ok(row)
    }

    /// Evict every row and rewind the write cursor. Returns the bytes released.
    pub fn clear(&mut self, ledger: &mut Ledger) -> u64 {
        let mut released = 0;
        for row in self.slots.iter_mut().filter_map(Option::take) {
            released += row.byte_cost();
        }
        ledger.release(released);
        self.next = 0;
        self.count = 0;
        released
    }

    /// Change the number of retained rows.
    ///
    /// Shrinking below the current length evicts the oldest rows; the
    /// remaining rows keep their relative order. Returns the number of rows
    /// evicted.
    pub fn resize_capacity(&mut self, ledger: &mut Ledger, new_capacity: usize) -> Result<usize> {
        if new_capacity == self.capacity() {
            return Ok(0);
        }
        let mut slots = alloc_slots(new_capacity)?;

        let keep = self.count.min(new_capacity);
        let mut evicted = 0;
        for offset in (0..self.count).rev() {
            let idx = self.physical(offset);
            let Some(row) = self.slots[idx].take() else {
                continue;
            };
            if offset < keep {
                slots[keep - 1 - offset] = Some(row);
            } else {
                ledger.release(row.byte_cost());
                evicted += 1;
            }
        }

        self.slots = slots;
        self.count = keep;
        self.next = if new_capacity == 0 { 0 } else { keep % new_capacity };
        Ok(evicted)
    }

    /// Rows from most recent to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &RowSnapshot> + '_ {
        (0..self.count).filter_map(move |offset| self.slots[self.physical(offset)].as_ref())
    }

    /// Viewport lines the stored rows occupy when reflowed to `cols` columns.
    ///
    /// Trailing blank cells do not count; an empty row still takes one line.
    pub fn wrapped_height(&self, cols: usize) -> usize {
        if cols == 0 {
            return 0;
        }
        self.iter()
            .map(|row| row.trimmed_width().div_ceil(cols).max(1))
            .sum()
    }

    fn slot_mut(&mut self, offset: usize) -> Result<&mut RowSnapshot> {
        let idx = self.slot_index(offset)?;
        let length = self.count;
        self.slots[idx]
            .as_mut()
            .ok_or(Error::OutOfRange { offset, length })
    }

    fn slot_index(&self, offset: usize) -> Result<usize> {
        if offset >= self.count {
            return Err(Error::OutOfRange {
                offset,
                length: self.count,
            });
        }
        Ok(self.physical(offset))
    }

    /// Physical slot of a logical offset; `offset` must be below `count`.
    fn physical(&self, offset: usize) -> usize {
        let capacity = self.capacity();
        (capacity - 1 + self.next - offset) % capacity
    }
}

fn alloc_slots(capacity: usize) -> Result<Vec<Option<RowSnapshot>>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(|_| Error::AllocationFailure {
            what: "slots",
            len: capacity,
        })?;
    slots.resize_with(capacity, || None);
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrollback_core::{CellAttributes, Color};

    fn row(text: &str) -> RowSnapshot {
        RowSnapshot::from_text(text)
    }

    fn filled(capacity: usize, texts: &[&str]) -> (SessionBuffer, Ledger) {
        let mut ledger = Ledger::new();
        let mut buffer = SessionBuffer::with_capacity(capacity).unwrap();
        for text in texts {
            buffer.push(&mut ledger, row(text));
        }
        (buffer, ledger)
    }

    fn texts(buffer: &SessionBuffer) -> Vec<String> {
        buffer.iter().map(RowSnapshot::text).collect()
    }

    #[test]
    fn test_buffer_new() {
        let buffer = SessionBuffer::with_capacity(10).unwrap();
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.byte_cost(), 0);
    }

    #[test]
    fn test_most_recent_first() {
        let (buffer, _) = filled(5, &["r1", "r2", "r3"]);
        assert_eq!(buffer.get(0).unwrap().text(), "r3");
        assert_eq!(buffer.get(1).unwrap().text(), "r2");
        assert_eq!(buffer.get(2).unwrap().text(), "r1");
        assert!(matches!(
            buffer.get(3),
            Err(Error::OutOfRange {
                offset: 3,
                length: 3
            })
        ));
    }

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let (mut buffer, mut ledger) = filled(3, &["a", "b", "c"]);
        let cost = row("a").byte_cost();
        assert_eq!(ledger.used(), 3 * cost);

        buffer.push(&mut ledger, row("dd"));
        assert_eq!(buffer.len(), 3);
        assert_eq!(texts(&buffer), vec!["dd", "c", "b"]);
        assert_eq!(ledger.used(), 2 * cost + row("dd").byte_cost());
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_wraps_around_many_times() {
        let mut ledger = Ledger::new();
        let mut buffer = SessionBuffer::with_capacity(4).unwrap();
        for i in 0..23 {
            buffer.push(&mut ledger, row(&i.to_string()));
        }
        assert_eq!(buffer.len(), 4);
        assert_eq!(texts(&buffer), vec!["22", "21", "20", "19"]);
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_zero_capacity_drops_rows() {
        let (buffer, ledger) = filled(0, &["a", "b"]);
        assert_eq!(buffer.len(), 0);
        assert_eq!(ledger.used(), 0);
        assert!(buffer.get(0).is_err());
        assert_eq!(buffer.wrapped_height(80), 0);
    }

    #[test]
    fn test_extract_survives_eviction() {
        let (mut buffer, mut ledger) = filled(2, &["keep me", "b"]);
        let copy = buffer.extract(1).unwrap();

        buffer.push(&mut ledger, row("c"));
        buffer.push(&mut ledger, row("d"));

        assert_eq!(copy.text(), "keep me");
        assert_eq!(texts(&buffer), vec!["d", "c"]);
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_expand_most_recent() {
        let mut ledger = Ledger::new();
        let mut buffer = SessionBuffer::with_capacity(4).unwrap();
        let original: Vec<Cell> = (0..80)
            .map(|i| Cell::with_fg(char::from(b'a' + (i % 26) as u8), Color::Green))
            .collect();
        buffer.push(&mut ledger, RowSnapshot::new(80, &original).unwrap());
        let before = ledger.used();

        let tail = vec![Cell::new('z'); 10];
        let expanded = buffer.expand(&mut ledger, 0, 90, &tail).unwrap();
        assert_eq!(expanded.width(), 90);
        assert_eq!(&expanded.cells()[..80], original.as_slice());
        assert_eq!(&expanded.cells()[80..], tail.as_slice());
        assert_eq!(ledger.used(), before + RowSnapshot::byte_cost_for(10));
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_expand_older_row() {
        let (mut buffer, mut ledger) = filled(4, &["old", "new"]);
        buffer
            .expand(&mut ledger, 1, 5, &[Cell::new('e'), Cell::new('r')])
            .unwrap();
        assert_eq!(texts(&buffer), vec!["new", "older"]);
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_expand_mismatch_is_atomic() {
        let (mut buffer, mut ledger) = filled(4, &["abc"]);
        let before = ledger.used();

        let result = buffer.expand(&mut ledger, 0, 10, &[Cell::new('x')]);
        assert!(matches!(
            result,
            Err(Error::WidthMismatch {
                expected: 7,
                actual: 1
            })
        ));
        assert_eq!(buffer.get(0).unwrap().text(), "abc");
        assert_eq!(ledger.used(), before);

        let result = buffer.expand(&mut ledger, 3, 4, &[Cell::new('x')]);
        assert!(matches!(result, Err(Error::OutOfRange { .. })));
        assert_eq!(ledger.used(), before);
    }

    #[test]
    fn test_expand_unwraps_row() {
        let mut ledger = Ledger::new();
        let mut buffer = SessionBuffer::with_capacity(2).unwrap();
        let wrapped = Cell {
            character: 'b',
            attrs: CellAttributes::default().with_autowrapped(),
            ..Default::default()
        };
        buffer.push(
            &mut ledger,
            RowSnapshot::new(2, &[Cell::new('a'), wrapped]).unwrap(),
        );
        assert!(buffer.get(0).unwrap().is_autowrapped());

        let row = buffer.expand(&mut ledger, 0, 3, &[Cell::new('c')]).unwrap();
        assert!(!row.is_autowrapped());
        assert_eq!(row.text(), "abc");
    }

    #[test]
    fn test_renew_replaces_row() {
        let (mut buffer, mut ledger) = filled(3, &["first", "second"]);

        let fresh = buffer.renew(&mut ledger, 1, 2).unwrap();
        assert_eq!(fresh.width(), 2);
        fresh.cells_mut()[0] = Cell::new('x');

        assert_eq!(texts(&buffer), vec!["second", "x"]);
        assert_eq!(ledger.used(), buffer.byte_cost());
        assert!(buffer.renew(&mut ledger, 2, 4).is_err());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (mut buffer, mut ledger) = filled(3, &["a", "b", "c", "d"]);
        let stored = buffer.byte_cost();

        assert_eq!(buffer.clear(&mut ledger), stored);
        assert_eq!(buffer.len(), 0);
        assert_eq!(ledger.used(), 0);

        assert_eq!(buffer.clear(&mut ledger), 0);
        assert_eq!(buffer.len(), 0);
        assert_eq!(ledger.used(), 0);

        // Cursor rewound: ordering still works after a clear
        buffer.push(&mut ledger, row("x"));
        buffer.push(&mut ledger, row("y"));
        assert_eq!(texts(&buffer), vec!["y", "x"]);
    }

    #[test]
    fn test_shrink_keeps_most_recent() {
        let (mut buffer, mut ledger) = filled(5, &["r1", "r2", "r3", "r4", "r5"]);
        let per_row = row("r1").byte_cost();
        let before = ledger.used();

        let evicted = buffer.resize_capacity(&mut ledger, 2).unwrap();
        assert_eq!(evicted, 3);
        assert_eq!(buffer.capacity(), 2);
        assert_eq!(texts(&buffer), vec!["r5", "r4"]);
        assert_eq!(ledger.used(), before - 3 * per_row);

        buffer.push(&mut ledger, row("r6"));
        assert_eq!(texts(&buffer), vec!["r6", "r5"]);
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_shrink_after_wraparound() {
        let (mut buffer, mut ledger) = filled(4, &["1", "2", "3", "4", "5", "6"]);
        buffer.resize_capacity(&mut ledger, 3).unwrap();
        assert_eq!(texts(&buffer), vec!["6", "5", "4"]);
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_grow_keeps_rows_and_adds_headroom() {
        let (mut buffer, mut ledger) = filled(3, &["a", "b", "c", "d"]);
        let evicted = buffer.resize_capacity(&mut ledger, 6).unwrap();
        assert_eq!(evicted, 0);
        assert_eq!(buffer.len(), 3);
        assert_eq!(texts(&buffer), vec!["d", "c", "b"]);

        for text in ["e", "f", "g", "h"] {
            buffer.push(&mut ledger, row(text));
        }
        assert_eq!(buffer.len(), 6);
        assert_eq!(texts(&buffer), vec!["h", "g", "f", "e", "d", "c"]);
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_resize_to_zero_and_back() {
        let (mut buffer, mut ledger) = filled(3, &["a", "b"]);
        assert_eq!(buffer.resize_capacity(&mut ledger, 0).unwrap(), 2);
        assert_eq!(buffer.len(), 0);
        assert_eq!(ledger.used(), 0);

        buffer.push(&mut ledger, row("ignored"));
        assert_eq!(buffer.len(), 0);

        buffer.resize_capacity(&mut ledger, 2).unwrap();
        buffer.push(&mut ledger, row("z"));
        assert_eq!(texts(&buffer), vec!["z"]);
    }

    #[test]
    fn test_resize_same_capacity_is_noop() {
        let (mut buffer, mut ledger) = filled(3, &["a", "b", "c", "d"]);
        assert_eq!(buffer.resize_capacity(&mut ledger, 3).unwrap(), 0);
        assert_eq!(texts(&buffer), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_with_capacity_allocation_failure() {
        let err = SessionBuffer::with_capacity(usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            Error::AllocationFailure {
                what: "slots",
                len: usize::MAX
            }
        ));
    }

    #[test]
    fn test_failed_resize_changes_nothing() {
        let (mut buffer, mut ledger) = filled(3, &["a", "b", "c", "d"]);
        let used = ledger.used();

        let err = buffer.resize_capacity(&mut ledger, usize::MAX).unwrap_err();
        assert!(matches!(err, Error::AllocationFailure { what: "slots", .. }));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(ledger.used(), used);
        assert_eq!(texts(&buffer), vec!["d", "c", "b"]);

        // The ring still advances normally afterwards
        buffer.push(&mut ledger, row("e"));
        assert_eq!(texts(&buffer), vec!["e", "d", "c"]);
        assert_eq!(ledger.used(), buffer.byte_cost());
    }

    #[test]
    fn test_failed_renew_changes_nothing() {
        let (mut buffer, mut ledger) = filled(2, &["kept"]);
        let used = ledger.used();

        let err = buffer.renew(&mut ledger, 0, usize::MAX).unwrap_err();
        assert!(matches!(err, Error::AllocationFailure { what: "cells", .. }));
        assert_eq!(buffer.get(0).unwrap().text(), "kept");
        assert_eq!(buffer.len(), 1);
        assert_eq!(ledger.used(), used);
    }

    #[test]
    fn test_wrapped_height() {
        let (buffer, _) = filled(4, &["", "12345", "1234567890ab", "abc   "]);
        // "abc" -> 1, "1234567890ab" -> 3, "12345" -> 1, "" -> 1
        assert_eq!(buffer.wrapped_height(5), 6);
        assert_eq!(buffer.wrapped_height(4), 7);
        assert_eq!(buffer.wrapped_height(80), 4);
        assert_eq!(buffer.wrapped_height(0), 0);
    }
}
