//! Archived copies of single terminal rows.

use scrollback_core::{Cell, Error, Result};

/// One historical display row at a fixed cell width.
///
/// The stored cell count always equals [`width`](Self::width); the only way
/// to change it is [`expand`](Self::expand), which appends exactly the
/// missing cells or fails without touching the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSnapshot {
    cells: Vec<Cell>,
}

impl RowSnapshot {
    /// Build a snapshot of `width` cells copied from `source`.
    pub fn new(width: usize, source: &[Cell]) -> Result<Self> {
        if source.len() != width {
            return Err(Error::WidthMismatch {
                expected: width,
                actual: source.len(),
            });
        }
        let mut cells = alloc_cells(width)?;
        cells.extend_from_slice(source);
        Ok(Self { cells })
    }

    /// Build a snapshot of `width` blank cells.
    pub fn blank(width: usize) -> Result<Self> {
        let mut cells = alloc_cells(width)?;
        cells.resize(width, Cell::default());
        Ok(Self { cells })
    }

    /// Build a snapshot from plain text, one character per cell.
    pub fn from_text(text: &str) -> Self {
        Self {
            cells: text.chars().map(Cell::new).collect(),
        }
    }

    /// Cell count.
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    /// Stored cells.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Stored cells for in-place edits that keep the width.
    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Bytes this row is charged in the memory ledger.
    pub fn byte_cost(&self) -> u64 {
        Self::byte_cost_for(self.width())
    }

    /// Ledger cost of a row of `width` cells.
    pub fn byte_cost_for(width: usize) -> u64 {
        (width * Cell::BYTES) as u64
    }

    /// Whether the row was soft-wrapped onto the next one.
    pub fn is_autowrapped(&self) -> bool {
        self.cells.last().is_some_and(Cell::is_autowrapped)
    }

    /// Width with trailing blank cells ignored.
    pub fn trimmed_width(&self) -> usize {
        self.cells
            .iter()
            .rposition(|cell| !cell.is_blank())
            .map_or(0, |idx| idx + 1)
    }

    /// Row characters with trailing whitespace trimmed.
    pub fn text(&self) -> String {
        let text: String = self.cells.iter().map(|cell| cell.character).collect();
        text.trim_end().to_string()
    }

    /// Grow the row to `new_width` by appending `appended`.
    ///
    /// The previous last cell loses its soft-wrap marker since the row it
    /// continued into now lives inside this one. Returns the number of cells
    /// added.
    pub(crate) fn expand(&mut self, new_width: usize, appended: &[Cell]) -> Result<usize> {
        let delta = new_width
            .checked_sub(self.width())
            .ok_or(Error::Narrowing {
                width: self.width(),
                requested: new_width,
            })?;
        if appended.len() != delta {
            return Err(Error::WidthMismatch {
                expected: delta,
                actual: appended.len(),
            });
        }
        self.cells
            .try_reserve_exact(delta)
            .map_err(|_| Error::AllocationFailure {
                what: "cells",
                len: new_width,
            })?;

        if let Some(last) = self.cells.last_mut() {
            last.attrs.autowrapped = false;
        }
        self.cells.extend_from_slice(appended);
        Ok(delta)
    }
}

fn alloc_cells(width: usize) -> Result<Vec<Cell>> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(width)
        .map_err(|_| Error::AllocationFailure {
            what: "cells",
            len: width,
        })?;
    Ok(cells)
}
