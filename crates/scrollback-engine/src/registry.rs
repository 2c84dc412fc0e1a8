//! Process-wide registry of session buffers and the shared memory ledger.
//!
//! A single mutex guards the ledger, the membership set and the storage of
//! every session buffer. All row operations go through a [`BacklogGuard`],
//! so a row push on one thread and a memory query on another are strictly
//! serialized, and a row borrowed from the guard cannot outlive the lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;
use serde::Serialize;
use uuid::Uuid;

use scrollback_core::{Cell, Error, Result};

use crate::buffer::SessionBuffer;
use crate::ledger::Ledger;
use crate::snapshot::RowSnapshot;

lazy_static! {
    static ref GLOBAL_BACKLOG: Backlog = Backlog::new();
}

/// Identity of one session buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BufferId(Uuid);

impl BufferId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning handle to a session buffer.
///
/// The terminal session holds exactly one handle per buffer. It is not
/// `Clone`; [`BacklogGuard::free`] consumes it, so a buffer cannot be
/// released twice through the same handle.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    id: BufferId,
}

impl BufferHandle {
    /// Identity of the buffer behind this handle.
    pub fn id(&self) -> BufferId {
        self.id
    }
}

/// Aggregate view of a backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BacklogStats {
    /// Session buffers with live storage
    pub sessions: usize,
    /// Session buffers in the membership set
    pub registered: usize,
    /// Rows held across all buffers
    pub rows: usize,
    /// Ledger total in bytes
    pub memory_bytes: u64,
}

#[derive(Debug)]
struct BacklogState {
    ledger: Ledger,
    buffers: HashMap<BufferId, SessionBuffer>,
    members: HashSet<BufferId>,
    /// Upper bound on any buffer's capacity
    max_capacity: usize,
}

impl Default for BacklogState {
    fn default() -> Self {
        Self {
            ledger: Ledger::new(),
            buffers: HashMap::new(),
            members: HashSet::new(),
            max_capacity: usize::MAX,
        }
    }
}

impl BacklogState {
    fn stats(&self) -> BacklogStats {
        BacklogStats {
            sessions: self.buffers.len(),
            registered: self.members.len(),
            rows: self.buffers.values().map(SessionBuffer::len).sum(),
            memory_bytes: self.ledger.used(),
        }
    }
}

/// Registry of session buffers sharing one memory ledger.
///
/// Construct one with [`Backlog::new`] before any session starts, or use the
/// lazily initialized [`Backlog::global`] instance.
#[derive(Debug, Default)]
pub struct Backlog {
    state: Mutex<BacklogState>,
}

impl Backlog {
    /// Create an empty backlog with no capacity limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty backlog whose buffers never retain more than
    /// `max_capacity` rows.
    pub fn with_max_capacity(max_capacity: usize) -> Self {
        let backlog = Self::new();
        backlog.set_max_capacity(max_capacity);
        backlog
    }

    /// Process-wide backlog.
    ///
    /// The instance lives until the process exits and is never dropped;
    /// call [`teardown`](Self::teardown) once the last session is gone to
    /// release anything still held.
    pub fn global() -> &'static Backlog {
        &GLOBAL_BACKLOG
    }

    /// Change the capacity limit applied by later `create` and
    /// `resize_capacity` calls. Existing buffers keep their capacity.
    pub fn set_max_capacity(&self, max_capacity: usize) {
        self.lock().state.max_capacity = max_capacity;
    }

    /// Current capacity limit.
    pub fn max_capacity(&self) -> usize {
        self.lock().state.max_capacity
    }

    /// Acquire the backlog lock.
    ///
    /// The lock is released when the guard is dropped. Every guarded
    /// operation either fully applies or changes nothing, so the state behind
    /// a poisoned lock is still consistent and is recovered.
    pub fn lock(&self) -> BacklogGuard<'_> {
        BacklogGuard {
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Current ledger total in bytes.
    pub fn total_memory(&self) -> u64 {
        self.lock().total_memory()
    }

    /// Add `handle` to the membership set. See [`BacklogGuard::register`].
    pub fn register(&self, handle: &BufferHandle) -> Result<bool> {
        self.lock().register(handle)
    }

    /// Remove `handle` from the membership set. See [`BacklogGuard::unregister`].
    pub fn unregister(&self, handle: &BufferHandle) -> bool {
        self.lock().unregister(handle)
    }

    /// Snapshot of aggregate counters.
    pub fn stats(&self) -> BacklogStats {
        self.lock().stats()
    }

    /// Release every buffer still alive, leaving the backlog empty and
    /// reusable. Handles still held afterwards refer to nothing.
    ///
    /// Returns the counters as they were before teardown.
    pub fn teardown(&self) -> BacklogStats {
        let mut guard = self.lock();
        let stats = guard.stats();
        if stats.sessions > 0 {
            tracing::warn!(
                "Backlog shutdown with {} live session buffers ({} rows, {} bytes)",
                stats.sessions,
                stats.rows,
                stats.memory_bytes
            );
        }
        guard.release_all();
        stats
    }

    /// Tear down and consume an owned backlog. See [`teardown`](Self::teardown).
    pub fn shutdown(self) -> BacklogStats {
        self.teardown()
    }
}

impl Drop for Backlog {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.buffers.is_empty() {
            tracing::warn!(
                "Backlog dropped with {} live session buffers",
                state.buffers.len()
            );
        }
    }
}

/// Scoped hold on the backlog lock.
///
/// References returned by [`get`](Self::get) and [`expand`](Self::expand)
/// borrow the guard and therefore cannot be used after the lock is released.
pub struct BacklogGuard<'a> {
    state: MutexGuard<'a, BacklogState>,
}

impl BacklogGuard<'_> {
    /// Allocate a session buffer retaining at most `capacity` rows, clamped
    /// to the backlog's capacity limit.
    ///
    /// The buffer is not a member of the registry until
    /// [`register`](Self::register) is called.
    pub fn create(&mut self, capacity: usize) -> Result<BufferHandle> {
        let capacity = self.bounded(capacity);
        let buffer = SessionBuffer::with_capacity(capacity)?;
        let id = BufferId::new();
        self.state.buffers.insert(id, buffer);
        tracing::debug!("Created backlog buffer {} (capacity {})", id, capacity);
        Ok(BufferHandle { id })
    }

    /// Release the buffer behind `handle`: evict its rows, drop its
    /// membership and its storage. Returns the bytes released.
    pub fn free(&mut self, handle: BufferHandle) -> Result<u64> {
        let (buffer, ledger) = self.parts(&handle)?;
        let released = buffer.clear(ledger);
        self.state.buffers.remove(&handle.id);
        self.state.members.remove(&handle.id);
        tracing::debug!("Freed backlog buffer {} ({} bytes)", handle.id, released);
        Ok(released)
    }

    /// Add the buffer to the membership set.
    ///
    /// Returns `false` if it was already registered.
    pub fn register(&mut self, handle: &BufferHandle) -> Result<bool> {
        self.buffer(handle)?;
        let added = self.state.members.insert(handle.id);
        if added {
            tracing::debug!("Registered backlog buffer {}", handle.id);
        }
        Ok(added)
    }

    /// Remove the buffer from the membership set.
    ///
    /// The buffer keeps its rows and the ledger is not adjusted; callers clear
    /// or free the buffer to release its memory. Returns `false` if the
    /// buffer was not registered.
    pub fn unregister(&mut self, handle: &BufferHandle) -> bool {
        let removed = self.state.members.remove(&handle.id);
        if removed {
            let held = self
                .state
                .buffers
                .get(&handle.id)
                .map_or(0, SessionBuffer::len);
            if held > 0 {
                tracing::warn!(
                    "Unregistered backlog buffer {} still holds {} rows",
                    handle.id,
                    held
                );
            } else {
                tracing::debug!("Unregistered backlog buffer {}", handle.id);
            }
        }
        removed
    }

    /// Check membership.
    pub fn is_registered(&self, handle: &BufferHandle) -> bool {
        self.state.members.contains(&handle.id)
    }

    /// Archive `row` as the most recent row of the buffer.
    pub fn push(&mut self, handle: &BufferHandle, row: RowSnapshot) -> Result<()> {
        let (buffer, ledger) = self.parts(handle)?;
        buffer.push(ledger, row);
        Ok(())
    }

    /// Borrow the row at `offset` (0 = most recent).
    pub fn get(&self, handle: &BufferHandle, offset: usize) -> Result<&RowSnapshot> {
        self.buffer(handle)?.get(offset)
    }

    /// Independent copy of the row at `offset`.
    pub fn extract(&self, handle: &BufferHandle, offset: usize) -> Result<RowSnapshot> {
        self.buffer(handle)?.extract(offset)
    }

    /// Grow the row at `offset` to `new_width` with `appended` cells.
    pub fn expand(
        &mut self,
        handle: &BufferHandle,
        offset: usize,
        new_width: usize,
        appended: &[Cell],
    ) -> Result<&RowSnapshot> {
        let (buffer, ledger) = self.parts(handle)?;
        buffer.expand(ledger, offset, new_width, appended)
    }

    /// Replace the row at `offset` with `width` blank cells.
    pub fn renew(
        &mut self,
        handle: &BufferHandle,
        offset: usize,
        width: usize,
    ) -> Result<&mut RowSnapshot> {
        let (buffer, ledger) = self.parts(handle)?;
        buffer.renew(ledger, offset, width)
    }

    /// Evict every row of the buffer. Returns the bytes released.
    pub fn clear(&mut self, handle: &BufferHandle) -> Result<u64> {
        let (buffer, ledger) = self.parts(handle)?;
        Ok(buffer.clear(ledger))
    }

    /// Change how many rows the buffer retains, clamped to the capacity
    /// limit. Returns the rows evicted.
    pub fn resize_capacity(&mut self, handle: &BufferHandle, new_capacity: usize) -> Result<usize> {
        let new_capacity = self.bounded(new_capacity);
        let (buffer, ledger) = self.parts(handle)?;
        let old_capacity = buffer.capacity();
        let evicted = buffer.resize_capacity(ledger, new_capacity)?;
        if old_capacity != new_capacity {
            tracing::debug!(
                "Resized backlog buffer {} from {} to {} rows ({} evicted)",
                handle.id,
                old_capacity,
                new_capacity,
                evicted
            );
        }
        Ok(evicted)
    }

    /// Rows held by the buffer.
    pub fn length(&self, handle: &BufferHandle) -> Result<usize> {
        Ok(self.buffer(handle)?.len())
    }

    /// Rows the buffer can retain.
    pub fn capacity(&self, handle: &BufferHandle) -> Result<usize> {
        Ok(self.buffer(handle)?.capacity())
    }

    /// Viewport lines the buffer occupies when reflowed to `cols` columns.
    pub fn wrapped_height(&self, handle: &BufferHandle, cols: usize) -> Result<usize> {
        Ok(self.buffer(handle)?.wrapped_height(cols))
    }

    /// Current ledger total in bytes.
    pub fn total_memory(&self) -> u64 {
        self.state.ledger.used()
    }

    /// Sum of row costs over every registered buffer, by full scan.
    pub fn rescan_memory(&self) -> u64 {
        self.state
            .members
            .iter()
            .filter_map(|id| self.state.buffers.get(id))
            .map(SessionBuffer::byte_cost)
            .sum()
    }

    /// Compare the running total against a full rescan.
    ///
    /// Only registered buffers are scanned, so a buffer holding rows while
    /// unregistered shows up as drift.
    pub fn verify_ledger(&self) -> Result<u64> {
        let recorded = self.total_memory();
        let actual = self.rescan_memory();
        if recorded != actual {
            return Err(Error::LedgerDrift { recorded, actual });
        }
        Ok(recorded)
    }

    /// Aggregate counters.
    pub fn stats(&self) -> BacklogStats {
        self.state.stats()
    }

    fn release_all(&mut self) {
        let state = &mut *self.state;
        for buffer in state.buffers.values_mut() {
            buffer.clear(&mut state.ledger);
        }
        state.buffers.clear();
        state.members.clear();
    }

    fn bounded(&self, requested: usize) -> usize {
        let limit = self.state.max_capacity;
        if requested > limit {
            tracing::debug!(
                "Clamping backlog capacity request {} to limit {}",
                requested,
                limit
            );
        }
        requested.min(limit)
    }

    fn buffer(&self, handle: &BufferHandle) -> Result<&SessionBuffer> {
        self.state
            .buffers
            .get(&handle.id)
            .ok_or_else(|| Error::UnknownBuffer(handle.id.to_string()))
    }

    fn parts(&mut self, handle: &BufferHandle) -> Result<(&mut SessionBuffer, &mut Ledger)> {
        let state = &mut *self.state;
        let buffer = state
            .buffers
            .get_mut(&handle.id)
            .ok_or_else(|| Error::UnknownBuffer(handle.id.to_string()))?;
        Ok((buffer, &mut state.ledger))
    }
}
