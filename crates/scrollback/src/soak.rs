//! Soak run: several sessions archiving rows on blocking threads while an
//! async task samples the shared memory ledger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;

use scrollback_core::{Cell, CellAttributes, Color, ScrollbackConfig, SoakSettings};
use scrollback_engine::{Backlog, BufferHandle, RowSnapshot};

/// Every `UNWRAP_EVERY` rows a producer widens its most recent row, as the
/// interpreter does when a soft-wrapped line is joined back.
const UNWRAP_EVERY: usize = 16;

/// Outcome of a soak run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoakReport {
    /// Simulated sessions
    pub sessions: usize,
    /// Rows archived across all sessions
    pub rows_pushed: usize,
    /// Rows still held when the producers finished
    pub rows_retained: usize,
    /// Rows widened in place
    pub expansions: usize,
    /// Memory samples taken while producers ran
    pub samples: usize,
    /// Largest ledger total observed
    pub peak_memory_bytes: u64,
    /// Ledger total when producers finished (verified by rescan)
    pub final_memory_bytes: u64,
    /// Bytes released when the sessions were freed
    pub released_bytes: u64,
    /// Wall-clock duration in milliseconds
    pub elapsed_ms: u64,
}

impl std::fmt::Display for SoakReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "sessions:        {}", self.sessions)?;
        writeln!(f, "rows pushed:     {}", self.rows_pushed)?;
        writeln!(f, "rows retained:   {}", self.rows_retained)?;
        writeln!(f, "expansions:      {}", self.expansions)?;
        writeln!(f, "memory samples:  {}", self.samples)?;
        writeln!(f, "peak memory:     {} bytes", self.peak_memory_bytes)?;
        writeln!(f, "final memory:    {} bytes", self.final_memory_bytes)?;
        writeln!(f, "released:        {} bytes", self.released_bytes)?;
        write!(f, "elapsed:         {} ms", self.elapsed_ms)
    }
}

/// Per-session counters returned by a producer.
#[derive(Debug, Default)]
struct ProducerStats {
    pushed: usize,
    expansions: usize,
}

/// Run the soak described by `config` against `backlog`.
///
/// The backlog's capacity limit is set from `backlog.max_capacity`. All
/// sessions are freed before returning, on success and on failure alike, so
/// the backlog ends empty.
pub async fn run(backlog: &'static Backlog, config: &ScrollbackConfig) -> Result<SoakReport> {
    let started = Instant::now();
    let settings = config.soak.clone();
    backlog.set_max_capacity(config.backlog.max_capacity);
    let capacity = config.backlog.default_capacity;

    let handles = create_sessions(backlog, settings.sessions, capacity)?;
    tracing::info!(
        "Soak starting: {} sessions, {} rows each, {} columns, capacity {}",
        settings.sessions,
        settings.rows_per_session,
        settings.columns,
        capacity
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let sampler = tokio::spawn(sample_memory(
        backlog,
        Duration::from_millis(settings.sample_interval_ms),
        stop_rx,
    ));

    // Each producer borrows its handle through an Arc so the handle comes
    // back even when the producer panics.
    let handles: Vec<_> = handles.into_iter().map(Arc::new).collect();
    let producers: Vec<_> = handles
        .iter()
        .enumerate()
        .map(|(session, handle)| {
            let handle = Arc::clone(handle);
            let settings = settings.clone();
            tokio::task::spawn_blocking(move || {
                produce(backlog, &handle, &settings, session, capacity)
            })
        })
        .collect();

    let mut pushed = 0;
    let mut expansions = 0;
    let mut failure = None;
    for producer in producers {
        match producer.await {
            Ok(Ok(stats)) => {
                pushed += stats.pushed;
                expansions += stats.expansions;
            }
            Ok(Err(e)) => {
                failure.get_or_insert_with(|| {
                    anyhow::Error::new(e).context("session producer failed")
                });
            }
            Err(e) => {
                failure.get_or_insert_with(|| {
                    anyhow::Error::new(e).context("session producer panicked")
                });
            }
        }
    }

    // Watch send only fails when the sampler is gone already.
    let _ = stop_tx.send(true);
    let sampled = sampler.await;

    let (verified, stats) = {
        let guard = backlog.lock();
        (guard.verify_ledger(), guard.stats())
    };
    let handles = handles
        .into_iter()
        .filter_map(|handle| match Arc::try_unwrap(handle) {
            Ok(handle) => Some(handle),
            Err(handle) => {
                tracing::warn!(
                    "Session buffer {} still shared after the soak",
                    handle.id()
                );
                None
            }
        })
        .collect();
    let released = free_sessions(backlog, handles);

    if let Some(e) = failure {
        return Err(e);
    }
    let released = released?;
    let (peak, samples) = sampled.context("memory sampler panicked")?;
    let final_memory = verified.context("ledger verification failed")?;

    let report = SoakReport {
        sessions: settings.sessions,
        rows_pushed: pushed,
        rows_retained: stats.rows,
        expansions,
        samples,
        peak_memory_bytes: peak.max(final_memory),
        final_memory_bytes: final_memory,
        released_bytes: released,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        "Soak finished: {} rows pushed, peak {} bytes",
        report.rows_pushed,
        report.peak_memory_bytes
    );
    Ok(report)
}

/// Create and register `count` session buffers. If any step fails the
/// buffers created so far are freed again.
fn create_sessions(
    backlog: &Backlog,
    count: usize,
    capacity: usize,
) -> scrollback_core::Result<Vec<BufferHandle>> {
    let mut guard = backlog.lock();
    let mut handles = Vec::with_capacity(count);
    let mut failure = None;
    for _ in 0..count {
        match guard.create(capacity) {
            Ok(handle) => {
                let registered = guard.register(&handle);
                handles.push(handle);
                if let Err(e) = registered {
                    failure = Some(e);
                    break;
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    drop(guard);

    match failure {
        None => Ok(handles),
        Some(e) => {
            // The creation error is the one worth reporting.
            let _ = free_sessions(backlog, handles);
            Err(e)
        }
    }
}

/// Free every handle, even past a failure. Returns the bytes released or
/// the first error.
fn free_sessions(backlog: &Backlog, handles: Vec<BufferHandle>) -> scrollback_core::Result<u64> {
    let mut guard = backlog.lock();
    let mut released = 0;
    let mut failure = None;
    for handle in handles {
        match guard.free(handle) {
            Ok(bytes) => released += bytes,
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(released),
    }
}

/// Sample the ledger total until `stop` flips, then once more.
/// Returns (peak, samples).
async fn sample_memory(
    backlog: &'static Backlog,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> (u64, usize) {
    let mut interval = tokio::time::interval(period);
    let mut peak = 0;
    let mut samples = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let used = backlog.total_memory();
                peak = peak.max(used);
                samples += 1;
                tracing::debug!("Backlog memory: {} bytes", used);
            }
            _ = stop.changed() => break,
        }
    }
    // Closing sample taken after every producer finished.
    peak = peak.max(backlog.total_memory());
    (peak, samples + 1)
}

/// Archive `rows_per_session` rows into one session buffer.
///
/// Halfway through, capacity is halved; at three quarters it is restored.
/// Both happen after the same row when there are too few rows to tell the
/// two points apart.
fn produce(
    backlog: &Backlog,
    handle: &BufferHandle,
    settings: &SoakSettings,
    session: usize,
    capacity: usize,
) -> scrollback_core::Result<ProducerStats> {
    let mut stats = ProducerStats::default();
    let rows = settings.rows_per_session;
    let (halve_at, restore_at) = resize_points(rows);
    let tail = vec![Cell::new('~'); (settings.columns / 4).max(1)];

    for n in 0..rows {
        let row = synth_row(session, n, settings.columns)?;
        let mut guard = backlog.lock();
        guard.push(handle, row)?;
        stats.pushed += 1;

        if n % UNWRAP_EVERY == UNWRAP_EVERY - 1 && guard.length(handle)? > 0 {
            let width = guard.get(handle, 0)?.width();
            guard.expand(handle, 0, width + tail.len(), &tail)?;
            stats.expansions += 1;
        }
        if n == halve_at {
            guard.resize_capacity(handle, capacity / 2)?;
        }
        if n == restore_at {
            guard.resize_capacity(handle, capacity)?;
        }
    }
    tracing::debug!("Session {} archived {} rows", session, stats.pushed);
    Ok(stats)
}

/// Rows after which capacity is halved and restored.
fn resize_points(rows: usize) -> (usize, usize) {
    (rows / 2, rows / 4 * 3 + rows % 4 * 3 / 4)
}

/// Row of `columns` cells labelled with its session and sequence number.
///
/// Odd rows end soft-wrapped.
fn synth_row(session: usize, n: usize, columns: usize) -> scrollback_core::Result<RowSnapshot> {
    let label = format!("[{session}] line {n}");
    let fg = Color::Indexed((session % 256) as u8);
    let mut cells: Vec<Cell> = label
        .chars()
        .chain(std::iter::repeat(' '))
        .take(columns)
        .map(|ch| Cell::with_fg(ch, fg))
        .collect();
    if n % 2 == 1 {
        if let Some(last) = cells.last_mut() {
            last.attrs = CellAttributes::default().with_autowrapped();
        }
    }
    RowSnapshot::new(columns, &cells)
}
