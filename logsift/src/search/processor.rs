use std::time::Instant;
use tracing::{debug, warn};

use crate::errors::{ProcessError, ProcessResult};
use crate::progress::ProgressReporter;
use crate::tia::{TextItem, TextItemArray};

/// Rows a worker visits between progress counter steps
pub const PROGRESS_ROW_STEP: usize = 10_000;

/// Rows a worker visits between stop flag checks
pub const BATCH_CHECK_ROWS: usize = 256;

/// Where the raw log bytes come from.
///
/// The pass driver reads one chunk at a time into work memory between
/// worker rounds; workers themselves never touch the source.
pub trait ChunkSource {
    /// Total size of the log in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies bytes starting at `offset` into `buf`, returning how many
    /// were available
    fn read_into(&self, offset: u64, buf: &mut [u8]) -> ProcessResult<usize>;
}

/// [`ChunkSource`] over an in-memory byte slice, including memory-mapped
/// files
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl ChunkSource for SliceSource<'_> {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> ProcessResult<usize> {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(buf.len()).min(self.data.len());
        let count = end - start;
        buf[..count].copy_from_slice(&self.data[start..end]);
        Ok(count)
    }
}

/// One contiguous row range staged in work memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// First row of the range
    pub first_row: usize,
    /// Number of rows in the range
    pub rows: usize,
    /// File offset of the first loaded byte
    pub base_offset: u64,
    /// Bytes of the range actually loaded
    loaded: usize,
}

impl Chunk {
    pub fn last_row(&self) -> usize {
        self.first_row + self.rows - 1
    }

    pub fn contains_row(&self, row: usize) -> bool {
        row >= self.first_row && row < self.first_row + self.rows
    }

    pub fn loaded_bytes(&self) -> usize {
        self.loaded
    }

    /// The stored bytes of one row, terminator included. `None` when the
    /// row lies outside the loaded window.
    pub fn line_bytes<'a>(&self, arena: &'a [u8], item: TextItem) -> Option<&'a [u8]> {
        let start = item.offset.checked_sub(self.base_offset)? as usize;
        let end = start.checked_add(item.size as usize)?;
        if end > self.loaded || end > arena.len() {
            return None;
        }
        Some(&arena[start..end])
    }
}

/// Plans the next chunk upward from `first_row`.
///
/// Rows are taken while their accumulated span stays inside the work
/// memory window (one byte of headroom is always kept). When the span
/// overshoots, the plan backs off two rows rather than one, then drops
/// any row whose tail still lands past the window. Returns `None` when
/// no rows remain or the single row at `first_row` cannot fit.
pub fn plan_forward(tia: &TextItemArray, first_row: usize, arena_size: u64) -> Option<Chunk> {
    let total = tia.rows();
    if first_row >= total || arena_size == 0 {
        return None;
    }
    let max_bytes = arena_size - 1;
    let base = tia.get(first_row)?.offset;

    let mut end = first_row;
    let mut span = 0u64;
    while end < total && span < max_bytes {
        span = tia.get(end)?.end_offset() - base;
        end += 1;
    }
    if span >= max_bytes {
        end = end.saturating_sub(2);
    }
    while end > first_row {
        let tail = tia.get(end - 1)?.end_offset() - base;
        if tail <= max_bytes {
            break;
        }
        end -= 1;
    }

    if end <= first_row {
        // The backoff can eat the whole range; keep the first row when
        // it fits on its own
        if u64::from(tia.get(first_row)?.size) <= max_bytes {
            end = first_row + 1;
        } else {
            warn!(
                "row {} does not fit in the work memory window, stopping",
                first_row
            );
            return None;
        }
    }

    Some(Chunk {
        first_row,
        rows: end - first_row,
        base_offset: base,
        loaded: 0,
    })
}

/// Plans the next chunk downward ending at `last_row`.
///
/// The range is extended to the lowest first row whose span still fits
/// the work memory window. Returns `None` when the single row at
/// `last_row` cannot fit.
pub fn plan_backward(tia: &TextItemArray, last_row: usize, arena_size: u64) -> Option<Chunk> {
    let total = tia.rows();
    if total == 0 || last_row >= total || arena_size == 0 {
        return None;
    }
    let max_bytes = arena_size - 1;
    let last = tia.get(last_row)?;
    if last.size as u64 > max_bytes {
        warn!(
            "row {} does not fit in the work memory window, stopping",
            last_row
        );
        return None;
    }

    let end_offset = last.end_offset();
    let mut first = last_row;
    while first > 0 {
        let candidate = tia.get(first - 1)?;
        if end_offset - candidate.offset > max_bytes {
            break;
        }
        first -= 1;
    }

    Some(Chunk {
        first_row: first,
        rows: last_row - first + 1,
        base_offset: tia.get(first)?.offset,
        loaded: 0,
    })
}

/// Reads the planned chunk's bytes from the source into work memory
pub fn load_chunk(
    source: &dyn ChunkSource,
    tia: &TextItemArray,
    chunk: &mut Chunk,
    arena: &mut [u8],
    reporter: &dyn ProgressReporter,
) -> ProcessResult<()> {
    let last = tia
        .get(chunk.last_row())
        .ok_or_else(|| ProcessError::inconsistency("chunk extends past the row index"))?;
    let bytes = (last.end_offset() - chunk.base_offset) as usize;
    if bytes > arena.len() {
        return Err(ProcessError::inconsistency(
            "chunk does not fit in work memory",
        ));
    }

    reporter.add_progress_info(format!("  Loading log file to memory, {} bytes", bytes));
    let start = Instant::now();

    let read = source.read_into(chunk.base_offset, &mut arena[..bytes])?;
    if read != bytes {
        return Err(ProcessError::inconsistency(format!(
            "short read: {} of {} bytes",
            read, bytes
        )));
    }
    chunk.loaded = bytes;

    let elapsed = std::time::Duration::from_millis(start.elapsed().as_millis() as u64);
    reporter.add_progress_info(format!(
        "  Loading complete, {}",
        humantime::format_duration(elapsed)
    ));
    debug!(
        "loaded chunk rows {}..={} ({} bytes)",
        chunk.first_row,
        chunk.last_row(),
        bytes
    );
    Ok(())
}

/// Primes the progress counters for one chunk round. Each worker steps
/// once per [`PROGRESS_ROW_STEP`] visited rows, so the step size is the
/// inverse of the steps a worker will take.
pub fn setup_chunk_progress(reporter: &dyn ProgressReporter, workers: usize, chunk_rows: usize) {
    reporter.set_num_counters(workers);
    let per_worker = (chunk_rows / workers.max(1)).max(1);
    let steps = (per_worker as f64 / PROGRESS_ROW_STEP as f64).max(1.0);
    reporter.setup_counter_step(1.0 / steps);
    reporter.set_progress(0.0);
}
