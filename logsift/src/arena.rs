use memmap2::MmapMut;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::errors::{ProcessError, ProcessResult};
use crate::metrics::ArenaMetrics;

/// Allocation attempts below this size fail instead of shrinking further
pub const ARENA_SIZE_FLOOR: u64 = 100_000;

/// Buffer size used by `tiny_commit` for lightweight operations
pub const TINY_ARENA_SIZE: u64 = 102_400_000;

/// Fraction of available system memory proposed by `commit`
const MEM_USAGE_FACTOR: f64 = 0.7;

/// One large contiguous byte buffer holding the chunk of log bytes
/// currently under search or filtering.
///
/// `commit` sizes the buffer against available system memory with a
/// stepped-down retry on allocation failure. During a processing round the
/// buffer is shared read-only with the worker threads via [`ArenaView`];
/// reloading it between rounds requires all views to be dropped first.
#[derive(Debug)]
pub struct WorkArena {
    map: Option<Arc<MmapMut>>,
    metrics: ArenaMetrics,
}

/// Read-only view of the committed buffer, cloneable across worker threads
#[derive(Debug, Clone)]
pub struct ArenaView(Arc<MmapMut>);

impl Deref for ArenaView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl WorkArena {
    /// Creates an uncommitted arena
    pub fn new() -> Self {
        Self::with_metrics(ArenaMetrics::new())
    }

    /// Creates an uncommitted arena reporting to the given metrics
    pub fn with_metrics(metrics: ArenaMetrics) -> Self {
        Self { map: None, metrics }
    }

    /// Commits a buffer sized against available system memory.
    ///
    /// Proposes 70% of available memory, clamps to `settings.max_work_mem`,
    /// and honors `settings.work_mem_size` only when it is smaller than the
    /// proposal. On allocation failure the request shrinks by 10% per retry
    /// until it drops to [`ARENA_SIZE_FLOOR`], at which point the commit
    /// fails for good. Any previously committed buffer is released first.
    pub fn commit(&mut self, settings: &Settings) -> ProcessResult<u64> {
        let size = Self::proposal(settings);
        self.commit_sized(size)
    }

    /// Commits a small buffer for lightweight operations
    pub fn tiny_commit(&mut self, settings: &Settings) -> ProcessResult<u64> {
        let size = Self::proposal(settings).min(TINY_ARENA_SIZE);
        self.commit_sized(size)
    }

    /// Releases the committed buffer.
    ///
    /// Releasing an arena with nothing committed is a contract violation
    /// and reported as an error rather than a crash.
    pub fn free(&mut self) -> ProcessResult<()> {
        if self.map.is_none() {
            error!("work memory release requested but nothing is committed");
            return Err(ProcessError::arena_misuse(
                "no committed memory to release",
            ));
        }
        self.release_committed();
        Ok(())
    }

    /// Committed buffer size in bytes, 0 when uncommitted
    pub fn size(&self) -> u64 {
        self.map.as_ref().map(|m| m.len() as u64).unwrap_or(0)
    }

    pub fn is_committed(&self) -> bool {
        self.map.is_some()
    }

    /// Shares the committed buffer read-only with worker threads
    pub fn read_view(&self) -> ProcessResult<ArenaView> {
        self.map
            .clone()
            .map(ArenaView)
            .ok_or_else(|| ProcessError::arena_misuse("work memory not committed"))
    }

    /// Exclusive writable access for loading the next chunk.
    ///
    /// Fails while any [`ArenaView`] from the previous round is still alive;
    /// the buffer must never be written under a reader.
    pub fn write_view(&mut self) -> ProcessResult<&mut [u8]> {
        let map = self
            .map
            .as_mut()
            .ok_or_else(|| ProcessError::arena_misuse("work memory not committed"))?;
        match Arc::get_mut(map) {
            Some(m) => Ok(&mut m[..]),
            None => Err(ProcessError::inconsistency(
                "work memory still shared by workers",
            )),
        }
    }

    /// Gets the metrics this arena reports to
    pub fn metrics(&self) -> &ArenaMetrics {
        &self.metrics
    }

    fn proposal(settings: &Settings) -> u64 {
        let mut size = match Self::available_memory() {
            Some(free) => (free as f64 * MEM_USAGE_FACTOR) as u64,
            None => {
                warn!("available system memory unknown, proposing the configured maximum");
                settings.max_work_mem
            }
        };
        if size > settings.max_work_mem {
            size = settings.max_work_mem;
        }
        if let Some(requested) = settings.work_mem_size {
            if requested > 0 && requested < size {
                info!("Work memory override: {} bytes", requested);
                size = requested;
            }
        }
        size
    }

    fn commit_sized(&mut self, requested: u64) -> ProcessResult<u64> {
        self.release_committed();
        let mut size = requested;
        while size > ARENA_SIZE_FLOOR {
            match MmapMut::map_anon(size as usize) {
                Ok(map) => {
                    self.metrics.record_commit(size);
                    info!(
                        "Work memory in use: {}MB (requested {}MB)",
                        size / 1_000_000,
                        requested / 1_000_000
                    );
                    self.map = Some(Arc::new(map));
                    return Ok(size);
                }
                Err(err) => {
                    debug!("work memory allocation of {} bytes failed: {}", size, err);
                    self.metrics.record_shrink_retry();
                    size -= size / 10;
                }
            }
        }
        Err(ProcessError::arena_exhausted(requested, ARENA_SIZE_FLOOR))
    }

    fn release_committed(&mut self) {
        if let Some(map) = self.map.take() {
            self.metrics.record_release(map.len() as u64);
        }
    }

    #[cfg(target_os = "linux")]
    fn available_memory() -> Option<u64> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        for line in meminfo.lines() {
            if let Some(rest) = line.strip_prefix("MemAvailable:") {
                let value = rest.trim().trim_end_matches("kB").trim();
                return value.parse::<u64>().ok().map(|kb| kb * 1024);
            }
        }
        None
    }

    #[cfg(not(target_os = "linux"))]
    fn available_memory() -> Option<u64> {
        None
    }
}

impl Default for WorkArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkArena {
    fn drop(&mut self) {
        self.release_committed();
    }
}
