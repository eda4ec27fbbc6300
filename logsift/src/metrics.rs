use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks work memory usage across commit/release cycles
#[derive(Debug, Clone)]
pub struct ArenaMetrics {
    // Memory usage metrics
    committed: Arc<AtomicU64>,
    peak_committed: Arc<AtomicU64>,

    // Allocation behavior metrics
    commit_count: Arc<AtomicU64>,
    shrink_retries: Arc<AtomicU64>,
    release_count: Arc<AtomicU64>,
}

impl ArenaMetrics {
    /// Creates a new ArenaMetrics instance
    pub fn new() -> Self {
        Self {
            committed: Arc::new(AtomicU64::new(0)),
            peak_committed: Arc::new(AtomicU64::new(0)),
            commit_count: Arc::new(AtomicU64::new(0)),
            shrink_retries: Arc::new(AtomicU64::new(0)),
            release_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a successful commit of work memory
    pub fn record_commit(&self, bytes: u64) {
        let total = self.committed.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.commit_count.fetch_add(1, Ordering::Relaxed);
        let mut peak = self.peak_committed.load(Ordering::Relaxed);
        while total > peak {
            match self.peak_committed.compare_exchange_weak(
                peak,
                total,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
        debug!("Work memory committed: {} bytes, total: {} bytes", bytes, total);
    }

    /// Records a release of work memory
    pub fn record_release(&self, bytes: u64) {
        let total = self.committed.fetch_sub(bytes, Ordering::Relaxed) - bytes;
        self.release_count.fetch_add(1, Ordering::Relaxed);
        debug!("Work memory released: {} bytes, total: {} bytes", bytes, total);
    }

    /// Records one shrink-and-retry step of the allocation loop
    pub fn record_shrink_retry(&self) {
        self.shrink_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets current usage statistics
    pub fn get_stats(&self) -> ArenaStats {
        ArenaStats {
            committed: self.committed.load(Ordering::Relaxed),
            peak_committed: self.peak_committed.load(Ordering::Relaxed),
            commit_count: self.commit_count.load(Ordering::Relaxed),
            shrink_retries: self.shrink_retries.load(Ordering::Relaxed),
            release_count: self.release_count.load(Ordering::Relaxed),
        }
    }

    /// Logs current usage statistics
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Work memory stats:\n\
             Committed: {} bytes\n\
             Peak committed: {} bytes\n\
             Commits/releases: {}/{}\n\
             Shrink retries: {}",
            stats.committed,
            stats.peak_committed,
            stats.commit_count,
            stats.release_count,
            stats.shrink_retries
        );
    }
}

impl Default for ArenaMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about work memory usage
#[derive(Debug, Clone, Copy)]
pub struct ArenaStats {
    pub committed: u64,
    pub peak_committed: u64,
    pub commit_count: u64,
    pub shrink_retries: u64,
    pub release_count: u64,
}
