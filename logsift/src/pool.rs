use crossbeam::channel::{self, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::debug;

use crate::config::MAX_WORKER_THREADS;
use crate::errors::{ProcessError, ProcessResult};

/// Unit of work handed to one pool worker
pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Job),
    Stop,
}

struct WorkerSlot {
    command_tx: Sender<Command>,
    done_rx: Receiver<()>,
    staged: Option<Job>,
    started: bool,
    handle: Option<JoinHandle<()>>,
}

/// Pool of reusable worker threads driven in rounds.
///
/// A round stages one job per participating worker with
/// [`configure_thread`](ThreadPool::configure_thread), launches them all
/// with [`start_configured_threads`](ThreadPool::start_configured_threads)
/// and blocks in [`wait_for_all_threads`](ThreadPool::wait_for_all_threads)
/// until every launched job has finished. Waiting also discards jobs that
/// were staged but never started, so each round begins from a clean slate.
/// Workers stay parked between rounds until
/// [`kill_threads`](ThreadPool::kill_threads) shuts the pool down for good.
pub struct ThreadPool {
    slots: Vec<WorkerSlot>,
}

impl ThreadPool {
    /// Spawns `threads` parked workers
    pub fn new(threads: usize) -> ProcessResult<Self> {
        if threads == 0 || threads > MAX_WORKER_THREADS {
            return Err(ProcessError::pool_misuse(format!(
                "thread count {} outside 1..={}",
                threads, MAX_WORKER_THREADS
            )));
        }

        let mut slots = Vec::with_capacity(threads);
        for index in 0..threads {
            let (command_tx, command_rx) = channel::unbounded::<Command>();
            let (done_tx, done_rx) = channel::unbounded::<()>();
            let handle = std::thread::Builder::new()
                .name(format!("logsift-worker-{}", index))
                .spawn(move || worker_loop(command_rx, done_tx))?;
            slots.push(WorkerSlot {
                command_tx,
                done_rx,
                staged: None,
                started: false,
                handle: Some(handle),
            });
        }

        debug!("thread pool spawned with {} workers", threads);
        Ok(Self { slots })
    }

    pub fn num_threads(&self) -> usize {
        self.slots.len()
    }

    /// Stages a job on one worker for the next round. Replaces any job
    /// already staged on that worker.
    pub fn configure_thread(&mut self, index: usize, job: Job) -> ProcessResult<()> {
        let count = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            ProcessError::pool_misuse(format!("worker index {} out of range ({})", index, count))
        })?;
        if slot.started {
            return Err(ProcessError::pool_misuse(format!(
                "worker {} is still running a job",
                index
            )));
        }
        slot.staged = Some(job);
        Ok(())
    }

    /// Sends every staged job to its worker and returns how many started
    pub fn start_configured_threads(&mut self) -> ProcessResult<usize> {
        let mut started = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(job) = slot.staged.take() else {
                continue;
            };
            slot.command_tx.send(Command::Run(job)).map_err(|_| {
                ProcessError::pool_misuse(format!("worker {} is no longer running", index))
            })?;
            slot.started = true;
            started += 1;
        }
        Ok(started)
    }

    /// Blocks until every started worker has signalled completion.
    ///
    /// Also discards any staged-but-unstarted jobs, leaving the pool
    /// ready for the next round.
    pub fn wait_for_all_threads(&mut self) -> ProcessResult<()> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.staged = None;
            if !slot.started {
                continue;
            }
            slot.done_rx.recv().map_err(|_| {
                ProcessError::pool_misuse(format!("worker {} terminated unexpectedly", index))
            })?;
            slot.started = false;
        }
        Ok(())
    }

    /// Stops and joins every worker. Safe to call more than once; the
    /// pool is unusable afterwards.
    pub fn kill_threads(&mut self) {
        for slot in &mut self.slots {
            // Ignore send failures, the worker may already be gone
            let _ = slot.command_tx.send(Command::Stop);
        }
        for slot in &mut self.slots {
            if let Some(handle) = slot.handle.take() {
                let _ = handle.join();
            }
        }
        self.slots.clear();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        debug_assert!(
            self.slots.iter().all(|slot| !slot.started),
            "thread pool dropped while workers are running"
        );
        self.kill_threads();
    }
}

fn worker_loop(command_rx: Receiver<Command>, done_tx: Sender<()>) {
    while let Ok(Command::Run(job)) = command_rx.recv() {
        job();
        if done_tx.send(()).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_rounds_reuse_workers() {
        let mut pool = ThreadPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            for index in 0..4 {
                let counter = counter.clone();
                pool.configure_thread(
                    index,
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
            }
            assert_eq!(pool.start_configured_threads().unwrap(), 4);
            pool.wait_for_all_threads().unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 8);
        pool.kill_threads();
    }

    #[test]
    fn test_unconfigured_workers_are_skipped() {
        let mut pool = ThreadPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for index in 0..2 {
            let counter = counter.clone();
            pool.configure_thread(
                index,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        }

        assert_eq!(pool.start_configured_threads().unwrap(), 2);
        pool.wait_for_all_threads().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        pool.kill_threads();
    }

    #[test]
    fn test_jobs_run_concurrently() {
        let mut pool = ThreadPool::new(2).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        for index in 0..2 {
            let barrier = barrier.clone();
            pool.configure_thread(
                index,
                Box::new(move || {
                    barrier.wait();
                }),
            )
            .unwrap();
        }

        // Both jobs block on the barrier, so the round only completes if
        // they run on different threads
        pool.start_configured_threads().unwrap();
        pool.wait_for_all_threads().unwrap();
        pool.kill_threads();
    }

    #[test]
    fn test_wait_discards_staged_jobs() {
        let mut pool = ThreadPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        {
            let counter = counter.clone();
            pool.configure_thread(
                0,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        }
        pool.start_configured_threads().unwrap();

        // Staged after the round started, never launched
        {
            let counter = counter.clone();
            pool.configure_thread(
                1,
                Box::new(move || {
                    counter.fetch_add(100, Ordering::SeqCst);
                }),
            )
            .unwrap();
        }
        pool.wait_for_all_threads().unwrap();

        assert_eq!(pool.start_configured_threads().unwrap(), 0);
        pool.wait_for_all_threads().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        pool.kill_threads();
    }

    #[test]
    fn test_configure_out_of_range() {
        let mut pool = ThreadPool::new(2).unwrap();
        let result = pool.configure_thread(5, Box::new(|| {}));
        assert!(matches!(result, Err(ProcessError::PoolMisuse(_))));
        pool.kill_threads();
    }

    #[test]
    fn test_invalid_thread_counts() {
        assert!(ThreadPool::new(0).is_err());
        assert!(ThreadPool::new(MAX_WORKER_THREADS + 1).is_err());
    }

    #[test]
    fn test_kill_is_idempotent() {
        let mut pool = ThreadPool::new(2).unwrap();
        pool.kill_threads();
        pool.kill_threads();
        assert_eq!(pool.num_threads(), 0);
    }
}
