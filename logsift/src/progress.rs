use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::config::{Settings, MAX_WORKER_THREADS};

/// Tri-state outcome of the most recent pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// No pass has finished since the last reset
    Unset,
    Fail,
    Success,
}

impl CompletionState {
    fn from_i8(value: i8) -> Self {
        match value {
            1 => CompletionState::Success,
            0 => CompletionState::Fail,
            _ => CompletionState::Unset,
        }
    }

    fn as_i8(self) -> i8 {
        match self {
            CompletionState::Success => 1,
            CompletionState::Fail => 0,
            CompletionState::Unset => -1,
        }
    }
}

/// Sink for progress updates and the abort flag, shared between the
/// processing pass and whoever is watching it.
///
/// Workers call [`step_progress`](ProgressReporter::step_progress) with
/// their own counter index; the pass driver owns the rest. All methods
/// default to no-ops so observers only implement what they consume.
pub trait ProgressReporter: Send + Sync {
    /// Declares how many per-worker counters the coming pass will use
    fn set_num_counters(&self, _count: usize) {}

    /// Sets the fraction added by each [`step_progress`](ProgressReporter::step_progress) call
    fn setup_counter_step(&self, _step: f64) {}

    /// Sets every active counter to `fraction`
    fn set_progress(&self, _fraction: f64) {}

    /// Advances one worker's counter by the configured step
    fn step_progress(&self, _counter: usize) {}

    /// Queues a line of human-readable status text
    fn add_progress_info(&self, _message: String) {}

    fn is_aborted(&self) -> bool {
        false
    }

    fn request_abort(&self) {}

    /// Marks the pass successful and drives all counters to done
    fn set_success(&self) {}

    /// Marks the pass failed and drives all counters to done
    fn set_fail(&self) {}

    /// Clears the outcome and counters ahead of a new pass
    fn set_init(&self) {}

    fn completion(&self) -> CompletionState {
        CompletionState::Unset
    }
}

struct CounterBank {
    counters: [f64; MAX_WORKER_THREADS],
    active: usize,
    step: f64,
}

/// Default [`ProgressReporter`] holding the counter bank, the info queue
/// and the abort flag behind thread-safe primitives.
pub struct ProgressState {
    bank: Mutex<CounterBank>,
    info: Mutex<VecDeque<String>>,
    abort: AtomicBool,
    completion: AtomicI8,
}

impl ProgressState {
    pub fn new() -> Self {
        Self {
            bank: Mutex::new(CounterBank {
                counters: [0.0; MAX_WORKER_THREADS],
                active: 1,
                step: 0.0,
            }),
            info: Mutex::new(VecDeque::new()),
            abort: AtomicBool::new(false),
            completion: AtomicI8::new(CompletionState::Unset.as_i8()),
        }
    }

    /// Average fraction over the active counters, clamped to 1.0
    pub fn overall(&self) -> f64 {
        let bank = self.bank.lock().unwrap();
        let sum: f64 = bank.counters[..bank.active].iter().sum();
        (sum / bank.active as f64).min(1.0)
    }

    /// Snapshot of the active counters
    pub fn counters(&self) -> Vec<f64> {
        let bank = self.bank.lock().unwrap();
        bank.counters[..bank.active].to_vec()
    }

    /// Pops the oldest queued info line, if any
    pub fn take_progress_info(&self) -> Option<String> {
        self.info.lock().unwrap().pop_front()
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ProgressState {
    fn set_num_counters(&self, count: usize) {
        let mut bank = self.bank.lock().unwrap();
        if count == 0 || count > MAX_WORKER_THREADS {
            warn!(
                "progress counter count {} outside 1..={}, clamped",
                count, MAX_WORKER_THREADS
            );
        }
        bank.active = count.clamp(1, MAX_WORKER_THREADS);
    }

    fn setup_counter_step(&self, step: f64) {
        self.bank.lock().unwrap().step = step;
    }

    fn set_progress(&self, fraction: f64) {
        let mut bank = self.bank.lock().unwrap();
        let active = bank.active;
        for counter in &mut bank.counters[..active] {
            *counter = fraction;
        }
    }

    fn step_progress(&self, counter: usize) {
        let mut bank = self.bank.lock().unwrap();
        let index = if counter >= bank.active {
            warn!(
                "progress counter {} out of range (active {}), using 0",
                counter, bank.active
            );
            0
        } else {
            counter
        };
        bank.counters[index] += bank.step;
    }

    fn add_progress_info(&self, message: String) {
        self.info.lock().unwrap().push_back(message);
    }

    fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    fn request_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    fn set_success(&self) {
        self.completion
            .store(CompletionState::Success.as_i8(), Ordering::Relaxed);
        self.set_progress(1.0);
    }

    fn set_fail(&self) {
        self.completion
            .store(CompletionState::Fail.as_i8(), Ordering::Relaxed);
        self.set_progress(1.0);
    }

    fn set_init(&self) {
        self.completion
            .store(CompletionState::Unset.as_i8(), Ordering::Relaxed);
        self.abort.store(false, Ordering::Relaxed);
        self.set_progress(0.0);
    }

    fn completion(&self) -> CompletionState {
        CompletionState::from_i8(self.completion.load(Ordering::Relaxed))
    }
}

/// Settings plus the progress sink a pass reports into
#[derive(Clone)]
pub struct ProcessingContext {
    pub settings: Settings,
    pub reporter: Arc<dyn ProgressReporter>,
}

impl ProcessingContext {
    pub fn new(settings: Settings, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { settings, reporter }
    }

    /// Builds a context around a fresh [`ProgressState`] and also hands
    /// back the concrete state for polling
    pub fn with_default_reporter(settings: Settings) -> (Self, Arc<ProgressState>) {
        let state = Arc::new(ProgressState::new());
        let context = Self {
            settings,
            reporter: state.clone(),
        };
        (context, state)
    }
}

impl fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
