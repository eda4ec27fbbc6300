pub mod arena;
pub mod config;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod pool;
pub mod progress;
pub mod results;
pub mod search;
pub mod tia;

pub use arena::{ArenaView, WorkArena};
pub use config::Settings;
pub use errors::{ProcessError, ProcessResult};
pub use filters::{FilterItem, FilterLut, FilterSet, FirArray, PackedFirArray};
pub use metrics::{ArenaMetrics, ArenaStats};
pub use pool::ThreadPool;
pub use progress::{CompletionState, ProcessingContext, ProgressReporter, ProgressState};
pub use results::{FilterSummary, SearchOutcome, TimedOutcome};
pub use search::{
    run_filter, search, ChunkSource, Direction, FilterQuery, FilterView, SearchQuery, SliceSource,
};
pub use tia::{TextItem, TextItemArray};
