//! Chunked parallel scanning over large log files.
//!
//! The two passes offered here share one processing shape. A pass stages
//! a contiguous range of rows in work memory (a chunk), fans the rows
//! out over a pool of workers, and repeats with the next chunk until the
//! log is exhausted or the pass stops early:
//!
//! - [`search`] walks rows from a starting point in either direction and
//!   reports the first row matching a pattern. Workers share a stop flag
//!   so a match ends the pass within a bounded number of rows.
//! - [`run_filter`] classifies every row in scope against an ordered set
//!   of filters, recording the first matching filter per row and a
//!   running ordinal for the rows that stay visible.
//!
//! Chunking keeps memory use bounded by the configured work memory size
//! rather than the log size; see [`crate::arena::WorkArena`]. Row bytes
//! reach the passes through the [`ChunkSource`] seam, so the same code
//! runs over a memory-mapped file or any in-memory buffer.

pub mod engine;
pub mod filtering;
pub mod matcher;
pub mod partition;
pub mod processor;

pub use engine::{search, FilterView, SearchExecutor, SearchQuery};
pub use filtering::{
    pack_filters, refilter_one_row, run_filter, FilterExecutor, FilterQuery, PackedFilter,
};
pub use matcher::MatchStrategy;
pub use partition::{Direction, RowBlock, ThreadStride};
pub use processor::{Chunk, ChunkSource, SliceSource};
