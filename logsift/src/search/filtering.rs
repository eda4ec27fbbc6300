use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::arena::WorkArena;
use crate::errors::{ProcessError, ProcessResult};
use crate::filters::{FilterLut, FilterSet, FirArray, BOOKMARK_LUT_INDEX};
use crate::pool::ThreadPool;
use crate::progress::{ProcessingContext, ProgressReporter};
use crate::results::FilterSummary;
use crate::tia::TextItemArray;

use super::matcher::MatchStrategy;
use super::partition::{blocks, usable_workers};
use super::processor::{
    load_chunk, plan_forward, setup_chunk_progress, ChunkSource, BATCH_CHECK_ROWS,
    PROGRESS_ROW_STEP,
};

/// Scope of one filter pass
#[derive(Debug, Clone, Default)]
pub struct FilterQuery {
    /// Process only rows strictly between these two rows; the clip rows
    /// themselves are left out
    pub row_clip: Option<(usize, usize)>,
    /// Match only against this byte window of each row
    pub col_clip: Option<(usize, usize)>,
    /// First row of an incremental pass; records below it are kept
    pub incremental_from: Option<usize>,
    /// Rows decorated as bookmarks after matching
    pub bookmarks: Vec<usize>,
}

/// One enabled filter in scan-ready form. `lut_index` is the slot the
/// filter occupies in the lookup table, which is always its packed
/// position plus one.
#[derive(Debug, Clone)]
pub struct PackedFilter {
    strategy: MatchStrategy,
    pub lut_index: u8,
    pub exclude: bool,
}

impl PackedFilter {
    fn matches(&self, line: &[u8], col_clip: Option<(usize, usize)>) -> bool {
        let effective = self.strategy.effective_len(line.len());
        let (start, end) = match col_clip {
            None => (0, effective),
            Some((s, e)) => (s.min(effective), e.min(effective)),
        };
        if start >= end {
            return false;
        }
        self.strategy.matches_bytes(&line[start..end])
    }
}

fn compile_packed(lut: &FilterLut) -> ProcessResult<Vec<PackedFilter>> {
    let mut packed = Vec::with_capacity(lut.active_count());
    for (lut_index, item) in lut.iter_active() {
        if lut_index as usize != packed.len() + 1 {
            error!(
                "filter table slot {} does not line up with packed position {}",
                lut_index,
                packed.len()
            );
            return Err(ProcessError::inconsistency("filter table has holes"));
        }
        packed.push(PackedFilter {
            strategy: MatchStrategy::for_item(item)?,
            lut_index,
            exclude: item.exclude,
        });
    }
    Ok(packed)
}

/// Compiles the enabled filters into scan order, reporting any pattern
/// problem through the progress queue before failing
pub fn pack_filters(
    lut: &FilterLut,
    reporter: &dyn ProgressReporter,
) -> ProcessResult<Vec<PackedFilter>> {
    reporter.add_progress_info("  Packing filters".to_string());
    match compile_packed(lut) {
        Ok(packed) => Ok(packed),
        Err(e) => {
            reporter.add_progress_info(e.to_string());
            Err(e)
        }
    }
}

/// Rows a pass walks, both ends inclusive
fn processing_range(total: usize, query: &FilterQuery) -> Option<(usize, usize)> {
    if total == 0 {
        return None;
    }
    let mut first = 0usize;
    let mut last = total - 1;
    if let Some((clip_start, clip_end)) = query.row_clip {
        first = clip_start.saturating_add(1);
        last = clip_end.saturating_sub(1).min(last);
    }
    if let Some(from) = query.incremental_from {
        first = first.max(from);
    }
    (first <= last).then_some((first, last))
}

/// Runs filter passes over one log through a pool of workers
pub struct FilterExecutor<'a> {
    source: &'a dyn ChunkSource,
    tia: Arc<TextItemArray>,
    context: &'a ProcessingContext,
}

impl<'a> FilterExecutor<'a> {
    pub fn new(
        source: &'a dyn ChunkSource,
        tia: Arc<TextItemArray>,
        context: &'a ProcessingContext,
    ) -> Self {
        Self {
            source,
            tia,
            context,
        }
    }

    /// Runs one filter pass to completion.
    ///
    /// The processing range is cleared, scanned chunk by chunk with each
    /// row taking the first filter that matches it, then bookmark rows
    /// are decorated and the whole array is renumerated. An abort wipes
    /// all records so the view never shows a half-filtered log.
    pub fn start_processing(
        &self,
        pool: &mut ThreadPool,
        arena: &mut WorkArena,
        fira: &mut FirArray,
        lut: &FilterLut,
        query: &FilterQuery,
    ) -> ProcessResult<FilterSummary> {
        let reporter = &self.context.reporter;
        reporter.set_init();
        reporter.add_progress_info("Start filtering".to_string());

        let total = self.tia.rows();
        if fira.rows() != total {
            fira.resize(total);
        }

        let has_bookmarks = !query.bookmarks.is_empty();
        if lut.active_count() == 0 && !has_bookmarks {
            fira.clear_all();
            reporter.add_progress_info(
                "Filtering completed, no matches, no filters are enabled".to_string(),
            );
            reporter.add_progress_info("Please add filter items before filtering".to_string());
            reporter.set_fail();
            return Ok(FilterSummary::default());
        }

        let packed = match pack_filters(lut, reporter.as_ref()) {
            Ok(packed) => packed,
            Err(e) => {
                reporter.request_abort();
                reporter.set_fail();
                return Err(e);
            }
        };

        let range = processing_range(total, query);
        info!(
            "Starting filter pass: {} filters, rows {:?}",
            packed.len(),
            range
        );
        if let Some((first, last)) = range {
            if first == 0 && last + 1 == total {
                fira.clear_all();
            } else {
                fira.clear_range(first..=last);
            }
        }

        // A pass with only bookmarks skips the scan and goes straight to
        // post-processing
        let scan_range = if packed.is_empty() { None } else { range };

        let mut aborted = false;
        if let Some((first, last)) = scan_range {
            let mut position = first;
            while position <= last {
                let Some(mut chunk) = plan_forward(&self.tia, position, arena.size()) else {
                    break;
                };
                if chunk.last_row() > last {
                    chunk.rows = last + 1 - chunk.first_row;
                }
                load_chunk(
                    self.source,
                    &self.tia,
                    &mut chunk,
                    arena.write_view()?,
                    reporter.as_ref(),
                )?;

                let workers = usable_workers(
                    chunk.rows,
                    pool.num_threads(),
                    self.context.settings.multi_thread_row_floor,
                );
                let row_blocks = blocks(chunk.first_row, chunk.rows, workers);
                setup_chunk_progress(reporter.as_ref(), workers, chunk.rows);
                debug!(
                    "filter round: rows {}..={} over {} workers",
                    chunk.first_row,
                    chunk.last_row(),
                    workers
                );

                let view = arena.read_view()?;
                let mut sinks: Vec<Arc<Mutex<Vec<(u32, u8)>>>> = Vec::with_capacity(workers);
                for (index, block) in row_blocks.iter().copied().enumerate() {
                    let sink = Arc::new(Mutex::new(Vec::new()));
                    sinks.push(Arc::clone(&sink));
                    let view = view.clone();
                    let tia = Arc::clone(&self.tia);
                    let reporter = Arc::clone(reporter);
                    let packed = packed.clone();
                    let col_clip = query.col_clip;
                    pool.configure_thread(
                        index,
                        Box::new(move || {
                            let mut visited = 0usize;
                            let mut hits: Vec<(u32, u8)> = Vec::new();
                            for row in block.first_row..block.first_row + block.count {
                                if visited % BATCH_CHECK_ROWS == 0 && reporter.is_aborted() {
                                    break;
                                }
                                visited += 1;
                                if visited % PROGRESS_ROW_STEP == 0 {
                                    reporter.step_progress(index);
                                }
                                let Some(item) = tia.get(row) else {
                                    continue;
                                };
                                let Some(line) = chunk.line_bytes(&view, item) else {
                                    continue;
                                };
                                for filter in &packed {
                                    if filter.matches(line, col_clip) {
                                        hits.push((row as u32, filter.lut_index));
                                        break;
                                    }
                                }
                            }
                            sink.lock().unwrap().extend(hits);
                        }),
                    )?;
                }
                pool.start_configured_threads()?;
                pool.wait_for_all_threads()?;

                for sink in &sinks {
                    for (row, lut_index) in sink.lock().unwrap().drain(..) {
                        fira.set_lut_index(row as usize, lut_index);
                    }
                }

                if reporter.is_aborted() {
                    aborted = true;
                    break;
                }
                position = chunk.first_row + chunk.rows;
            }
        }

        if aborted {
            fira.clear_all();
            reporter.add_progress_info("  Filtering aborted, all cleaned".to_string());
            reporter.add_progress_info("Filtering aborted".to_string());
            reporter.set_fail();
            return Ok(FilterSummary {
                matches: 0,
                exclude_matches: 0,
                aborted: true,
            });
        }

        reporter.add_progress_info("  Post-process filtering".to_string());
        fira.decorate_bookmarks(&query.bookmarks);
        fira.renumerate(lut);
        reporter.add_progress_info("  Filtering done".to_string());

        let summary = FilterSummary {
            matches: fira.filter_matches(),
            exclude_matches: fira.filter_exclude_matches(),
            aborted: false,
        };
        if summary.matches == 0 {
            reporter.add_progress_info("Filtering completed, no matches".to_string());
            reporter.set_fail();
        } else {
            reporter.add_progress_info(format!(
                "Filtering completed, {} matches",
                summary.matches
            ));
            reporter.set_success();
        }
        info!(
            "Filter pass done: {} matches, {} excluded",
            summary.matches, summary.exclude_matches
        );
        Ok(summary)
    }
}

/// Re-evaluates a single row in place, then renumerates.
///
/// Used when one row's state changes without a full pass, typically a
/// bookmark being set or cleared. A bookmarked row always takes the
/// bookmark slot regardless of filter matches.
pub fn refilter_one_row(
    fira: &mut FirArray,
    lut: &FilterLut,
    row: usize,
    line: &[u8],
    bookmarked: bool,
) -> ProcessResult<()> {
    let packed = compile_packed(lut)?;
    let mut lut_index = 0u8;
    if bookmarked {
        lut_index = BOOKMARK_LUT_INDEX;
    } else {
        for filter in &packed {
            if filter.matches(line, None) {
                lut_index = filter.lut_index;
                break;
            }
        }
    }
    fira.set_lut_index(row, lut_index);
    fira.renumerate(lut);
    Ok(())
}

/// Runs a complete filter pass with its own work memory and worker pool.
///
/// Builds the lookup table and a fresh record array, reports progress and
/// outcome text through the context's reporter, and returns all three.
pub fn run_filter(
    source: &dyn ChunkSource,
    tia: Arc<TextItemArray>,
    set: &FilterSet,
    query: &FilterQuery,
    context: &ProcessingContext,
) -> ProcessResult<(FirArray, FilterLut, FilterSummary)> {
    let reporter = &context.reporter;
    let lut = FilterLut::generate(set);
    let mut fira = FirArray::new(tia.rows());

    let mut arena = WorkArena::new();
    if let Err(e) = arena.commit(&context.settings) {
        reporter.add_progress_info(
            "Failed to acquire memory for filtering, filtering aborted".to_string(),
        );
        reporter.set_fail();
        return Err(e);
    }

    let mut pool = ThreadPool::new(context.settings.worker_threads())?;
    let executor = FilterExecutor::new(source, tia, context);
    let result = executor.start_processing(&mut pool, &mut arena, &mut fira, &lut, query);
    pool.kill_threads();
    result.map(|summary| (fira, lut, summary))
}
