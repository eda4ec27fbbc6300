use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::arena::WorkArena;
use crate::errors::ProcessResult;
use crate::filters::{FilterLut, FirArray};
use crate::pool::ThreadPool;
use crate::progress::{ProcessingContext, ProgressReporter};
use crate::results::SearchOutcome;
use crate::tia::TextItemArray;

use super::matcher::MatchStrategy;
use super::partition::{strided, usable_workers, verify_coverage, Direction};
use super::processor::{
    load_chunk, plan_backward, plan_forward, setup_chunk_progress, Chunk, ChunkSource,
    BATCH_CHECK_ROWS, PROGRESS_ROW_STEP,
};

/// What to look for and where to start
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub pattern: String,
    pub case_sensitive: bool,
    pub regex: bool,
    pub direction: Direction,
    /// Row the scan starts from; defaults to the first row in the scan
    /// direction
    pub start_row: Option<usize>,
    /// When set, the scan only visits rows visible in the filtered view
    pub filter_view: Option<FilterView>,
}

impl SearchQuery {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: false,
            regex: false,
            direction: Direction::Forward,
            start_row: None,
            filter_view: None,
        }
    }
}

/// Filter-pass output a search can be restricted to.
///
/// A row participates in the scan when its index record points at a
/// lookup table entry that exists and is not an exclude filter. Rows
/// the filter pass left at index 0 are invisible, matching what a
/// filtered presentation shows.
#[derive(Clone)]
pub struct FilterView {
    fira: Arc<FirArray>,
    lut: Arc<FilterLut>,
}

impl FilterView {
    pub fn new(fira: Arc<FirArray>, lut: Arc<FilterLut>) -> Self {
        Self { fira, lut }
    }

    /// Whether `row` is visible to the scan
    pub fn participates(&self, row: usize) -> bool {
        let index = self.fira.lut_index(row);
        index != 0 && !self.lut.is_excluded(index)
    }
}

impl fmt::Debug for FilterView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterView")
            .field("rows", &self.fira.rows())
            .field("filters", &self.lut.active_count())
            .finish()
    }
}

/// Flags shared by the workers of one chunk round.
///
/// `stop` is set by the first worker that matches. Each slot holds the
/// row its worker stopped at: its own match, or the next unexamined row
/// when it saw the stop flag. -1 means the worker ran its whole stride
/// without matching.
struct SearchShared {
    stop: AtomicBool,
    slots: Vec<AtomicI64>,
}

impl SearchShared {
    fn new(workers: usize) -> Self {
        Self {
            stop: AtomicBool::new(false),
            slots: (0..workers).map(|_| AtomicI64::new(-1)).collect(),
        }
    }

    fn recorded_rows(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let value = slot.load(Ordering::Relaxed);
                (value >= 0).then_some(value as usize)
            })
            .collect()
    }
}

/// Runs search passes over one log through a pool of workers
pub struct SearchExecutor<'a> {
    source: &'a dyn ChunkSource,
    tia: Arc<TextItemArray>,
    context: &'a ProcessingContext,
}

impl<'a> SearchExecutor<'a> {
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

    /// Runs one search pass to completion.
    ///
    /// The log is processed chunk by chunk in the scan direction. Within
    /// a chunk, rows are interleaved over the pool workers; the first
    /// match raises the stop flag, and the pass resolves the winning row
    /// from the workers' stop slots before reporting.
    pub fn start_processing(
        &self,
        pool: &mut ThreadPool,
        arena: &mut WorkArena,
        query: &SearchQuery,
    ) -> ProcessResult<SearchOutcome> {
        let reporter = &self.context.reporter;
        reporter.set_init();

        // Pattern problems surface before any worker runs
        let strategy =
            match MatchStrategy::compile(&query.pattern, query.case_sensitive, query.regex) {
                Ok(strategy) => strategy,
                Err(e) => {
                    reporter.add_progress_info(e.to_string());
                    reporter.request_abort();
                    reporter.set_fail();
                    return Err(e);
                }
            };

        let total = self.tia.rows();
        reporter.add_progress_info("Starting search".to_string());
        info!(
            "Starting search: pattern={:?}, direction={:?}, rows={}",
            query.pattern, query.direction, total
        );

        let mut next: Option<usize> = match query.direction {
            Direction::Forward => Some(query.start_row.unwrap_or(0)),
            Direction::Backward => {
                if total == 0 {
                    None
                } else {
                    Some(query.start_row.unwrap_or(total - 1).min(total - 1))
                }
            }
        };

        let mut outcome = SearchOutcome::NoMatch;
        while let Some(position) = next {
            let planned = match query.direction {
                Direction::Forward => plan_forward(&self.tia, position, arena.size()),
                Direction::Backward => plan_backward(&self.tia, position, arena.size()),
            };
            let Some(mut chunk) = planned else {
                break;
            };
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
            let origin = match query.direction {
                Direction::Forward => chunk.first_row,
                Direction::Backward => chunk.last_row(),
            };
            let strides = strided(origin, chunk.rows, workers, query.direction);
            debug_assert!(verify_coverage(&strides, chunk.first_row, chunk.rows));
            setup_chunk_progress(reporter.as_ref(), workers, chunk.rows);
            debug!(
                "search round: rows {}..={} over {} workers",
                chunk.first_row,
                chunk.last_row(),
                workers
            );

            let shared = Arc::new(SearchShared::new(workers));
            let view = arena.read_view()?;
            for (index, stride) in strides.iter().copied().enumerate() {
                let shared = Arc::clone(&shared);
                let view = view.clone();
                let tia = Arc::clone(&self.tia);
                let reporter = Arc::clone(reporter);
                let strategy = strategy.clone();
                let filter_view = query.filter_view.clone();
                pool.configure_thread(
                    index,
                    Box::new(move || {
                        let mut visited = 0usize;
                        for row in stride.rows() {
                            if visited % BATCH_CHECK_ROWS == 0
                                && (shared.stop.load(Ordering::Relaxed) || reporter.is_aborted())
                            {
                                shared.slots[index].store(row as i64, Ordering::Relaxed);
                                return;
                            }
                            visited += 1;
                            if visited % PROGRESS_ROW_STEP == 0 {
                                reporter.step_progress(index);
                            }
                            if filter_view
                                .as_ref()
                                .is_some_and(|filtered| !filtered.participates(row))
                            {
                                continue;
                            }
                            let Some(item) = tia.get(row) else {
                                continue;
                            };
                            let Some(line) = chunk.line_bytes(&view, item) else {
                                continue;
                            };
                            if strategy.match_line(line) {
                                shared.slots[index].store(row as i64, Ordering::Relaxed);
                                shared.stop.store(true, Ordering::Relaxed);
                                return;
                            }
                        }
                    }),
                )?;
            }
            pool.start_configured_threads()?;
            pool.wait_for_all_threads()?;

            if reporter.is_aborted() {
                outcome = SearchOutcome::Aborted;
                break;
            }
            if shared.stop.load(Ordering::Relaxed) {
                reporter.add_progress_info("  Search hit, aligning threads".to_string());
                outcome = self.resolve_match(&chunk, &view, &strategy, query, &shared);
                break;
            }

            next = match query.direction {
                Direction::Forward => {
                    let after = chunk.first_row + chunk.rows;
                    (after < total).then_some(after)
                }
                Direction::Backward => chunk.first_row.checked_sub(1),
            };
        }

        match outcome {
            SearchOutcome::Match { row } => {
                reporter.add_progress_info(format!("Search complete, match at row {}", row));
                reporter.set_success();
            }
            SearchOutcome::NoMatch => {
                reporter.add_progress_info("Search complete, no match".to_string());
                reporter.set_fail();
            }
            SearchOutcome::Aborted => {
                reporter.add_progress_info("Search aborted by user".to_string());
                reporter.set_fail();
            }
        }
        Ok(outcome)
    }

    /// Picks the winning row after a round raised the stop flag.
    ///
    /// The true first match lies between the lowest and highest recorded
    /// slot rows in scan order. A single recorded row can only be the
    /// matching worker's own hit; otherwise that window is re-scanned
    /// sequentially with the same strategy and the first hit wins. A
    /// re-scan that comes up empty means the shared state went bad, which
    /// is logged and reported as no match.
    fn resolve_match(
        &self,
        chunk: &Chunk,
        view: &[u8],
        strategy: &MatchStrategy,
        query: &SearchQuery,
        shared: &SearchShared,
    ) -> SearchOutcome {
        let recorded = shared.recorded_rows();
        let Some(low) = recorded.iter().min().copied() else {
            error!("stop flag raised but no worker recorded a stop row");
            return SearchOutcome::NoMatch;
        };
        let high = recorded.iter().max().copied().unwrap_or(low);
        if low == high {
            return SearchOutcome::Match { row: low };
        }

        let filter_view = query.filter_view.as_ref();
        match query.direction {
            Direction::Forward => {
                for row in low..=high {
                    if self.row_matches(chunk, view, strategy, filter_view, row) {
                        return SearchOutcome::Match { row };
                    }
                }
            }
            Direction::Backward => {
                let mut row = high;
                loop {
                    if self.row_matches(chunk, view, strategy, filter_view, row) {
                        return SearchOutcome::Match { row };
                    }
                    if row == low {
                        break;
                    }
                    row -= 1;
                }
            }
        }
        error!("no row in stop window {}..={} re-matched", low, high);
        SearchOutcome::NoMatch
    }

    fn row_matches(
        &self,
        chunk: &Chunk,
        view: &[u8],
        strategy: &MatchStrategy,
        filter_view: Option<&FilterView>,
        row: usize,
    ) -> bool {
        if filter_view.is_some_and(|filtered| !filtered.participates(row)) {
            return false;
        }
        self.tia
            .get(row)
            .and_then(|item| chunk.line_bytes(view, item))
            .is_some_and(|line| strategy.match_line(line))
    }
}

/// Runs a complete search pass with its own work memory and worker pool.
///
/// Reports progress and outcome text through the context's reporter and
/// returns the outcome.
pub fn search(
    source: &dyn ChunkSource,
    tia: Arc<TextItemArray>,
    query: &SearchQuery,
    context: &ProcessingContext,
) -> ProcessResult<SearchOutcome> {
    let reporter = &context.reporter;
    if tia.is_empty() {
        reporter.add_progress_info("Log file is empty, search aborted".to_string());
        reporter.set_fail();
        return Ok(SearchOutcome::NoMatch);
    }

    let mut arena = WorkArena::new();
    if let Err(e) = arena.tiny_commit(&context.settings) {
        reporter.add_progress_info("Failed to acquire memory for search, search aborted".to_string());
        reporter.set_fail();
        return Err(e);
    }

    let mut pool = ThreadPool::new(context.settings.worker_threads())?;
    let executor = SearchExecutor::new(source, tia, context);
    let result = executor.start_processing(&mut pool, &mut arena, query);
    pool.kill_threads();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::errors::ProcessError;
    use crate::filters::{FilterItem, FilterSet, BOOKMARK_LUT_INDEX};
    use crate::progress::{CompletionState, ProgressReporter, ProgressState};
    use crate::search::processor::SliceSource;
    use crate::tia::TextItem;

    fn make_log(lines: &[&str]) -> (Vec<u8>, Arc<TextItemArray>) {
        let mut data = Vec::new();
        let mut items = Vec::new();
        for line in lines {
            let offset = data.len() as u64;
            data.extend_from_slice(line.as_bytes());
            data.push(b'\n');
            items.push(TextItem {
                offset,
                size: (line.len() + 1) as u32,
            });
        }
        (data, Arc::new(TextItemArray::new(items)))
    }

    fn run(query: &SearchQuery, lines: &[&str]) -> SearchOutcome {
        let (data, tia) = make_log(lines);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());
        search(&source, tia, query, &context).unwrap()
    }

    #[test]
    fn test_forward_finds_first_match() {
        let outcome = run(
            &SearchQuery::new("error"),
            &["ok", "error one", "fine", "error two"],
        );
        assert_eq!(outcome, SearchOutcome::Match { row: 1 });
    }

    #[test]
    fn test_backward_finds_last_match() {
        let mut query = SearchQuery::new("error");
        query.direction = Direction::Backward;
        let outcome = run(&query, &["ok", "error one", "fine", "error two"]);
        assert_eq!(outcome, SearchOutcome::Match { row: 3 });
    }

    #[test]
    fn test_forward_start_row_skips_earlier_matches() {
        let mut query = SearchQuery::new("error");
        query.start_row = Some(2);
        let outcome = run(&query, &["error early", "ok", "ok", "error late"]);
        assert_eq!(outcome, SearchOutcome::Match { row: 3 });
    }

    #[test]
    fn test_backward_start_row_skips_later_matches() {
        let mut query = SearchQuery::new("error");
        query.direction = Direction::Backward;
        query.start_row = Some(2);
        let outcome = run(&query, &["error early", "ok", "ok", "error late"]);
        assert_eq!(outcome, SearchOutcome::Match { row: 0 });
    }

    #[test]
    fn test_no_match() {
        let outcome = run(&SearchQuery::new("absent"), &["alpha", "beta"]);
        assert_eq!(outcome, SearchOutcome::NoMatch);
    }

    #[test]
    fn test_case_insensitive_query() {
        let outcome = run(&SearchQuery::new("TIMEOUT"), &["a timeout occurred"]);
        assert_eq!(outcome, SearchOutcome::Match { row: 0 });
    }

    #[test]
    fn test_regex_query() {
        let mut query = SearchQuery::new(r"conn-\d{3} closed");
        query.regex = true;
        let outcome = run(&query, &["conn-12 closed", "conn-123 closed"]);
        assert_eq!(outcome, SearchOutcome::Match { row: 1 });
    }

    #[test]
    fn test_invalid_regex_fails_before_processing() {
        let (data, tia) = make_log(&["anything"]);
        let source = SliceSource::new(&data);
        let (context, state) = ProcessingContext::with_default_reporter(Settings::default());

        let mut query = SearchQuery::new("[unclosed");
        query.regex = true;
        let result = search(&source, tia, &query, &context);
        assert!(matches!(result, Err(ProcessError::RegexCompile { .. })));
        assert_eq!(state.completion(), CompletionState::Fail);
        assert!(state.is_aborted(), "a compile failure must raise the abort flag");

        let mut reported = false;
        while let Some(line) = state.take_progress_info() {
            if line.contains("Regular expression contains error") {
                reported = true;
            }
        }
        assert!(reported, "expected the compiler diagnostic in the queue");
    }

    #[test]
    fn test_empty_log() {
        let (context, state) = ProcessingContext::with_default_reporter(Settings::default());
        let source = SliceSource::new(b"");
        let tia = Arc::new(TextItemArray::default());

        let outcome = search(&source, tia, &SearchQuery::new("x"), &context).unwrap();
        assert_eq!(outcome, SearchOutcome::NoMatch);
        assert_eq!(
            state.take_progress_info().as_deref(),
            Some("Log file is empty, search aborted")
        );
        assert_eq!(state.completion(), CompletionState::Fail);
    }

    #[test]
    fn test_wrap_up_reports_match_row() {
        let (data, tia) = make_log(&["miss", "hit here"]);
        let source = SliceSource::new(&data);
        let (context, state) = ProcessingContext::with_default_reporter(Settings::default());

        let outcome = search(&source, tia, &SearchQuery::new("hit"), &context).unwrap();
        assert_eq!(outcome, SearchOutcome::Match { row: 1 });
        assert_eq!(state.completion(), CompletionState::Success);

        let mut lines = Vec::new();
        while let Some(line) = state.take_progress_info() {
            lines.push(line);
        }
        assert!(lines
            .iter()
            .any(|l| l == "Search complete, match at row 1"));
    }

    #[test]
    fn test_no_match_completes_as_fail() {
        let (data, tia) = make_log(&["alpha", "beta"]);
        let source = SliceSource::new(&data);
        let (context, state) = ProcessingContext::with_default_reporter(Settings::default());

        let outcome = search(&source, tia, &SearchQuery::new("absent"), &context).unwrap();
        assert_eq!(outcome, SearchOutcome::NoMatch);
        assert_eq!(state.completion(), CompletionState::Fail);
    }

    /// Plans and loads a single chunk covering all of `data`
    fn prepared_chunk(data: &[u8], tia: &Arc<TextItemArray>) -> (Chunk, Vec<u8>) {
        let source = SliceSource::new(data);
        let reporter = ProgressState::new();
        let mut chunk = plan_forward(tia, 0, (data.len() + 2) as u64).unwrap();
        let mut buf = vec![0u8; data.len() + 1];
        load_chunk(&source, tia, &mut chunk, &mut buf, &reporter).unwrap();
        (chunk, buf)
    }

    #[test]
    fn test_wrap_up_disagreement_rescans_window() {
        let (data, tia) = make_log(&["miss", "miss", "HIT low", "miss", "miss", "HIT high"]);
        let (chunk, view) = prepared_chunk(&data, &tia);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());
        let executor = SearchExecutor::new(&source, Arc::clone(&tia), &context);
        let strategy = MatchStrategy::compile("HIT", false, false).unwrap();

        // Two workers stopped on different rows; the re-scan settles on
        // the row closest to the scan origin
        let shared = SearchShared::new(2);
        shared.stop.store(true, Ordering::Relaxed);
        shared.slots[0].store(2, Ordering::Relaxed);
        shared.slots[1].store(5, Ordering::Relaxed);

        let query = SearchQuery::new("HIT");
        let outcome = executor.resolve_match(&chunk, &view, &strategy, &query, &shared);
        assert_eq!(outcome, SearchOutcome::Match { row: 2 });

        let mut query = SearchQuery::new("HIT");
        query.direction = Direction::Backward;
        let outcome = executor.resolve_match(&chunk, &view, &strategy, &query, &shared);
        assert_eq!(outcome, SearchOutcome::Match { row: 5 });
    }

    #[test]
    fn test_wrap_up_degrades_when_nothing_rematches() {
        let (data, tia) = make_log(&["a", "b", "c", "d"]);
        let (chunk, view) = prepared_chunk(&data, &tia);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());
        let executor = SearchExecutor::new(&source, Arc::clone(&tia), &context);
        let strategy = MatchStrategy::compile("HIT", false, false).unwrap();

        let shared = SearchShared::new(2);
        shared.stop.store(true, Ordering::Relaxed);
        shared.slots[0].store(1, Ordering::Relaxed);
        shared.slots[1].store(3, Ordering::Relaxed);

        let query = SearchQuery::new("HIT");
        let outcome = executor.resolve_match(&chunk, &view, &strategy, &query, &shared);
        assert_eq!(outcome, SearchOutcome::NoMatch);
    }

    #[test]
    fn test_wrap_up_rescan_honors_filter_view() {
        let lines = ["miss", "HIT hidden", "miss", "HIT visible", "miss"];
        let (data, tia) = make_log(&lines);
        let (chunk, view) = prepared_chunk(&data, &tia);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());
        let executor = SearchExecutor::new(&source, Arc::clone(&tia), &context);
        let strategy = MatchStrategy::compile("HIT", false, false).unwrap();

        // Worker 0 stopped as an observer on a row the filter hides;
        // the re-scan must pass over it and land on the visible match
        let shared = SearchShared::new(2);
        shared.stop.store(true, Ordering::Relaxed);
        shared.slots[0].store(1, Ordering::Relaxed);
        shared.slots[1].store(3, Ordering::Relaxed);

        let mut set = FilterSet::default();
        set.items.push(FilterItem::new("visible"));
        let mut query = SearchQuery::new("HIT");
        query.filter_view = Some(filter_view_for(lines.len(), &[(3, 1)], &set));

        let outcome = executor.resolve_match(&chunk, &view, &strategy, &query, &shared);
        assert_eq!(outcome, SearchOutcome::Match { row: 3 });
    }

    fn filter_view_for(rows: usize, marked: &[(usize, u8)], set: &FilterSet) -> FilterView {
        let mut fira = FirArray::new(rows);
        for &(row, index) in marked {
            fira.set_lut_index(row, index);
        }
        FilterView::new(Arc::new(fira), Arc::new(FilterLut::generate(set)))
    }

    #[test]
    fn test_filtered_search_skips_hidden_rows() {
        let lines = ["error setup", "noise", "error in band", "noise", "error tail"];
        let (data, tia) = make_log(&lines);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());

        // Only rows 2 and 4 were matched by the filter pass; row 0 holds
        // the pattern too but is not visible.
        let mut set = FilterSet::default();
        set.items.push(FilterItem::new("error"));
        let mut query = SearchQuery::new("error");
        query.filter_view = Some(filter_view_for(lines.len(), &[(2, 1), (4, 1)], &set));

        let outcome = search(&source, tia, &query, &context).unwrap();
        assert_eq!(outcome, SearchOutcome::Match { row: 2 });
    }

    #[test]
    fn test_filtered_search_backward_stops_at_last_visible() {
        let lines = ["error setup", "noise", "error in band", "noise", "error tail"];
        let (data, tia) = make_log(&lines);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());

        let mut set = FilterSet::default();
        set.items.push(FilterItem::new("error"));
        let mut query = SearchQuery::new("error");
        query.direction = Direction::Backward;
        query.filter_view = Some(filter_view_for(lines.len(), &[(0, 1), (2, 1)], &set));

        let outcome = search(&source, tia, &query, &context).unwrap();
        assert_eq!(outcome, SearchOutcome::Match { row: 2 });
    }

    #[test]
    fn test_filtered_search_ignores_exclude_rows() {
        let lines = ["noise", "error one", "noise", "error two"];
        let (data, tia) = make_log(&lines);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());

        let mut set = FilterSet::default();
        let mut hidden = FilterItem::new("error");
        hidden.exclude = true;
        set.items.push(hidden);
        set.items.push(FilterItem::new("two"));

        // Row 1 belongs to the exclude filter in slot 1, row 3 to the
        // plain filter in slot 2
        let mut query = SearchQuery::new("error");
        query.filter_view = Some(filter_view_for(lines.len(), &[(1, 1), (3, 2)], &set));

        let outcome = search(&source, tia, &query, &context).unwrap();
        assert_eq!(outcome, SearchOutcome::Match { row: 3 });
    }

    #[test]
    fn test_filtered_search_includes_bookmarked_rows() {
        let lines = ["noise", "error from bookmark", "noise"];
        let (data, tia) = make_log(&lines);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());

        let mut query = SearchQuery::new("error");
        query.filter_view = Some(filter_view_for(
            lines.len(),
            &[(1, BOOKMARK_LUT_INDEX)],
            &FilterSet::default(),
        ));

        let outcome = search(&source, tia, &query, &context).unwrap();
        assert_eq!(outcome, SearchOutcome::Match { row: 1 });
    }

    #[test]
    fn test_filtered_search_without_visible_match() {
        let lines = ["error hidden", "visible but clean"];
        let (data, tia) = make_log(&lines);
        let source = SliceSource::new(&data);
        let (context, _) = ProcessingContext::with_default_reporter(Settings::default());

        let mut set = FilterSet::default();
        set.items.push(FilterItem::new("clean"));
        let mut query = SearchQuery::new("error");
        query.filter_view = Some(filter_view_for(lines.len(), &[(1, 1)], &set));

        let outcome = search(&source, tia, &query, &context).unwrap();
        assert_eq!(outcome, SearchOutcome::NoMatch);
    }
}
