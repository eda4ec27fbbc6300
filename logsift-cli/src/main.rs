use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use logsift::{
    run_filter, search, ChunkSource, CompletionState, Direction, FilterItem, FilterLut,
    FilterQuery, FilterSet, FilterSummary, FilterView, FirArray, ProcessingContext,
    ProgressReporter, ProgressState, SearchOutcome, SearchQuery, Settings, SliceSource, TextItem,
    TextItemArray, TimedOutcome,
};
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the first row matching a pattern
    Search(Box<SearchArgs>),

    /// Mark every row matching a filter set and print the survivors
    Filter(Box<FilterArgs>),
}

#[derive(Parser)]
struct SearchArgs {
    /// Log file to search
    file: PathBuf,

    /// Pattern to look for
    pattern: String,

    /// Match case sensitively
    #[arg(short = 's', long)]
    case_sensitive: bool,

    /// Treat the pattern as a regular expression
    #[arg(short = 'r', long)]
    regex: bool,

    /// Scan from the end of the log toward the start
    #[arg(short = 'b', long)]
    backward: bool,

    /// Row the scan starts from
    #[arg(long, value_name = "ROW")]
    start_row: Option<usize>,

    /// Search only rows matched by this filter file
    #[arg(short = 'f', long, value_name = "FILE")]
    filters: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Work memory ceiling in bytes
    #[arg(long, value_name = "BYTES")]
    max_memory: Option<u64>,

    /// Settings file used instead of the default lookup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Suppress the progress bar and status lines
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Parser)]
struct FilterArgs {
    /// Log file to filter
    file: PathBuf,

    /// Filter pattern (can be specified multiple times)
    #[arg(short = 'p', long = "pattern")]
    patterns: Vec<String>,

    /// Exclude pattern; matching rows are hidden and counted separately
    #[arg(short = 'x', long = "exclude")]
    excludes: Vec<String>,

    /// YAML file with a full filter item set
    #[arg(short = 'f', long, value_name = "FILE")]
    filters: Option<PathBuf>,

    /// Match command-line patterns case sensitively
    #[arg(short = 's', long)]
    case_sensitive: bool,

    /// Treat command-line patterns as regular expressions
    #[arg(short = 'r', long)]
    regex: bool,

    /// Print at most this many matching rows
    #[arg(short = 'n', long, value_name = "ROWS")]
    limit: Option<usize>,

    /// Show only match counts, not rows
    #[arg(long)]
    stats: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Work memory ceiling in bytes
    #[arg(long, value_name = "BYTES")]
    max_memory: Option<u64>,

    /// Settings file used instead of the default lookup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Suppress the progress bar and status lines
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Search(args) => execute_search(*args),
        Commands::Filter(args) => execute_filter(*args),
    }
}

fn execute_search(args: SearchArgs) -> Result<ExitCode> {
    let settings = resolve_settings(args.config.as_deref(), args.threads, args.max_memory)?;
    init_tracing(&settings.log_level);
    tracing::debug!("settings resolved: {:?}", settings);

    let mmap = map_log(&args.file)?;
    let tia = Arc::new(index_rows(&mmap));
    let source = SliceSource::new(&mmap);

    let reporter = Arc::new(ConsoleReporter::new(args.quiet || args.json));
    let context = ProcessingContext::new(settings, reporter.clone());

    let filter_view = match &args.filters {
        Some(path) => Some(build_filter_view(&source, Arc::clone(&tia), path, &context)?),
        None => None,
    };

    let mut query = SearchQuery::new(args.pattern.as_str());
    query.case_sensitive = args.case_sensitive;
    query.regex = args.regex;
    query.direction = if args.backward {
        Direction::Backward
    } else {
        Direction::Forward
    };
    query.start_row = args.start_row;
    query.filter_view = filter_view;

    let started = Instant::now();
    let outcome = search(&source, Arc::clone(&tia), &query, &context)?;
    let report = TimedOutcome::new(outcome, started.elapsed());
    reporter.finish();

    if args.json {
        print_search_json(&report, &mmap, &tia)?;
    } else {
        print_search_outcome(&report, &mmap, &tia);
    }
    Ok(if outcome.is_match() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn execute_filter(args: FilterArgs) -> Result<ExitCode> {
    let settings = resolve_settings(args.config.as_deref(), args.threads, args.max_memory)?;
    init_tracing(&settings.log_level);
    tracing::debug!("settings resolved: {:?}", settings);

    let set = gather_filter_set(&args)?;
    let mmap = map_log(&args.file)?;
    let tia = Arc::new(index_rows(&mmap));
    let source = SliceSource::new(&mmap);

    let reporter = Arc::new(ConsoleReporter::new(args.quiet || args.json));
    let context = ProcessingContext::new(settings, reporter.clone());

    let started = Instant::now();
    let (fira, lut, summary) = run_filter(
        &source,
        Arc::clone(&tia),
        &set,
        &FilterQuery::default(),
        &context,
    )?;
    let report = TimedOutcome::new(summary, started.elapsed());
    reporter.finish();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if !args.stats {
            print_filter_matches(&mmap, &tia, &fira, &lut, args.limit);
        }
        print_filter_summary(&report);
    }
    Ok(if summary.is_success() && summary.matches > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Runs the filter pass whose surviving rows a search is limited to
fn build_filter_view(
    source: &dyn ChunkSource,
    tia: Arc<TextItemArray>,
    path: &Path,
    context: &ProcessingContext,
) -> Result<FilterView> {
    let set = FilterSet::load_from(path)?;
    set.validate()?;
    if set.enabled_items().count() == 0 {
        bail!("filter file {} has no enabled items", path.display());
    }
    let (fira, lut, summary) = run_filter(source, tia, &set, &FilterQuery::default(), context)?;
    if summary.aborted {
        bail!("filter pass aborted");
    }
    Ok(FilterView::new(Arc::new(fira), Arc::new(lut)))
}

fn gather_filter_set(args: &FilterArgs) -> Result<FilterSet> {
    let mut set = match &args.filters {
        Some(path) => FilterSet::load_from(path)?,
        None => FilterSet::default(),
    };
    for pattern in &args.patterns {
        let mut item = FilterItem::new(pattern.as_str());
        item.case_sensitive = args.case_sensitive;
        item.regex = args.regex;
        set.items.push(item);
    }
    for pattern in &args.excludes {
        let mut item = FilterItem::new(pattern.as_str());
        item.case_sensitive = args.case_sensitive;
        item.regex = args.regex;
        item.exclude = true;
        set.items.push(item);
    }
    if set.enabled_items().count() == 0 {
        bail!("no filter patterns given; use --pattern, --exclude or --filters");
    }
    set.validate()?;
    Ok(set)
}

fn resolve_settings(
    config: Option<&Path>,
    threads: Option<NonZeroUsize>,
    max_memory: Option<u64>,
) -> Result<Settings> {
    let mut settings = Settings::load_from(config).context("cannot load settings")?;
    if let Some(threads) = threads {
        settings.thread_count = threads;
    }
    if let Some(bytes) = max_memory {
        settings.max_work_mem = bytes;
    }
    Ok(settings)
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("logsift={}", level))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn map_log(path: &Path) -> Result<Mmap> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mmap =
        unsafe { Mmap::map(&file) }.with_context(|| format!("cannot map {}", path.display()))?;
    Ok(mmap)
}

/// Builds the row index for a log. Each item spans the line's bytes plus
/// its newline terminator; a final line without a terminator is indexed
/// with just the bytes that are there.
fn index_rows(data: &[u8]) -> TextItemArray {
    let mut items = Vec::new();
    let mut offset = 0u64;
    for line in data.split_inclusive(|&byte| byte == b'\n') {
        items.push(TextItem {
            offset,
            size: line.len() as u32,
        });
        offset += line.len() as u64;
    }
    TextItemArray::new(items)
}

/// Row bytes as display text, terminator stripped
fn row_text<'a>(data: &'a [u8], item: &TextItem) -> Cow<'a, str> {
    let start = (item.offset as usize).min(data.len());
    let end = (start + item.size as usize).min(data.len());
    let mut line = &data[start..end];
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line = &line[..line.len() - 1];
    }
    String::from_utf8_lossy(line)
}

fn print_search_outcome(report: &TimedOutcome<SearchOutcome>, data: &[u8], tia: &TextItemArray) {
    match report.outcome {
        SearchOutcome::Match { row } => {
            if let Some(item) = tia.get(row) {
                println!("{}: {}", row.to_string().green(), row_text(data, &item));
            }
            println!("\nFound match at row {} in {}", row, report.elapsed);
        }
        SearchOutcome::NoMatch => {
            println!("No match in {} rows ({})", tia.rows(), report.elapsed);
        }
        SearchOutcome::Aborted => {
            println!("{}", "Search aborted".yellow());
        }
    }
}

fn print_search_json(
    report: &TimedOutcome<SearchOutcome>,
    data: &[u8],
    tia: &TextItemArray,
) -> Result<()> {
    let mut payload = serde_json::to_value(report)?;
    if let SearchOutcome::Match { row } = report.outcome {
        payload["line"] =
            serde_json::json!(tia.get(row).map(|item| row_text(data, &item).into_owned()));
    }
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn print_filter_matches(
    data: &[u8],
    tia: &TextItemArray,
    fira: &FirArray,
    lut: &FilterLut,
    limit: Option<usize>,
) {
    let mut printed = 0usize;
    for row in 0..tia.rows() {
        let index = fira.lut_index(row);
        if index == 0 || lut.is_excluded(index) {
            continue;
        }
        if limit.is_some_and(|cap| printed >= cap) {
            println!("{}", "...".dimmed());
            break;
        }
        if let Some(item) = tia.get(row) {
            println!("{}: {}", row.to_string().green(), row_text(data, &item));
        }
        printed += 1;
    }
}

fn print_filter_summary(report: &TimedOutcome<FilterSummary>) {
    println!(
        "\nFound {} matching rows ({} excluded) in {}",
        report.outcome.matches, report.outcome.exclude_matches, report.elapsed
    );
}

/// Renders engine progress on a terminal bar and echoes status lines
/// above it. In quiet or JSON mode the bar is hidden and the lines are
/// swallowed with it.
struct ConsoleReporter {
    state: ProgressState,
    bar: ProgressBar,
}

impl ConsoleReporter {
    fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent}%")
                    .unwrap()
                    .progress_chars("=>-"),
            );
            bar
        };
        Self {
            state: ProgressState::new(),
            bar,
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn sync_bar(&self) {
        self.bar
            .set_position((self.state.overall() * 100.0).round() as u64);
    }
}

impl ProgressReporter for ConsoleReporter {
    fn set_num_counters(&self, count: usize) {
        self.state.set_num_counters(count);
    }

    fn setup_counter_step(&self, step: f64) {
        self.state.setup_counter_step(step);
    }

    fn set_progress(&self, fraction: f64) {
        self.state.set_progress(fraction);
        self.sync_bar();
    }

    fn step_progress(&self, counter: usize) {
        self.state.step_progress(counter);
        self.sync_bar();
    }

    fn add_progress_info(&self, message: String) {
        self.bar.println(&message);
    }

    fn is_aborted(&self) -> bool {
        self.state.is_aborted()
    }

    fn request_abort(&self) {
        self.state.request_abort();
    }

    fn set_success(&self) {
        self.state.set_success();
        self.sync_bar();
    }

    fn set_fail(&self) {
        self.state.set_fail();
        self.sync_bar();
    }

    fn set_init(&self) {
        self.state.set_init();
        self.sync_bar();
    }

    fn completion(&self) -> CompletionState {
        self.state.completion()
    }
}
