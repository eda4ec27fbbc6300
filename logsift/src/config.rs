use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Hard cap on worker threads; partitioning and per-thread progress
/// counters are sized against this.
pub const MAX_WORKER_THREADS: usize = 16;

/// Engine settings supplied by the embedding application.
///
/// # Configuration Locations
///
/// Settings can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.logsift.yaml` in the current directory
/// 3. Global `$HOME/.config/logsift/config.yaml`
///
/// # Configuration Format
///
/// The configuration uses YAML format. Example:
/// ```yaml
/// # Worker thread count (default: CPU cores, capped at 16)
/// thread_count: 8
///
/// # Work memory override in bytes; only honored when smaller than
/// # what the engine would pick on its own
/// work_mem_size: 52428800
///
/// # Upper bound for the work memory proposal in bytes
/// max_work_mem: 614400000
///
/// # Chunks with at most this many rows are processed single threaded
/// multi_thread_row_floor: 10000
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "warn"
/// ```
///
/// # CLI Integration
///
/// When using the CLI, command-line arguments take precedence over config
/// file values. The merging behavior is defined in the `merge_with_cli`
/// method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Number of worker threads for a processing pass
    /// Defaults to the number of CPU cores, capped at MAX_WORKER_THREADS
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Work memory size override in bytes
    /// Only honored when smaller than the engine's own proposal
    #[serde(default)]
    pub work_mem_size: Option<u64>,

    /// Upper bound for the work memory proposal in bytes
    #[serde(default = "default_max_work_mem")]
    pub max_work_mem: u64,

    /// Chunks with at most this many rows are processed single threaded
    #[serde(default = "default_multi_thread_row_floor")]
    pub multi_thread_row_floor: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get().clamp(1, MAX_WORKER_THREADS)).unwrap()
}

fn default_max_work_mem() -> u64 {
    // 600 MB class ceiling for the work memory proposal
    614_400_000
}

fn default_multi_thread_row_floor() -> usize {
    10_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thread_count: default_thread_count(),
            work_mem_size: None,
            max_work_mem: default_max_work_mem(),
            multi_thread_row_floor: default_multi_thread_row_floor(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Loads settings from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads settings from a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Default config locations
        let config_files = [
            // Global config
            dirs::config_dir().map(|p| p.join("logsift/config.yaml")),
            // Local config
            Some(PathBuf::from(".logsift.yaml")),
            // Custom config
            config_path.map(PathBuf::from),
        ];

        // Add existing config files
        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // Build and deserialize
        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli_settings: Settings) -> Self {
        // CLI values take precedence over config file values
        self.thread_count = cli_settings.thread_count;
        if cli_settings.work_mem_size.is_some() {
            self.work_mem_size = cli_settings.work_mem_size;
        }
        if cli_settings.max_work_mem != default_max_work_mem() {
            self.max_work_mem = cli_settings.max_work_mem;
        }
        if cli_settings.multi_thread_row_floor != default_multi_thread_row_floor() {
            self.multi_thread_row_floor = cli_settings.multi_thread_row_floor;
        }
        if cli_settings.log_level != default_log_level() {
            self.log_level = cli_settings.log_level;
        }
        self
    }

    /// Worker count actually used for dispatch, capped at MAX_WORKER_THREADS
    pub fn worker_threads(&self) -> usize {
        self.thread_count.get().min(MAX_WORKER_THREADS)
    }
}
