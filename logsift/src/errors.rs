use thiserror::Error;

/// Result type for log processing operations
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Errors that can occur while preparing or running a search/filter pass
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Work memory exhausted: could not allocate {requested} bytes (floor {floor} bytes)")]
    ArenaExhausted { requested: u64, floor: u64 },
    #[error("Work memory misuse: {0}")]
    ArenaMisuse(String),
    #[error("Regular expression contains error: {pattern}: {message}")]
    RegexCompile { pattern: String, message: String },
    #[error("Invalid filter item: {0}")]
    InvalidFilter(String),
    #[error("Thread pool misuse: {0}")]
    PoolMisuse(String),
    #[error("Internal consistency error: {0}")]
    Inconsistency(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProcessError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn arena_exhausted(requested: u64, floor: u64) -> Self {
        Self::ArenaExhausted { requested, floor }
    }

    pub fn arena_misuse(msg: impl Into<String>) -> Self {
        Self::ArenaMisuse(msg.into())
    }

    pub fn regex_compile(pattern: impl Into<String>, source: &regex::Error) -> Self {
        Self::RegexCompile {
            pattern: pattern.into(),
            message: source.to_string(),
        }
    }

    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    pub fn pool_misuse(msg: impl Into<String>) -> Self {
        Self::PoolMisuse(msg.into())
    }

    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Self::Inconsistency(msg.into())
    }
}
