use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::errors::{ProcessError, ProcessResult};
use crate::filters::FilterItem;

/// Byte-wise ASCII uppercase table used for case-insensitive scans
static UPPER_LUT: [u8; 256] = build_upper_lut();

const fn build_upper_lut() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let byte = i as u8;
        table[i] = if byte.is_ascii_lowercase() {
            byte - 32
        } else {
            byte
        };
        i += 1;
    }
    table
}

/// Cache for compiled regex patterns to avoid recompilation
static PATTERN_CACHE: Lazy<DashMap<String, Arc<regex::bytes::Regex>>> = Lazy::new(DashMap::new);

fn compile_regex(pattern: &str) -> ProcessResult<Arc<regex::bytes::Regex>> {
    if let Some(regex) = PATTERN_CACHE.get(pattern) {
        return Ok(Arc::clone(&regex));
    }
    let regex = Arc::new(
        regex::bytes::Regex::new(pattern)
            .map_err(|e| ProcessError::regex_compile(pattern, &e))?,
    );
    PATTERN_CACHE.insert(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}

/// Compiled form of one pattern, fixed for a whole pass.
///
/// Literal needles scan a row minus its terminator byte; regex patterns
/// scan the full stored row including the terminator. Case-insensitive
/// needles are uppercased once here so the per-row scan only folds the
/// haystack side.
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    CaseSensitive(Vec<u8>),
    CaseInsensitive(Vec<u8>),
    Regex(Arc<regex::bytes::Regex>),
}

impl MatchStrategy {
    /// Compiles a pattern. Regex patterns ignore `case_sensitive`; the
    /// pattern itself spells out any case folding.
    pub fn compile(pattern: &str, case_sensitive: bool, is_regex: bool) -> ProcessResult<Self> {
        if pattern.is_empty() {
            return Err(ProcessError::invalid_filter("empty pattern"));
        }
        if is_regex {
            return Ok(MatchStrategy::Regex(compile_regex(pattern)?));
        }
        if case_sensitive {
            Ok(MatchStrategy::CaseSensitive(pattern.as_bytes().to_vec()))
        } else {
            let needle = pattern
                .bytes()
                .map(|b| UPPER_LUT[b as usize])
                .collect();
            Ok(MatchStrategy::CaseInsensitive(needle))
        }
    }

    pub fn for_item(item: &FilterItem) -> ProcessResult<Self> {
        Self::compile(&item.pattern, item.case_sensitive, item.regex)
    }

    /// How many leading bytes of a stored row this strategy scans.
    /// `size` is the stored row size including the terminator.
    pub fn effective_len(&self, size: usize) -> usize {
        match self {
            MatchStrategy::Regex(_) => size,
            _ => size.saturating_sub(1),
        }
    }

    /// Whether the pattern occurs in a stored row. `line` is the raw row
    /// bytes including the terminator.
    pub fn match_line(&self, line: &[u8]) -> bool {
        self.matches_bytes(&line[..self.effective_len(line.len())])
    }

    /// Whether the pattern occurs in `haystack`, scanned exactly as given.
    /// Callers clip the haystack; an empty one never matches.
    pub fn matches_bytes(&self, haystack: &[u8]) -> bool {
        if haystack.is_empty() {
            return false;
        }
        match self {
            MatchStrategy::CaseSensitive(needle) => {
                haystack.windows(needle.len()).any(|window| window == &needle[..])
            }
            MatchStrategy::CaseInsensitive(needle) => haystack
                .windows(needle.len())
                .any(|window| {
                    window
                        .iter()
                        .zip(needle.iter())
                        .all(|(&h, &n)| UPPER_LUT[h as usize] == n)
                }),
            MatchStrategy::Regex(regex) => regex.is_match(haystack),
        }
    }
}
