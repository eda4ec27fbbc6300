use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{error, warn};

use crate::errors::{ProcessError, ProcessResult};

/// Capacity of the filter lookup table. Slot 0 is reserved for "no match"
/// and the top slot for the bookmark pseudo-filter, so at most 254 real
/// filters can be active at once.
pub const MAX_NUM_OF_ACTIVE_FILTERS: usize = 256;

/// Lookup table slot reserved for bookmarked rows
pub const BOOKMARK_LUT_INDEX: u8 = 0xff;

/// One user-defined match rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterItem {
    /// Text or regular expression to match
    pub pattern: String,

    #[serde(default)]
    pub case_sensitive: bool,

    /// Treat `pattern` as a regular expression
    #[serde(default)]
    pub regex: bool,

    /// Matching rows are counted separately and hidden from the
    /// filtered view
    #[serde(default)]
    pub exclude: bool,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FilterItem {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: false,
            regex: false,
            exclude: false,
            enabled: true,
        }
    }

    /// Display-only entry occupying the bookmark slot of the lookup table.
    /// Never matched against text; bookmark rows are decorated after the
    /// match pass.
    pub fn bookmark() -> Self {
        Self {
            pattern: "Bookmarked".to_string(),
            case_sensitive: false,
            regex: false,
            exclude: false,
            enabled: true,
        }
    }

    /// Checks the item invariants: non-empty pattern, and a regex pattern
    /// must compile
    pub fn validate(&self) -> ProcessResult<()> {
        if self.pattern.is_empty() {
            return Err(ProcessError::invalid_filter("empty pattern"));
        }
        if self.regex {
            regex::bytes::Regex::new(&self.pattern)
                .map_err(|e| ProcessError::regex_compile(&self.pattern, &e))?;
        }
        Ok(())
    }
}

/// A named collection of filter items, loadable from a YAML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub items: Vec<FilterItem>,
}

impl FilterSet {
    /// Loads a filter set from a YAML file
    pub fn load_from(path: &Path) -> ProcessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| ProcessError::invalid_filter(format!("{}: {}", path.display(), e)))
    }

    /// Enabled items in declaration order
    pub fn enabled_items(&self) -> impl Iterator<Item = &FilterItem> {
        self.items.iter().filter(|item| item.enabled)
    }

    /// Validates every item in the set
    pub fn validate(&self) -> ProcessResult<()> {
        for item in &self.items {
            item.validate()?;
        }
        Ok(())
    }
}

/// Fixed-capacity table mapping a compact 8-bit index to a filter item.
///
/// Rebuilt whenever the enabled-filter set changes and read-only during a
/// pass. Index 0 never denotes a real filter: it is the "no match" value
/// stored in the FIR array.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterLut {
    entries: Vec<Option<FilterItem>>,
}

impl FilterLut {
    /// Builds the table from the enabled items of a filter set.
    ///
    /// Enabled items land in slots 1 upward in declaration order; slot 0
    /// stays empty and the top slot holds the bookmark pseudo-filter.
    /// Items beyond the capacity are dropped with a warning.
    pub fn generate(set: &FilterSet) -> Self {
        let mut entries = vec![None; MAX_NUM_OF_ACTIVE_FILTERS];
        entries[BOOKMARK_LUT_INDEX as usize] = Some(FilterItem::bookmark());

        let mut next = 1usize;
        for item in set.enabled_items() {
            if next >= BOOKMARK_LUT_INDEX as usize {
                warn!(
                    "filter lookup table full, dropping enabled filters beyond {}",
                    BOOKMARK_LUT_INDEX as usize - 1
                );
                break;
            }
            entries[next] = Some(item.clone());
            next += 1;
        }

        Self { entries }
    }

    /// Empty table holding only the bookmark pseudo-filter
    pub fn empty() -> Self {
        Self::generate(&FilterSet::default())
    }

    pub fn get(&self, index: u8) -> Option<&FilterItem> {
        self.entries[index as usize].as_ref()
    }

    /// Whether the entry at `index` is marked exclude; empty slots are not
    pub fn is_excluded(&self, index: u8) -> bool {
        self.get(index).is_some_and(|item| item.exclude)
    }

    /// Real filter entries in slot order, bookmark slot not included
    pub fn iter_active(&self) -> impl Iterator<Item = (u8, &FilterItem)> {
        self.entries[..BOOKMARK_LUT_INDEX as usize]
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, entry)| entry.as_ref().map(|item| (i as u8, item)))
    }

    /// Number of real filters in the table
    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }
}

/// Per-row record of which filter matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterIndexRecord {
    /// Lookup table index of the matching filter, 0 for no match
    pub lut_index: u8,
    /// Ordinal among non-excluded matches, assigned by `renumerate`
    pub ordinal: u32,
}

/// Parallel array with one [`FilterIndexRecord`] per log row plus the
/// derived match counters. Rebuilt whenever filters or the row index
/// change.
#[derive(Debug, Clone, Default)]
pub struct FirArray {
    records: Vec<FilterIndexRecord>,
    filter_matches: usize,
    filter_exclude_matches: usize,
}

impl FirArray {
    /// Creates a zeroed array for `rows` log rows
    pub fn new(rows: usize) -> Self {
        Self {
            records: vec![FilterIndexRecord::default(); rows],
            filter_matches: 0,
            filter_exclude_matches: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, row: usize) -> Option<FilterIndexRecord> {
        self.records.get(row).copied()
    }

    /// Lookup table index for a row, 0 when the row is out of range
    pub fn lut_index(&self, row: usize) -> u8 {
        self.records.get(row).map(|r| r.lut_index).unwrap_or(0)
    }

    pub fn set_lut_index(&mut self, row: usize, lut_index: u8) {
        if let Some(record) = self.records.get_mut(row) {
            record.lut_index = lut_index;
        }
    }

    /// Number of non-excluded filter matches
    pub fn filter_matches(&self) -> usize {
        self.filter_matches
    }

    /// Number of rows matched by exclude filters
    pub fn filter_exclude_matches(&self) -> usize {
        self.filter_exclude_matches
    }

    /// Zeroes the records of a row range
    pub fn clear_range(&mut self, range: RangeInclusive<usize>) {
        let end = (*range.end()).min(self.records.len().saturating_sub(1));
        let start = (*range.start()).min(end);
        if self.records.is_empty() {
            return;
        }
        for record in &mut self.records[start..=end] {
            *record = FilterIndexRecord::default();
        }
    }

    /// Zeroes all records and both counters
    pub fn clear_all(&mut self) {
        self.records.fill(FilterIndexRecord::default());
        self.filter_matches = 0;
        self.filter_exclude_matches = 0;
    }

    /// Grows or shrinks the array to `rows`, keeping the common prefix.
    /// Used when the log gains rows between incremental passes.
    pub fn resize(&mut self, rows: usize) {
        self.records.resize(rows, FilterIndexRecord::default());
    }

    /// Marks bookmarked rows with the bookmark slot, overriding whatever
    /// the match pass wrote there
    pub fn decorate_bookmarks(&mut self, bookmarks: &[usize]) {
        for &row in bookmarks {
            self.set_lut_index(row, BOOKMARK_LUT_INDEX);
        }
    }

    /// Walks all rows assigning ordinals 0,1,2,.. to non-excluded matches
    /// and recomputes both counters. Rows whose record references an empty
    /// lookup table slot are reset to "no match".
    pub fn renumerate(&mut self, lut: &FilterLut) {
        let mut matches = 0u32;
        let mut excludes = 0usize;
        for (row, record) in self.records.iter_mut().enumerate() {
            if record.lut_index == 0 {
                continue;
            }
            match lut.get(record.lut_index) {
                Some(item) if item.exclude => excludes += 1,
                Some(_) => {
                    record.ordinal = matches;
                    matches += 1;
                }
                None => {
                    warn!(
                        "row {} references empty filter slot {}, resetting",
                        row, record.lut_index
                    );
                    *record = FilterIndexRecord::default();
                }
            }
        }
        self.filter_matches = matches as usize;
        self.filter_exclude_matches = excludes;
    }

    pub(crate) fn reset_match_count(&mut self) {
        self.filter_matches = 0;
    }
}

/// One entry of the packed filter match list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedFirEntry {
    pub row: u32,
    pub lut_index: u8,
}

/// Compacted copy of the non-excluded FIR matches in ascending row order.
///
/// Built on demand from the FIR array and discarded when it changes. The
/// entry count must equal `filter_matches` exactly; a mismatch is a
/// corruption signal that resets the match count to force a safe empty
/// state.
#[derive(Debug, Clone, Default)]
pub struct PackedFirArray {
    entries: Vec<PackedFirEntry>,
}

impl PackedFirArray {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PackedFirEntry] {
        &self.entries
    }

    /// Builds the packed list from `fira`, or extends it when `start_row`
    /// is beyond rows already packed.
    ///
    /// Entries at or above `start_row` are discarded and re-packed; the
    /// kept prefix must line up with the ordinals assigned by
    /// [`FirArray::renumerate`]. Any disagreement between a row's ordinal
    /// and its packed position voids the whole list and resets the match
    /// count.
    pub fn populate(
        &mut self,
        fira: &mut FirArray,
        lut: &FilterLut,
        start_row: usize,
    ) -> ProcessResult<usize> {
        if fira.filter_matches() == 0 {
            self.entries.clear();
            return Ok(0);
        }

        // Keep the packed prefix strictly below start_row
        let mut keep = self.entries.len();
        while keep > 0 && self.entries[keep - 1].row as usize >= start_row {
            keep -= 1;
        }
        self.entries.truncate(keep);

        for row in start_row..fira.rows() {
            let record = match fira.get(row) {
                Some(record) => record,
                None => break,
            };
            if record.lut_index == 0 {
                continue;
            }
            let item = match lut.get(record.lut_index) {
                Some(item) => item,
                None => {
                    warn!(
                        "row {} references empty filter slot {}, skipped while packing",
                        row, record.lut_index
                    );
                    continue;
                }
            };
            if item.exclude {
                continue;
            }
            if record.ordinal as usize != self.entries.len() {
                error!(
                    "packed filter ordinal mismatch at row {}: expected {}, found {}",
                    row,
                    self.entries.len(),
                    record.ordinal
                );
                self.entries.clear();
                fira.reset_match_count();
                return Err(ProcessError::inconsistency(
                    "packed filter ordinal mismatch",
                ));
            }
            self.entries.push(PackedFirEntry {
                row: row as u32,
                lut_index: record.lut_index,
            });
        }

        if self.entries.len() != fira.filter_matches() {
            error!(
                "packed filter count mismatch: packed {}, expected {}",
                self.entries.len(),
                fira.filter_matches()
            );
            self.entries.clear();
            fira.reset_match_count();
            return Err(ProcessError::inconsistency("packed filter count mismatch"));
        }

        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(patterns: &[(&str, bool)]) -> FilterSet {
        FilterSet {
            name: "test".to_string(),
            items: patterns
                .iter()
                .map(|(p, exclude)| FilterItem {
                    pattern: p.to_string(),
                    case_sensitive: false,
                    regex: false,
                    exclude: *exclude,
                    enabled: true,
                })
                .collect(),
        }
    }

    #[test]
    fn test_item_validation() {
        assert!(FilterItem::new("error").validate().is_ok());

        let empty = FilterItem::new("");
        assert!(matches!(
            empty.validate(),
            Err(ProcessError::InvalidFilter(_))
        ));

        let mut bad_regex = FilterItem::new("[unclosed");
        bad_regex.regex = true;
        let err = bad_regex.validate().unwrap_err();
        assert!(matches!(err, ProcessError::RegexCompile { .. }));
        assert!(err.to_string().contains("[unclosed"));
    }

    #[test]
    fn test_lut_generation() {
        let set = set_of(&[("alpha", false), ("beta", true)]);
        let lut = FilterLut::generate(&set);

        assert!(lut.get(0).is_none());
        assert_eq!(lut.get(1).unwrap().pattern, "alpha");
        assert_eq!(lut.get(2).unwrap().pattern, "beta");
        assert!(lut.get(3).is_none());
        assert!(lut.get(BOOKMARK_LUT_INDEX).is_some());
        assert_eq!(lut.active_count(), 2);
        assert!(!lut.is_excluded(1));
        assert!(lut.is_excluded(2));
        assert!(!lut.is_excluded(BOOKMARK_LUT_INDEX));
    }

    #[test]
    fn test_lut_skips_disabled_items() {
        let mut set = set_of(&[("alpha", false), ("beta", false), ("gamma", false)]);
        set.items[1].enabled = false;
        let lut = FilterLut::generate(&set);

        assert_eq!(lut.get(1).unwrap().pattern, "alpha");
        assert_eq!(lut.get(2).unwrap().pattern, "gamma");
        assert_eq!(lut.active_count(), 2);
    }

    #[test]
    fn test_lut_rebuild_is_idempotent() {
        let set = set_of(&[("alpha", false), ("beta", true)]);
        let first = FilterLut::generate(&set);
        let second = FilterLut::generate(&set);
        assert_eq!(first, second);
    }

    #[test]
    fn test_lut_capacity_cap() {
        let items: Vec<FilterItem> = (0..300)
            .map(|i| FilterItem::new(format!("pattern{}", i)))
            .collect();
        let set = FilterSet {
            name: String::new(),
            items,
        };
        let lut = FilterLut::generate(&set);

        // 254 real slots, bookmark slot untouched
        assert_eq!(lut.active_count(), BOOKMARK_LUT_INDEX as usize - 1);
        assert_eq!(
            lut.get(BOOKMARK_LUT_INDEX).unwrap().pattern,
            FilterItem::bookmark().pattern
        );
    }

    #[test]
    fn test_renumerate_assigns_monotonic_ordinals() {
        let set = set_of(&[("keep", false), ("drop", true)]);
        let lut = FilterLut::generate(&set);

        let mut fira = FirArray::new(6);
        fira.set_lut_index(0, 1);
        fira.set_lut_index(2, 2); // excluded
        fira.set_lut_index(3, 1);
        fira.set_lut_index(5, 1);
        fira.renumerate(&lut);

        assert_eq!(fira.filter_matches(), 3);
        assert_eq!(fira.filter_exclude_matches(), 1);
        assert_eq!(fira.get(0).unwrap().ordinal, 0);
        assert_eq!(fira.get(3).unwrap().ordinal, 1);
        assert_eq!(fira.get(5).unwrap().ordinal, 2);
    }

    #[test]
    fn test_renumerate_resets_stale_slots() {
        let lut = FilterLut::empty();
        let mut fira = FirArray::new(3);
        fira.set_lut_index(1, 7); // no such filter in the table
        fira.renumerate(&lut);

        assert_eq!(fira.filter_matches(), 0);
        assert_eq!(fira.lut_index(1), 0);
    }

    #[test]
    fn test_clear_range() {
        let mut fira = FirArray::new(5);
        for row in 0..5 {
            fira.set_lut_index(row, 1);
        }
        fira.clear_range(1..=3);

        assert_eq!(fira.lut_index(0), 1);
        assert_eq!(fira.lut_index(1), 0);
        assert_eq!(fira.lut_index(3), 0);
        assert_eq!(fira.lut_index(4), 1);
    }

    #[test]
    fn test_decorate_bookmarks() {
        let mut fira = FirArray::new(4);
        fira.set_lut_index(1, 1);
        fira.decorate_bookmarks(&[1, 3]);

        assert_eq!(fira.lut_index(1), BOOKMARK_LUT_INDEX);
        assert_eq!(fira.lut_index(3), BOOKMARK_LUT_INDEX);
        assert_eq!(fira.lut_index(0), 0);
    }

    #[test]
    fn test_packed_exactness() {
        let set = set_of(&[("keep", false), ("drop", true)]);
        let lut = FilterLut::generate(&set);

        let mut fira = FirArray::new(8);
        fira.set_lut_index(1, 1);
        fira.set_lut_index(3, 2); // excluded, not packed
        fira.set_lut_index(6, 1);
        fira.renumerate(&lut);

        let mut packed = PackedFirArray::default();
        let count = packed.populate(&mut fira, &lut, 0).unwrap();
        assert_eq!(count, fira.filter_matches());
        assert_eq!(
            packed.entries(),
            &[
                PackedFirEntry { row: 1, lut_index: 1 },
                PackedFirEntry { row: 6, lut_index: 1 },
            ]
        );
    }

    #[test]
    fn test_packed_incremental_extend() {
        let set = set_of(&[("keep", false)]);
        let lut = FilterLut::generate(&set);

        let mut fira = FirArray::new(4);
        fira.set_lut_index(0, 1);
        fira.set_lut_index(2, 1);
        fira.renumerate(&lut);

        let mut packed = PackedFirArray::default();
        packed.populate(&mut fira, &lut, 0).unwrap();
        assert_eq!(packed.len(), 2);

        // Two appended rows, one matching
        let mut grown = FirArray::new(6);
        for row in 0..4 {
            grown.set_lut_index(row, fira.lut_index(row));
        }
        grown.set_lut_index(5, 1);
        grown.renumerate(&lut);

        let count = packed.populate(&mut grown, &lut, 4).unwrap();
        assert_eq!(count, 3);
        assert_eq!(packed.entries()[2], PackedFirEntry { row: 5, lut_index: 1 });
    }

    #[test]
    fn test_packed_mismatch_resets_counts() {
        let set = set_of(&[("keep", false)]);
        let lut = FilterLut::generate(&set);

        let mut fira = FirArray::new(4);
        fira.set_lut_index(1, 1);
        fira.set_lut_index(2, 1);
        fira.renumerate(&lut);

        // Corrupt an ordinal behind the array's back
        fira.set_lut_index(0, 1);

        let mut packed = PackedFirArray::default();
        let result = packed.populate(&mut fira, &lut, 0);
        assert!(result.is_err());
        assert_eq!(fira.filter_matches(), 0);
        assert!(packed.is_empty());
    }

    #[test]
    fn test_packed_empty_matches() {
        let lut = FilterLut::empty();
        let mut fira = FirArray::new(4);
        let mut packed = PackedFirArray::default();
        assert_eq!(packed.populate(&mut fira, &lut, 0).unwrap(), 0);
        assert!(packed.is_empty());
    }

    #[test]
    fn test_filter_set_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.yaml");
        std::fs::write(
            &path,
            r#"
name: "errors"
items:
  - pattern: "ERROR"
    case_sensitive: true
  - pattern: "debug"
    exclude: true
  - pattern: "WARN.*timeout"
    regex: true
"#,
        )
        .unwrap();

        let set = FilterSet::load_from(&path).unwrap();
        assert_eq!(set.name, "errors");
        assert_eq!(set.items.len(), 3);
        assert!(set.items[0].case_sensitive);
        assert!(set.items[1].exclude);
        assert!(set.items[2].regex);
        assert!(set.items.iter().all(|item| item.enabled));
        assert!(set.validate().is_ok());
    }
}
