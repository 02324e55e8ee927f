//! Duplicate detection over an organized target tree.
//!
//! Files are grouped by recovered original name, extension and size, and
//! only then hashed, so most files are never read. Every confirmed group gets
//! exactly one KEEP: the alphabetically-first file whose name stamp agrees with
//! its modification time, or failing that, the alphabetically-first file.
//!
//! The finder never modifies files; its only output is the report.

use crate::config::ExclusionFilter;
use crate::hasher::{self, ContentDigest};
use crate::output::OutputFormatter;
use crate::report::{
    DuplicatesReport, FileAction, ReportEntry, ReportError, ReportGroup, compare_paths,
};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use walkdir::WalkDir;

/// Largest gap between a name stamp and the modification time that still
/// counts as a match, in milliseconds (exclusive).
pub const DATE_MATCH_TOLERANCE_MS: i64 = 2000;

static NAME_DATE_STAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8})_(\d{6})").expect("Invalid date stamp regex"));

static COLLISION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\d{1,4}$").expect("Invalid collision suffix regex"));

/// Errors that stop a duplicate search.
#[derive(Debug, Error)]
pub enum FindError {
    #[error("Invalid filename prefix pattern '{pattern}': {source}")]
    InvalidPrefixPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// A file seen while scanning the target tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub recovered_name: String,
    /// Lowercase extension without the dot.
    pub extension: String,
    /// Last-modified time, local.
    pub modified: NaiveDateTime,
}

/// Byte-identical files sharing a recovered name and extension. Always at
/// least two members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub files: Vec<FileRecord>,
}

/// Finds duplicate copies in an organized tree.
pub struct DuplicateFinder {
    prefix: Option<Regex>,
    exclusions: ExclusionFilter,
}

impl DuplicateFinder {
    /// `prefix_pattern` is the regex fragment from
    /// [`crate::templating::extract_prefix_pattern`]; empty means no prefix.
    pub fn new(prefix_pattern: &str) -> Result<Self, FindError> {
        let prefix = if prefix_pattern.trim().is_empty() {
            None
        } else {
            let anchored = format!("^(?:{})", prefix_pattern);
            Some(
                Regex::new(&anchored).map_err(|source| FindError::InvalidPrefixPattern {
                    pattern: prefix_pattern.to_string(),
                    source,
                })?,
            )
        };
        Ok(Self {
            prefix,
            exclusions: ExclusionFilter::default(),
        })
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionFilter) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Strips the organizational prefix and one trailing `_N` collision
    /// suffix from a file stem. `None` when nothing meaningful remains.
    ///
    /// # Examples
    ///
    /// ```
    /// use datetidy::finder::DuplicateFinder;
    ///
    /// let finder = DuplicateFinder::new(r"\d{8}_\d{6}_").unwrap();
    /// assert_eq!(finder.recover_original_name("20240101_120000_report_1").as_deref(), Some("report"));
    /// assert_eq!(finder.recover_original_name("20240101_120000_"), None);
    /// ```
    pub fn recover_original_name(&self, stem: &str) -> Option<String> {
        let stripped = match &self.prefix {
            Some(prefix) => prefix.replace(stem, ""),
            None => stem.into(),
        };
        let name = match COLLISION_SUFFIX.find(&stripped) {
            Some(m) if m.start() > 0 => &stripped[..m.start()],
            _ => &stripped[..],
        };
        if name.trim().is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Walks `root` and builds a record for every file with a recoverable
    /// name. Files without one are reported and skipped.
    pub fn scan(&self, root: &Path) -> Vec<FileRecord> {
        let paths: Vec<PathBuf> = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    OutputFormatter::warning(&format!("Skipping unreadable entry: {}", e));
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| !self.exclusions.is_excluded(path))
            .collect();

        OutputFormatter::plain(&format!("Found {} files to analyze...", paths.len()));
        let progress = OutputFormatter::create_progress_bar(paths.len() as u64, "Analyzed");

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            progress.inc(1);
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let Some(recovered_name) = self.recover_original_name(&stem) else {
                progress.println(format!(
                    "Warning: Could not extract original name from: {}",
                    stem
                ));
                continue;
            };

            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    progress.println(format!("Warning: Skipping {}: {}", path.display(), e));
                    continue;
                }
            };
            let modified = match metadata.modified() {
                Ok(time) => DateTime::<Local>::from(time).naive_local(),
                Err(e) => {
                    progress.println(format!(
                        "Warning: Skipping {}: no modification time: {}",
                        path.display(),
                        e
                    ));
                    continue;
                }
            };
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            records.push(FileRecord {
                path,
                size: metadata.len(),
                recovered_name,
                extension,
                modified,
            });
        }
        progress.finish();

        records
    }

    /// Groups records by (name, extension, size) and confirms each candidate
    /// group by content digest.
    pub fn find_groups(&self, records: Vec<FileRecord>) -> Vec<DuplicateGroup> {
        group_confirmed(records, hasher::hash_file)
    }

    /// Decides KEEP/DELETE for every group and assembles the report.
    pub fn build_report(&self, groups: &[DuplicateGroup]) -> DuplicatesReport {
        let groups = groups
            .iter()
            .map(|group| ReportGroup {
                original_name: group.files[0].recovered_name.clone(),
                file_size: group.files[0].size,
                entries: decide_keep(
                    group
                        .files
                        .iter()
                        .map(|f| analyze_member(&f.path, f.modified))
                        .collect(),
                ),
            })
            .collect();

        DuplicatesReport {
            generated_at: Local::now().naive_local(),
            groups,
        }
    }

    /// Scans `root`, writes the report to `report_path` and returns it.
    pub fn run(&self, root: &Path, report_path: &Path) -> Result<DuplicatesReport, FindError> {
        let records = self.scan(root);
        OutputFormatter::plain("Checking for duplicates with same size...");
        let groups = self.find_groups(records);
        let report = self.build_report(&groups);
        report.save(report_path)?;
        Ok(report)
    }
}

/// Size/name grouping followed by digest confirmation, with the digest
/// function supplied by the caller.
fn group_confirmed<F>(records: Vec<FileRecord>, mut digest: F) -> Vec<DuplicateGroup>
where
    F: FnMut(&Path) -> std::io::Result<ContentDigest>,
{
    let mut candidates: BTreeMap<(String, String, u64), Vec<FileRecord>> = BTreeMap::new();
    for record in records {
        candidates
            .entry((
                record.recovered_name.clone(),
                record.extension.clone(),
                record.size,
            ))
            .or_default()
            .push(record);
    }

    let mut groups = Vec::new();
    for (_, members) in candidates.into_iter().filter(|(_, m)| m.len() > 1) {
        let mut by_digest: BTreeMap<ContentDigest, Vec<FileRecord>> = BTreeMap::new();
        for record in members {
            match digest(&record.path) {
                Ok(hash) => by_digest.entry(hash).or_default().push(record),
                Err(e) => OutputFormatter::warning(&format!(
                    "Could not hash {}: {}",
                    record.path.display(),
                    e
                )),
            }
        }
        groups.extend(
            by_digest
                .into_values()
                .filter(|files| files.len() > 1)
                .map(|files| DuplicateGroup { files }),
        );
    }
    groups
}

/// Parses a leading `yyyyMMdd_HHmmss` stamp from a file stem.
///
/// # Examples
///
/// ```
/// use datetidy::finder::date_in_file_name;
///
/// assert!(date_in_file_name("20240101_120000_report").is_some());
/// assert!(date_in_file_name("report_20240101_120000").is_none());
/// assert!(date_in_file_name("20241399_120000_bad_month").is_none());
/// ```
pub fn date_in_file_name(stem: &str) -> Option<NaiveDateTime> {
    let caps = NAME_DATE_STAMP.captures(stem)?;
    let (date, time) = (&caps[1], &caps[2]);
    let num = |s: &str| s.parse::<u32>().ok();

    let year = date[0..4].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, num(&date[4..6])?, num(&date[6..8])?)?.and_hms_opt(
        num(&time[0..2])?,
        num(&time[2..4])?,
        num(&time[4..6])?,
    )
}

/// Builds the report entry for one member. The action is provisional until
/// [`decide_keep`] runs.
pub fn analyze_member(path: &Path, actual_date: NaiveDateTime) -> ReportEntry {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let date_in_name = date_in_file_name(&stem);
    let dates_match = date_in_name.is_some_and(|d| {
        (d - actual_date).num_milliseconds().abs() < DATE_MATCH_TOLERANCE_MS
    });

    ReportEntry {
        path: path.to_path_buf(),
        date_in_name,
        actual_date,
        dates_match,
        action: FileAction::Delete,
    }
}

/// Marks exactly one entry KEEP and the rest DELETE.
///
/// The kept entry is the alphabetically-first path (see [`compare_paths`])
/// among entries whose dates match, or among all entries when none match.
pub fn decide_keep(mut entries: Vec<ReportEntry>) -> Vec<ReportEntry> {
    let first = |matching_only: bool| {
        entries
            .iter()
            .filter(|e| !matching_only || e.dates_match)
            .map(|e| e.path.clone())
            .min_by(|a, b| compare_paths(a, b))
    };
    let keep = first(true).or_else(|| first(false));

    for entry in &mut entries {
        entry.action = if Some(&entry.path) == keep.as_ref() {
            FileAction::Keep
        } else {
            FileAction::Delete
        };
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn record(path: &str, name: &str, size: u64) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            size,
            recovered_name: name.to_string(),
            extension: "jpg".to_string(),
            modified: at(2024, 1, 1, 0, 0, 0),
        }
    }

    #[test]
    fn test_recover_without_prefix() {
        let finder = DuplicateFinder::new("").unwrap();
        assert_eq!(finder.recover_original_name("holiday").as_deref(), Some("holiday"));
        assert_eq!(finder.recover_original_name("holiday_2").as_deref(), Some("holiday"));
        assert_eq!(finder.recover_original_name("_12").as_deref(), Some("_12"));
        assert_eq!(finder.recover_original_name("   "), None);
    }

    #[test]
    fn test_recover_strips_prefix_only_at_start() {
        let finder = DuplicateFinder::new(r"\d\d\d\d\d\d\d\d_\d\d\d\d\d\d_").unwrap();
        assert_eq!(
            finder.recover_original_name("20240101_120000_report").as_deref(),
            Some("report")
        );
        assert_eq!(
            finder.recover_original_name("x20240101_120000_report").as_deref(),
            Some("x20240101_120000_report")
        );
    }

    #[test]
    fn test_invalid_prefix_pattern() {
        assert!(matches!(
            DuplicateFinder::new("(unclosed"),
            Err(FindError::InvalidPrefixPattern { .. })
        ));
    }

    #[test]
    fn test_date_in_file_name() {
        assert_eq!(
            date_in_file_name("20240101_120000_report"),
            Some(at(2024, 1, 1, 12, 0, 0))
        );
        assert_eq!(date_in_file_name("20240101_1200_report"), None);
        assert_eq!(date_in_file_name("IMG_0001"), None);
    }

    #[test]
    fn test_dates_match_within_two_seconds() {
        let path = Path::new("/t/20240101_120000_a.jpg");
        assert!(analyze_member(path, at(2024, 1, 1, 12, 0, 1)).dates_match);
        assert!(!analyze_member(path, at(2024, 1, 1, 12, 0, 2)).dates_match);
        assert!(!analyze_member(path, at(2024, 1, 1, 11, 59, 58)).dates_match);
        assert!(!analyze_member(Path::new("/t/a.jpg"), at(2024, 1, 1, 12, 0, 0)).dates_match);
    }

    #[test]
    fn test_keep_prefers_matching_date() {
        let entries = vec![
            analyze_member(Path::new("/t/20200101_000000_a.jpg"), at(2024, 1, 1, 12, 0, 0)),
            analyze_member(Path::new("/t/20240101_120000_a.jpg"), at(2024, 1, 1, 12, 0, 0)),
            analyze_member(Path::new("/t/a.jpg"), at(2024, 1, 1, 12, 0, 0)),
        ];

        let decided = decide_keep(entries);
        let kept: Vec<_> = decided
            .iter()
            .filter(|e| e.action == FileAction::Keep)
            .map(|e| e.path.clone())
            .collect();
        assert_eq!(kept, vec![PathBuf::from("/t/20240101_120000_a.jpg")]);
    }

    #[test]
    fn test_keep_falls_back_to_first_path() {
        let entries = vec![
            analyze_member(Path::new("/t/b/a.jpg"), at(2024, 1, 1, 12, 0, 0)),
            analyze_member(Path::new("/t/a/a.jpg"), at(2024, 1, 1, 12, 0, 0)),
        ];

        let decided = decide_keep(entries);
        assert_eq!(decided[0].action, FileAction::Delete);
        assert_eq!(decided[1].action, FileAction::Keep);
    }

    #[test]
    fn test_keep_compares_whole_path_strings() {
        let entries = vec![
            analyze_member(Path::new("/t/a/x.jpg"), at(2024, 1, 1, 12, 0, 0)),
            analyze_member(Path::new("/t/a.b/x.jpg"), at(2024, 1, 1, 12, 0, 0)),
        ];

        let decided = decide_keep(entries);
        assert_eq!(decided[0].action, FileAction::Delete);
        assert_eq!(decided[1].action, FileAction::Keep);
    }

    #[test]
    fn test_keep_first_among_several_matches() {
        let entries = vec![
            analyze_member(Path::new("/t/z/20240101_120000_a.jpg"), at(2024, 1, 1, 12, 0, 0)),
            analyze_member(Path::new("/t/y/20240101_120000_a.jpg"), at(2024, 1, 1, 12, 0, 0)),
            analyze_member(Path::new("/t/a/a.jpg"), at(2024, 1, 1, 12, 0, 0)),
        ];

        let decided = decide_keep(entries);
        let keeps = decided.iter().filter(|e| e.action == FileAction::Keep).count();
        assert_eq!(keeps, 1);
        assert_eq!(decided[1].action, FileAction::Keep);
    }

    #[test]
    fn test_singletons_are_never_hashed() {
        let calls = Cell::new(0);
        let groups = group_confirmed(
            vec![
                record("/t/a.jpg", "a", 10),
                record("/t/b.jpg", "b", 10),
                record("/t/a2.jpg", "a", 11),
            ],
            |_| {
                calls.set(calls.get() + 1);
                Err(std::io::Error::other("should not be called"))
            },
        );
        assert!(groups.is_empty());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_extension_separates_groups() {
        let mut png = record("/t/a.png", "a", 10);
        png.extension = "png".to_string();
        let calls = Cell::new(0);
        let groups = group_confirmed(vec![record("/t/a.jpg", "a", 10), png], |_| {
            calls.set(calls.get() + 1);
            Err(std::io::Error::other("should not be called"))
        });
        assert!(groups.is_empty());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_hash_subgroups() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let write = |name: &str, content: &str| {
            let path = temp_dir.path().join(name);
            fs::write(&path, content).unwrap();
            path.to_string_lossy().into_owned()
        };
        let a = write("a1.jpg", "AAAA");
        let b = write("a2.jpg", "AAAA");
        let c = write("a3.jpg", "BBBB");

        let finder = DuplicateFinder::new("").unwrap();
        let groups = finder.find_groups(vec![
            record(&a, "a", 4),
            record(&b, "a", 4),
            record(&c, "a", 4),
        ]);

        assert_eq!(groups.len(), 1);
        let paths: Vec<_> = groups[0].files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from(a), PathBuf::from(b)]);
    }

    #[test]
    fn test_build_report_marks_one_keep_per_group() {
        let finder = DuplicateFinder::new("").unwrap();
        let groups = vec![DuplicateGroup {
            files: vec![record("/t/b.jpg", "x", 5), record("/t/a.jpg", "x", 5)],
        }];

        let report = finder.build_report(&groups);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].original_name, "x");
        assert_eq!(report.groups[0].file_size, 5);
        let keep: Vec<_> = report.groups[0]
            .entries
            .iter()
            .filter(|e| e.action == FileAction::Keep)
            .map(|e| e.path.clone())
            .collect();
        assert_eq!(keep, vec![PathBuf::from("/t/a.jpg")]);
    }
}
