//! The duplicates report shared by the finder and the cleaner.
//!
//! The finder encodes a [`DuplicatesReport`] to a human-readable text file;
//! the cleaner decodes that file into a [`CleanupPlan`]. Both directions live
//! here so the line prefixes they depend on are defined once:
//!
//! ```text
//! Duplicate Files Report - 2024-05-01 10:00:00
//! ====================================================================================================
//! Total duplicate groups found: 1
//! Total duplicate files: 2
//! Report format: 1
//!
//! === Duplicate Group #1 ===
//! Original Name: report
//! File Size: 1.00 KB
//! Number of copies: 2
//!
//!   Path: /sorted/20240101_120000_report.pdf
//!   Date in filename: 2024-01-01 12:00:00
//!   Actual file date: 2024-01-01 12:00:00
//!   Date match: YES
//!   Action: KEEP
//!
//! ```
//!
//! Groups are written largest file size first; within a group, paths are
//! sorted. Reports without a `Report format:` line are read as version 1.

use crate::run_log::{self, RULE_WIDTH};
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version written to, and accepted from, the `Report format:` line.
pub const REPORT_FORMAT_VERSION: u32 = 1;

const TITLE_PREFIX: &str = "Duplicate Files Report - ";
const VERSION_PREFIX: &str = "Report format:";
const GROUP_PREFIX: &str = "=== Duplicate Group";
const NAME_PREFIX: &str = "Original Name:";
const PATH_PREFIX: &str = "  Path:";
const ACTION_PREFIX: &str = "  Action:";

/// Alphabetical order of two paths as whole strings, so `/t/a.b/x` sorts
/// before `/t/a/x`.
pub fn compare_paths(a: &Path, b: &Path) -> Ordering {
    a.to_string_lossy().cmp(&b.to_string_lossy())
}

/// Errors reading or writing a duplicates report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Duplicates report '{}' does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to access duplicates report {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unsupported report format version {found} (expected {})", REPORT_FORMAT_VERSION)]
    UnsupportedVersion { found: u32 },
    #[error("Invalid report format line: '{0}'")]
    InvalidVersion(String),
}

/// What the cleaner should do with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAction {
    Keep,
    Delete,
}

impl FileAction {
    /// The text written after `Action:`.
    pub fn as_report_str(self) -> &'static str {
        match self {
            FileAction::Keep => "KEEP",
            FileAction::Delete => "DELETE (DUPLICATE)",
        }
    }

    /// Parses an `Action:` value. Anything starting with `DELETE` deletes.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value == "KEEP" {
            Some(FileAction::Keep)
        } else if value.starts_with("DELETE") {
            Some(FileAction::Delete)
        } else {
            None
        }
    }
}

/// One member of a duplicate group with the evidence behind its action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub path: PathBuf,
    /// Date stamp parsed from the start of the file name.
    pub date_in_name: Option<NaiveDateTime>,
    /// Last-modified time, local.
    pub actual_date: NaiveDateTime,
    pub dates_match: bool,
    pub action: FileAction,
}

/// A set of byte-identical files sharing a recovered original name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportGroup {
    pub original_name: String,
    pub file_size: u64,
    pub entries: Vec<ReportEntry>,
}

/// Everything the finder discovered in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatesReport {
    pub generated_at: NaiveDateTime,
    pub groups: Vec<ReportGroup>,
}

impl DuplicatesReport {
    pub fn total_files(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    /// Groups in report order: largest size first, ties kept in insertion
    /// order. Entries are sorted with [`compare_paths`].
    fn ordered_groups(&self) -> Vec<(&ReportGroup, Vec<&ReportEntry>)> {
        let mut groups: Vec<&ReportGroup> = self.groups.iter().collect();
        groups.sort_by(|a, b| b.file_size.cmp(&a.file_size));
        groups
            .into_iter()
            .map(|group| {
                let mut entries: Vec<&ReportEntry> = group.entries.iter().collect();
                entries.sort_by(|a, b| compare_paths(&a.path, &b.path));
                (group, entries)
            })
            .collect()
    }

    /// Encodes the report in its text layout.
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(
            w,
            "{}{}",
            TITLE_PREFIX,
            run_log::format_timestamp(&self.generated_at)
        )?;
        writeln!(w, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(w, "Total duplicate groups found: {}", self.groups.len())?;
        writeln!(w, "Total duplicate files: {}", self.total_files())?;
        writeln!(w, "{} {}", VERSION_PREFIX, REPORT_FORMAT_VERSION)?;
        writeln!(w)?;

        for (number, (group, entries)) in self.ordered_groups().into_iter().enumerate() {
            writeln!(w, "{} #{} ===", GROUP_PREFIX, number + 1)?;
            writeln!(w, "{} {}", NAME_PREFIX, group.original_name)?;
            writeln!(w, "File Size: {}", run_log::format_bytes(group.file_size))?;
            writeln!(w, "Number of copies: {}", entries.len())?;
            writeln!(w)?;

            for entry in entries {
                let date_in_name = entry
                    .date_in_name
                    .as_ref()
                    .map(run_log::format_timestamp)
                    .unwrap_or_else(|| "N/A".to_string());
                writeln!(w, "{} {}", PATH_PREFIX, entry.path.display())?;
                writeln!(w, "  Date in filename: {}", date_in_name)?;
                writeln!(
                    w,
                    "  Actual file date: {}",
                    run_log::format_timestamp(&entry.actual_date)
                )?;
                writeln!(
                    w,
                    "  Date match: {}",
                    if entry.dates_match { "YES" } else { "NO" }
                )?;
                writeln!(w, "{} {}", ACTION_PREFIX, entry.action.as_report_str())?;
                writeln!(w)?;
            }

            writeln!(w)?;
        }

        w.flush()
    }

    pub fn to_text(&self) -> String {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)
            .expect("Writing to a Vec cannot fail");
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Writes the report to `path`, replacing any previous report.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let io_err = |source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        self.write_to(BufWriter::new(file)).map_err(io_err)
    }
}

/// A file listed in a report, with its action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub action: FileAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGroup {
    pub original_name: String,
    pub files: Vec<PlannedFile>,
}

/// A decoded duplicates report: what to keep and what to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    pub groups: Vec<PlannedGroup>,
    /// File blocks skipped because they lacked a path, a valid action, or an
    /// enclosing group name.
    pub dropped_entries: usize,
}

impl CleanupPlan {
    /// Reads and decodes the report at `path`.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        if !path.exists() {
            return Err(ReportError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Decodes report text.
    ///
    /// Incomplete file blocks are dropped and counted rather than rejected.
    ///
    /// # Errors
    ///
    /// Only a `Report format:` line with a version other than
    /// [`REPORT_FORMAT_VERSION`] is an error.
    pub fn parse(text: &str) -> Result<Self, ReportError> {
        let mut parser = PlanParser::default();

        for raw in text.lines() {
            let line = raw.trim_end_matches('\r');

            if let Some(rest) = line.strip_prefix(VERSION_PREFIX) {
                let found: u32 = rest
                    .trim()
                    .parse()
                    .map_err(|_| ReportError::InvalidVersion(line.to_string()))?;
                if found != REPORT_FORMAT_VERSION {
                    return Err(ReportError::UnsupportedVersion { found });
                }
            } else if line.starts_with(GROUP_PREFIX) {
                parser.finish_group();
            } else if let Some(rest) = line.strip_prefix(NAME_PREFIX) {
                parser.name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix(PATH_PREFIX) {
                parser.finish_file();
                let path = rest.strip_prefix(' ').unwrap_or(rest);
                parser.path = Some(PathBuf::from(path));
            } else if let Some(rest) = line.strip_prefix(ACTION_PREFIX) {
                parser.action = Some(FileAction::parse(rest));
            }
        }
        parser.finish_group();

        Ok(parser.plan)
    }

    pub fn total_files(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }
}

impl From<&DuplicatesReport> for CleanupPlan {
    /// The plan the cleaner should decode from this report's text.
    fn from(report: &DuplicatesReport) -> Self {
        let groups = report
            .ordered_groups()
            .into_iter()
            .map(|(group, entries)| PlannedGroup {
                original_name: group.original_name.clone(),
                files: entries
                    .into_iter()
                    .map(|entry| PlannedFile {
                        path: entry.path.clone(),
                        action: entry.action,
                    })
                    .collect(),
            })
            .collect();
        Self {
            groups,
            dropped_entries: 0,
        }
    }
}

/// Line-by-line state while decoding.
#[derive(Default)]
struct PlanParser {
    plan: CleanupPlan,
    name: Option<String>,
    files: Vec<PlannedFile>,
    path: Option<PathBuf>,
    /// `Some(None)` when an `Action:` line had an unknown value.
    action: Option<Option<FileAction>>,
}

impl PlanParser {
    fn finish_file(&mut self) {
        match (self.path.take(), self.action.take()) {
            (Some(path), Some(Some(action))) => self.files.push(PlannedFile { path, action }),
            (None, None) => {}
            _ => self.plan.dropped_entries += 1,
        }
    }

    fn finish_group(&mut self) {
        self.finish_file();
        let files = std::mem::take(&mut self.files);
        match self.name.take() {
            Some(original_name) if !files.is_empty() => {
                self.plan.groups.push(PlannedGroup {
                    original_name,
                    files,
                });
            }
            _ => self.plan.dropped_entries += files.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn entry(path: &str, action: FileAction) -> ReportEntry {
        ReportEntry {
            path: PathBuf::from(path),
            date_in_name: Some(at(12, 0, 0)),
            actual_date: at(12, 0, 0),
            dates_match: action == FileAction::Keep,
            action,
        }
    }

    fn sample_report() -> DuplicatesReport {
        DuplicatesReport {
            generated_at: at(9, 30, 0),
            groups: vec![
                ReportGroup {
                    original_name: "small".to_string(),
                    file_size: 10,
                    entries: vec![
                        entry("/sorted/b/small.txt", FileAction::Delete),
                        entry("/sorted/a/small.txt", FileAction::Keep),
                    ],
                },
                ReportGroup {
                    original_name: "report".to_string(),
                    file_size: 4096,
                    entries: vec![
                        entry("/sorted/20240101_120000_report.pdf", FileAction::Keep),
                        entry("/sorted/20240101_120000_report_1.pdf", FileAction::Delete),
                        entry("/sorted/with spaces/report .pdf", FileAction::Delete),
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_round_trip_preserves_paths_and_actions() {
        let report = sample_report();
        let plan = CleanupPlan::parse(&report.to_text()).unwrap();

        assert_eq!(plan, CleanupPlan::from(&report));
        assert_eq!(plan.dropped_entries, 0);
        assert_eq!(plan.total_files(), 5);
    }

    #[test]
    fn test_groups_ordered_by_size_and_paths_sorted() {
        let plan = CleanupPlan::parse(&sample_report().to_text()).unwrap();

        assert_eq!(plan.groups[0].original_name, "report");
        assert_eq!(plan.groups[1].original_name, "small");
        let small: Vec<_> = plan.groups[1].files.iter().map(|f| &f.path).collect();
        assert_eq!(
            small,
            vec![
                &PathBuf::from("/sorted/a/small.txt"),
                &PathBuf::from("/sorted/b/small.txt")
            ]
        );
    }

    #[test]
    fn test_paths_compare_as_whole_strings() {
        assert_eq!(
            compare_paths(Path::new("/t/a.b/x"), Path::new("/t/a/x")),
            Ordering::Less
        );
        assert_eq!(
            compare_paths(Path::new("/t/report.pdf"), Path::new("/t/report_1.pdf")),
            Ordering::Less
        );
    }

    #[test]
    fn test_text_layout() {
        let text = sample_report().to_text();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Duplicate Files Report - 2024-01-01 09:30:00");
        assert_eq!(lines[1], "=".repeat(100));
        assert_eq!(lines[2], "Total duplicate groups found: 2");
        assert_eq!(lines[3], "Total duplicate files: 5");
        assert_eq!(lines[4], "Report format: 1");
        assert_eq!(lines[5], "");
        assert_eq!(lines[6], "=== Duplicate Group #1 ===");
        assert_eq!(lines[7], "Original Name: report");
        assert_eq!(lines[8], "File Size: 4.00 KB");
        assert_eq!(lines[9], "Number of copies: 3");
        assert_eq!(lines[11], "  Path: /sorted/20240101_120000_report.pdf");
        assert_eq!(lines[12], "  Date in filename: 2024-01-01 12:00:00");
        assert_eq!(lines[13], "  Actual file date: 2024-01-01 12:00:00");
        assert_eq!(lines[14], "  Date match: YES");
        assert_eq!(lines[15], "  Action: KEEP");
        assert!(text.contains("  Action: DELETE (DUPLICATE)"));
    }

    #[test]
    fn test_missing_date_written_as_na() {
        let mut report = sample_report();
        report.groups[0].entries[0].date_in_name = None;
        assert!(report.to_text().contains("  Date in filename: N/A"));
    }

    #[test]
    fn test_incomplete_blocks_are_dropped() {
        let text = "\
=== Duplicate Group #1 ===
Original Name: photo

  Path: /a/photo.jpg
  Action: KEEP

  Path: /b/photo.jpg
  Date match: NO

  Action: DELETE (DUPLICATE)

  Path: /c/photo.jpg
  Action: MAYBE

  Path: /d/photo.jpg
  Action: DELETE (DUPLICATE)
";
        let plan = CleanupPlan::parse(text).unwrap();

        assert_eq!(plan.groups.len(), 1);
        let paths: Vec<_> = plan.groups[0]
            .files
            .iter()
            .map(|f| f.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(paths, vec!["/a/photo.jpg", "/b/photo.jpg", "/d/photo.jpg"]);
        assert_eq!(plan.groups[0].files[1].action, FileAction::Delete);
        assert_eq!(plan.dropped_entries, 1);
    }

    #[test]
    fn test_group_without_name_is_dropped() {
        let text = "\
=== Duplicate Group #1 ===

  Path: /a/x.jpg
  Action: KEEP
";
        let plan = CleanupPlan::parse(text).unwrap();
        assert!(plan.groups.is_empty());
        assert_eq!(plan.dropped_entries, 1);
    }

    #[test]
    fn test_legacy_report_without_version_line() {
        let text = "\
Duplicate Files Report - 2024-01-01 09:30:00
Total duplicate groups found: 1

=== Duplicate Group #1 ===
Original Name: a
  Path: /x/a.txt
  Action: KEEP
  Path: /y/a.txt
  Action: DELETE (DUPLICATE)
";
        let plan = CleanupPlan::parse(text).unwrap();
        assert_eq!(plan.total_files(), 2);
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let result = CleanupPlan::parse("Report format: 2\n");
        assert!(matches!(
            result,
            Err(ReportError::UnsupportedVersion { found: 2 })
        ));
        assert!(matches!(
            CleanupPlan::parse("Report format: two\n"),
            Err(ReportError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = sample_report().to_text().replace('\n', "\r\n");
        let plan = CleanupPlan::parse(&text).unwrap();
        assert_eq!(plan, CleanupPlan::from(&sample_report()));
    }

    #[test]
    fn test_load_missing_report() {
        let result = CleanupPlan::load(Path::new("/non/existent/report.txt"));
        assert!(matches!(result, Err(ReportError::NotFound(_))));
    }
}
