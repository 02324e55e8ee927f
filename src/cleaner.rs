//! Deletes the duplicates marked in a report written by the finder.
//!
//! The report is the only input: the cleaner never re-scans or re-hashes.
//! Files that have already disappeared are skipped, and a failed delete is
//! logged and counted without stopping the run.

use crate::output::OutputFormatter;
use crate::report::{CleanupPlan, FileAction, ReportError};
use crate::run_log::{self, RunLog};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that stop a cleanup run before or while it writes its log.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("Failed to write cleanup log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub groups: usize,
    /// Deleted, or in dry-run, would have been deleted.
    pub deleted: usize,
    pub kept: usize,
    /// No longer on disk, or in a group without a kept copy.
    pub skipped: usize,
    /// Deletes that failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    pub bytes_freed: u64,
    /// Report blocks ignored because they lacked a path or an action.
    pub dropped_entries: usize,
    /// Groups left untouched because no KEEP file of theirs is on disk.
    pub unprotected_groups: usize,
}

impl CleanupReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies a duplicates report to the filesystem.
///
/// A group is only touched while one of its KEEP files is still on disk, so a
/// damaged report can never remove every copy.
pub struct DuplicateCleaner {
    dry_run: bool,
}

impl DuplicateCleaner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Loads the report at `report_path` and processes it, writing the
    /// cleanup log to `log_path`.
    pub fn run(&self, report_path: &Path, log_path: &Path) -> Result<CleanupReport, CleanupError> {
        let plan = CleanupPlan::load(report_path)?;
        if plan.dropped_entries > 0 {
            OutputFormatter::warning(&format!(
                "Ignored {} incomplete entries in {}",
                plan.dropped_entries,
                report_path.display()
            ));
        }
        self.apply(&plan, report_path, log_path)
    }

    /// Processes an already parsed plan. `report_path` is only recorded in
    /// the log header.
    pub fn apply(
        &self,
        plan: &CleanupPlan,
        report_path: &Path,
        log_path: &Path,
    ) -> Result<CleanupReport, CleanupError> {
        let log_err = |source: io::Error| CleanupError::Log {
            path: log_path.to_path_buf(),
            source,
        };
        let started = Instant::now();

        let mut log = RunLog::create(log_path).map_err(log_err)?;
        self.write_log_header(&mut log, report_path).map_err(log_err)?;

        let progress = OutputFormatter::create_progress_bar(
            plan.total_files() as u64,
            if self.dry_run { "Previewed" } else { "Processed" },
        );

        let mut report = CleanupReport {
            dropped_entries: plan.dropped_entries,
            ..CleanupReport::default()
        };

        for group in &plan.groups {
            report.groups += 1;
            log.blank().map_err(log_err)?;
            log.line(&format!("=== Group: {} ===", group.original_name))
                .map_err(log_err)?;

            let has_kept_copy = group
                .files
                .iter()
                .any(|f| f.action == FileAction::Keep && f.path.exists());
            if !has_kept_copy {
                report.unprotected_groups += 1;
                progress.println(format!(
                    "Warning: No kept copy of '{}' on disk, leaving the group untouched",
                    group.original_name
                ));
                for file in &group.files {
                    progress.inc(1);
                    report.skipped += 1;
                    log.event(&format!("SKIP (NO KEPT COPY): {}", file.path.display()))
                        .map_err(log_err)?;
                }
                continue;
            }

            for file in &group.files {
                progress.inc(1);
                self.process_file(&file.path, file.action, &mut log, &mut report)
                    .map_err(log_err)?;
            }
        }
        progress.finish();

        self.write_log_summary(&mut log, &report, started.elapsed())
            .map_err(log_err)?;
        log.flush().map_err(log_err)?;
        Ok(report)
    }

    fn process_file(
        &self,
        path: &Path,
        action: FileAction,
        log: &mut RunLog,
        report: &mut CleanupReport,
    ) -> io::Result<()> {
        let size = match fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report.skipped += 1;
                return log.event(&format!("SKIP (FILE NOT FOUND): {}", path.display()));
            }
            Err(e) => {
                report.failed.push((path.to_path_buf(), e.to_string()));
                return log.event(&format!("ERROR: {} - {}", path.display(), e));
            }
        };
        let sized = format!("{} ({})", path.display(), run_log::format_bytes(size));

        match action {
            FileAction::Keep => {
                report.kept += 1;
                log.event(&format!("KEEP: {}", sized))
            }
            FileAction::Delete if self.dry_run => {
                report.deleted += 1;
                report.bytes_freed += size;
                log.event(&format!("WOULD DELETE: {}", sized))
            }
            FileAction::Delete => match fs::remove_file(path) {
                Ok(()) => {
                    report.deleted += 1;
                    report.bytes_freed += size;
                    log.event(&format!("DELETED: {}", sized))
                }
                Err(e) => {
                    OutputFormatter::error(&format!(
                        "Failed to delete {}: {}",
                        path.display(),
                        e
                    ));
                    report.failed.push((path.to_path_buf(), e.to_string()));
                    log.event(&format!("ERROR: {} - {}", path.display(), e))
                }
            },
        }
    }

    fn write_log_header(&self, log: &mut RunLog, report_path: &Path) -> io::Result<()> {
        log.line(&format!(
            "Duplicate Cleanup Log{} - Started: {}",
            if self.dry_run { " (DRY RUN)" } else { "" },
            run_log::timestamp()
        ))?;
        log.line(&format!("Source duplicates log: {}", report_path.display()))?;
        log.rule()?;
        if self.dry_run {
            log.line("DRY RUN MODE - No files were actually deleted, this is a preview only")?;
            log.rule()?;
        }
        Ok(())
    }

    fn write_log_summary(
        &self,
        log: &mut RunLog,
        report: &CleanupReport,
        elapsed: Duration,
    ) -> io::Result<()> {
        let would = if self.dry_run { "would be " } else { "" };
        log.blank()?;
        log.rule()?;
        log.line("CLEANUP SUMMARY")?;
        log.rule()?;
        log.line(&format!("Completed: {}", run_log::timestamp()))?;
        log.line(&format!("Duration: {}", run_log::format_duration(elapsed)))?;
        log.line(&format!("Groups processed: {}", report.groups))?;
        log.line(&format!("Files {}deleted: {}", would, report.deleted))?;
        log.line(&format!("Files kept: {}", report.kept))?;
        log.line(&format!("Files skipped: {}", report.skipped))?;
        if report.unprotected_groups > 0 {
            log.line(&format!(
                "Groups without a kept copy (untouched): {}",
                report.unprotected_groups
            ))?;
        }
        log.line(&format!("Files failed: {}", report.failed.len()))?;
        log.line(&format!(
            "Space {}freed: {}",
            would,
            run_log::format_bytes(report.bytes_freed)
        ))?;
        if report.dropped_entries > 0 {
            log.line(&format!(
                "Incomplete report entries ignored: {}",
                report.dropped_entries
            ))?;
        }
        log.rule()
    }
}
