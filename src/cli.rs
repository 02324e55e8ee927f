//! Command-line interface module for datetidy.
//!
//! Each [`Command`] loads the settings it needs from the [`AppConfig`],
//! runs one stage of the pipeline and prints a summary. Errors come back as
//! plain messages for `main` to print.

use crate::analyzer;
use crate::cleaner::DuplicateCleaner;
use crate::config::AppConfig;
use crate::copier::{CopyEngine, CopyOptions};
use crate::finder::DuplicateFinder;
use crate::output::OutputFormatter;
use crate::run_log;
use crate::templating;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One pipeline stage to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Count source files by extension.
    Analyze,
    /// Copy source files into the dated layout.
    Copy {
        /// If true, plan every copy without writing anything.
        dry_run: bool,
    },
    /// Scan the target tree and write the duplicates report.
    FindDuplicates,
    /// Delete the duplicates marked in the report.
    CleanDuplicates {
        /// If true, only log what would be deleted.
        dry_run: bool,
    },
}

/// Runs one command.
///
/// `duplicates_log` overrides the configured report path for both
/// [`Command::FindDuplicates`] and [`Command::CleanDuplicates`].
///
/// # Examples
///
/// ```no_run
/// use datetidy::cli::{run_cli, Command};
/// use datetidy::config::AppConfig;
///
/// let config = AppConfig::load(None).expect("config");
/// if let Err(e) = run_cli(Command::Copy { dry_run: true }, &config, None) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(
    command: Command,
    config: &AppConfig,
    duplicates_log: Option<&Path>,
) -> Result<(), String> {
    let report_path = || {
        duplicates_log
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.duplicates_log_path())
    };

    match command {
        Command::Analyze => analyze_source(config),
        Command::Copy { dry_run } => copy_files(config, dry_run),
        Command::FindDuplicates => find_duplicates(config, &report_path()),
        Command::CleanDuplicates { dry_run } => clean_duplicates(config, &report_path(), dry_run),
    }
}

fn analyze_source(config: &AppConfig) -> Result<(), String> {
    let source = config.source_folder().map_err(|e| e.to_string())?;
    let exclusions = config.exclusions().map_err(|e| e.to_string())?;
    let report_path = config.analysis_report_path().map_err(|e| e.to_string())?;

    OutputFormatter::header(&format!("Analyzing files in: {}", source.display()));
    let stats = analyzer::analyze(source, &exclusions);
    stats
        .save(&report_path)
        .map_err(|e| format!("Error writing report {}: {}", report_path.display(), e))?;

    OutputFormatter::plain(&format!("Total files: {}", stats.total_files));
    for (extension, count) in stats.counts.iter().take(10) {
        OutputFormatter::plain(&format!("  {:<20} {:>10}", extension, count));
    }
    OutputFormatter::success(&format!("Report saved to: {}", report_path.display()));
    Ok(())
}

fn copy_files(config: &AppConfig, dry_run: bool) -> Result<(), String> {
    let source = config.source_folder().map_err(|e| e.to_string())?;
    let extensions = config.extensions().map_err(|e| e.to_string())?;
    let target_pattern = config.target_pattern().map_err(|e| e.to_string())?;
    let exclusions = config.exclusions().map_err(|e| e.to_string())?;
    let log_path = config.copy_log_path();

    if dry_run {
        OutputFormatter::dry_run_notice("No files will be copied.");
    }
    OutputFormatter::header(&format!("Copying files from: {}", source.display()));
    OutputFormatter::info(&format!("Target pattern: {}", target_pattern));
    OutputFormatter::info(&format!("Extensions: {}", extensions.sorted().join(", ")));

    let started = Instant::now();
    let mut engine = CopyEngine::new(CopyOptions {
        target_pattern,
        extensions: &extensions,
        exclusions: &exclusions,
        dry_run,
    });
    let totals = engine
        .run(source, &log_path)
        .map_err(|e| format!("Copy aborted: {}", e))?;
    let elapsed = started.elapsed();

    OutputFormatter::summary_box(
        if dry_run { "COPY PREVIEW" } else { "COPY SUMMARY" },
        &[
            ("Files processed", totals.processed.to_string()),
            (
                if dry_run { "Would copy" } else { "Copied" },
                totals.copied.to_string(),
            ),
            (
                if dry_run { "Would skip" } else { "Skipped" },
                totals.skipped.to_string(),
            ),
            ("Failed", totals.failed.len().to_string()),
            ("Data copied", run_log::format_bytes(totals.bytes_copied)),
            ("Duration", run_log::format_duration(elapsed)),
            (
                "Throughput",
                run_log::format_throughput(totals.bytes_copied, elapsed),
            ),
        ],
    );

    report_failures(&totals.failed);
    OutputFormatter::success(&format!("Log saved to: {}", log_path.display()));
    Ok(())
}

fn find_duplicates(config: &AppConfig, report_path: &Path) -> Result<(), String> {
    let root = config.target_root().map_err(|e| e.to_string())?;
    let pattern = config.target_pattern().map_err(|e| e.to_string())?;
    let exclusions = config.exclusions().map_err(|e| e.to_string())?;

    let prefix = templating::extract_prefix_pattern(pattern);
    let finder = DuplicateFinder::new(&prefix)
        .map_err(|e| e.to_string())?
        .with_exclusions(exclusions);

    OutputFormatter::header(&format!("Searching for duplicates in: {}", root.display()));
    if !prefix.is_empty() {
        OutputFormatter::info(&format!("Filename prefix pattern: {}", prefix));
    }

    let report = finder
        .run(&root, report_path)
        .map_err(|e| format!("Duplicate search failed: {}", e))?;

    if report.groups.is_empty() {
        OutputFormatter::success("No duplicates found.");
        return Ok(());
    }

    let reclaimable: u64 = report
        .groups
        .iter()
        .map(|g| g.file_size * (g.entries.len() as u64 - 1))
        .sum();
    OutputFormatter::summary_box(
        "DUPLICATES FOUND",
        &[
            ("Duplicate groups", report.groups.len().to_string()),
            ("Files involved", report.total_files().to_string()),
            ("Reclaimable space", run_log::format_bytes(reclaimable)),
        ],
    );
    OutputFormatter::success(&format!("Report saved to: {}", report_path.display()));
    OutputFormatter::plain("Review the report, then run with --clean-duplicates.");
    Ok(())
}

fn clean_duplicates(config: &AppConfig, report_path: &Path, dry_run: bool) -> Result<(), String> {
    let log_path: PathBuf = config.cleanup_log_path();

    if dry_run {
        OutputFormatter::dry_run_notice("No files will be deleted.");
    }
    OutputFormatter::header(&format!("Cleaning duplicates from: {}", report_path.display()));

    let report = DuplicateCleaner::new(dry_run)
        .run(report_path, &log_path)
        .map_err(|e| e.to_string())?;

    OutputFormatter::summary_box(
        if dry_run { "CLEANUP PREVIEW" } else { "CLEANUP SUMMARY" },
        &[
            ("Groups processed", report.groups.to_string()),
            (
                if dry_run { "Would delete" } else { "Files deleted" },
                report.deleted.to_string(),
            ),
            ("Files kept", report.kept.to_string()),
            ("Skipped", report.skipped.to_string()),
            ("Groups without kept copy", report.unprotected_groups.to_string()),
            ("Failed", report.failed.len().to_string()),
            (
                if dry_run { "Would free" } else { "Space freed" },
                run_log::format_bytes(report.bytes_freed),
            ),
        ],
    );

    report_failures(&report.failed);
    OutputFormatter::success(&format!("Log saved to: {}", log_path.display()));
    Ok(())
}

fn report_failures(failed: &[(PathBuf, String)]) {
    if failed.is_empty() {
        return;
    }
    OutputFormatter::warning(&format!("{} files failed:", failed.len()));
    for (path, reason) in failed {
        OutputFormatter::error(&format!("  {}: {}", path.display(), reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_setting_is_reported() {
        let config = AppConfig::default();
        let err = run_cli(Command::Copy { dry_run: false }, &config, None).unwrap_err();
        assert!(err.contains("source_folder"));
    }

    #[test]
    fn test_clean_without_report_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = AppConfig::default();
        config.cleanup_log_file_name = temp_dir
            .path()
            .join("cleanup.txt")
            .to_string_lossy()
            .into_owned();
        let missing = temp_dir.path().join("missing.txt");

        let result = run_cli(
            Command::CleanDuplicates { dry_run: true },
            &config,
            Some(&missing),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_analyze_writes_report() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.jpg"), "x").unwrap();
        let report = temp_dir.path().join("analysis.txt");

        let config = AppConfig {
            source_folder: Some(source),
            output_file_name: Some(report.to_string_lossy().into_owned()),
            ..AppConfig::default()
        };

        run_cli(Command::Analyze, &config, None).unwrap();
        let text = fs::read_to_string(report).unwrap();
        assert!(text.contains("Total Files: 1"));
    }
}
