//! Copy engine: copies matching source files into the target layout.
//!
//! Each source file is mapped to a target path through the configured
//! pattern. When that path is already taken, the engine compares content:
//! identical files are skipped, different files get the first free
//! `name_N.ext` alternate. Existing files are never overwritten.
//!
//! In dry-run mode every decision is made the same way, but instead of
//! writing, the engine remembers which source would have landed where so that
//! later files collide with those planned copies exactly as they would in a
//! real run.

use crate::config::{ExclusionFilter, ExtensionSet};
use crate::hasher;
use crate::output::OutputFormatter;
use crate::run_log::{self, RunLog};
use crate::templating;
use chrono::{DateTime, Local, NaiveDateTime};
use filetime::FileTime;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use walkdir::WalkDir;

/// Highest `_N` suffix tried before giving up on a target name.
pub const MAX_COLLISION_ATTEMPTS: u32 = 9999;

/// What happened to one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyResult {
    /// Copied to the target path derived from the pattern.
    Copied,
    /// Identical content already present; nothing written.
    SkippedSameContent,
    /// The derived target held different content; copied to an alternate name.
    SkippedDifferentContent,
}

impl CopyResult {
    /// True when the source is (or in dry-run, would be) written to disk.
    pub fn writes_file(self) -> bool {
        !matches!(self, CopyResult::SkippedSameContent)
    }

    fn log_label(self) -> &'static str {
        match self {
            CopyResult::Copied => "COPY",
            CopyResult::SkippedSameContent => "SKIP (DUPLICATE - SAME HASH)",
            CopyResult::SkippedDifferentContent => "COPY (DUPLICATE - DIFFERENT HASH)",
        }
    }
}

/// Outcome of processing a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub result: CopyResult,
    pub source_path: PathBuf,
    /// Where the content lives after this step.
    pub final_target_path: PathBuf,
    /// The pattern-derived target, when it differs from `final_target_path`.
    pub original_target_path: Option<PathBuf>,
    pub file_size: u64,
}

/// Errors raised by the copy engine.
#[derive(Debug, Error)]
pub enum CopyError {
    /// No free alternate name within [`MAX_COLLISION_ATTEMPTS`].
    #[error("Too many file collisions for: {}", .0.display())]
    TooManyCollisions(PathBuf),
    /// Reading, comparing or writing one file failed.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The copy log could not be written.
    #[error("Failed to write copy log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CopyError {
    /// Fatal errors abort the whole run; the rest only fail one file.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CopyError::File { .. })
    }

    fn file(path: &Path, source: io::Error) -> Self {
        CopyError::File {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for copy operations.
pub type CopyOpResult<T> = Result<T, CopyError>;

/// Running totals for one copy run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyTotals {
    pub processed: usize,
    pub copied: usize,
    pub skipped: usize,
    pub bytes_copied: u64,
    pub bytes_skipped: u64,
    /// Files that failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl CopyTotals {
    fn record(&mut self, outcome: &CopyOutcome) {
        self.processed += 1;
        if outcome.result.writes_file() {
            self.copied += 1;
            self.bytes_copied += outcome.file_size;
        } else {
            self.skipped += 1;
            self.bytes_skipped += outcome.file_size;
        }
    }

    fn record_failure(&mut self, path: &Path, reason: String) {
        self.processed += 1;
        self.failed.push((path.to_path_buf(), reason));
    }
}

/// Settings for one copy run.
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions<'a> {
    pub target_pattern: &'a str,
    pub extensions: &'a ExtensionSet,
    pub exclusions: &'a ExclusionFilter,
    pub dry_run: bool,
}

/// How a target path was settled.
enum Resolution {
    /// Nothing there yet.
    Free,
    /// Already occupied by identical content.
    Identical,
    /// Alternate name chosen because the derived one held different content.
    Renamed,
}

/// Copies files into the organized layout.
pub struct CopyEngine<'a> {
    options: CopyOptions<'a>,
    /// Dry-run only: target path -> source whose content would be there.
    planned: HashMap<PathBuf, PathBuf>,
}

impl<'a> CopyEngine<'a> {
    pub fn new(options: CopyOptions<'a>) -> Self {
        Self {
            options,
            planned: HashMap::new(),
        }
    }

    /// Lists every file under `source_folder` with an allowed extension,
    /// sorted by path.
    pub fn collect_sources(&self, source_folder: &Path) -> Vec<PathBuf> {
        WalkDir::new(source_folder)
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
            .filter(|path| self.options.extensions.matches(path))
            .filter(|path| !self.options.exclusions.is_excluded(path))
            .collect()
    }

    /// Copies (or plans) one file and returns what happened.
    ///
    /// # Errors
    ///
    /// `CopyError::File` for I/O problems with this file alone, and
    /// `CopyError::TooManyCollisions` when no alternate name is free.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use datetidy::config::{ExclusionFilter, ExtensionSet};
    /// use datetidy::copier::{CopyEngine, CopyOptions};
    /// use std::path::Path;
    ///
    /// let extensions = ExtensionSet::parse(".jpg");
    /// let exclusions = ExclusionFilter::default();
    /// let mut engine = CopyEngine::new(CopyOptions {
    ///     target_pattern: "/photos/{FileDate:yyyy}/{FileName}.{FileExtension}",
    ///     extensions: &extensions,
    ///     exclusions: &exclusions,
    ///     dry_run: false,
    /// });
    ///
    /// match engine.copy_file(Path::new("/camera/IMG_0001.jpg")) {
    ///     Ok(outcome) => println!("{:?} -> {}", outcome.result, outcome.final_target_path.display()),
    ///     Err(e) => eprintln!("Copy failed: {}", e),
    /// }
    /// ```
    pub fn copy_file(&mut self, source: &Path) -> CopyOpResult<CopyOutcome> {
        let metadata = fs::metadata(source).map_err(|e| CopyError::file(source, e))?;
        let modified = metadata.modified().map_err(|e| CopyError::file(source, e))?;
        let modified_local: NaiveDateTime = DateTime::<Local>::from(modified).naive_local();
        let file_size = metadata.len();

        let target =
            templating::build_target_path(source, &modified_local, self.options.target_pattern);
        let (final_target, resolution) = self.resolve_target(source, file_size, &target)?;

        let result = match resolution {
            Resolution::Free => CopyResult::Copied,
            Resolution::Identical => CopyResult::SkippedSameContent,
            Resolution::Renamed => CopyResult::SkippedDifferentContent,
        };

        if result.writes_file() {
            if self.options.dry_run {
                self.planned
                    .insert(final_target.clone(), source.to_path_buf());
            } else {
                copy_preserving_mtime(source, &final_target, FileTime::from_system_time(modified))?;
            }
        }

        let original_target_path = (final_target != target).then_some(target);
        Ok(CopyOutcome {
            result,
            source_path: source.to_path_buf(),
            final_target_path: final_target,
            original_target_path,
            file_size,
        })
    }

    /// Copies every matching file under `source_folder`, writing the copy log
    /// to `log_path`.
    ///
    /// Per-file failures are logged and counted; only collision exhaustion
    /// and log write failures end the run early.
    pub fn run(&mut self, source_folder: &Path, log_path: &Path) -> CopyOpResult<CopyTotals> {
        let dry_run = self.options.dry_run;
        let log_err = |source: io::Error| CopyError::Log {
            path: log_path.to_path_buf(),
            source,
        };

        let sources = self.collect_sources(source_folder);
        let total = sources.len();
        let started = Instant::now();

        let mut log = RunLog::create(log_path).map_err(log_err)?;
        write_log_header(&mut log, dry_run).map_err(log_err)?;

        let verb = if dry_run { "preview" } else { "copy" };
        OutputFormatter::plain(&format!("Found {} files to {}...", total, verb));
        let progress = OutputFormatter::create_progress_bar(
            total as u64,
            if dry_run { "Previewed" } else { "Processed" },
        );

        let mut totals = CopyTotals::default();
        for (index, source) in sources.iter().enumerate() {
            let position = format!("[{}/{}]", index + 1, total);
            match self.copy_file(source) {
                Ok(outcome) => {
                    totals.record(&outcome);
                    write_outcome(&mut log, &position, &outcome, dry_run).map_err(log_err)?;
                }
                Err(e) if e.is_fatal() => {
                    progress.abandon();
                    log.event(&format!("{} FATAL: {}", position, e))
                        .map_err(log_err)?;
                    log.flush().map_err(log_err)?;
                    return Err(e);
                }
                Err(e) => {
                    progress.println(format!(
                        "Error {} file '{}': {}",
                        if dry_run { "previewing" } else { "copying" },
                        source.display(),
                        e
                    ));
                    log.event(&format!(
                        "{} ERROR: Failed to {} '{}' - {}",
                        position,
                        verb,
                        source.display(),
                        e
                    ))
                    .map_err(log_err)?;
                    totals.record_failure(source, e.to_string());
                }
            }
            progress.set_message(format!(
                "{}: {}, {}: {}",
                if dry_run { "Would copy" } else { "Copied" },
                totals.copied,
                if dry_run { "Would skip" } else { "Skipped" },
                totals.skipped
            ));
            progress.inc(1);
        }
        progress.finish();

        write_log_summary(&mut log, &totals, started.elapsed(), dry_run).map_err(log_err)?;
        log.flush().map_err(log_err)?;
        Ok(totals)
    }

    /// Settles the final target for `source`, following `_N` alternates.
    fn resolve_target(
        &self,
        source: &Path,
        source_size: u64,
        target: &Path,
    ) -> CopyOpResult<(PathBuf, Resolution)> {
        let Some(occupant) = self.occupant(target) else {
            return Ok((target.to_path_buf(), Resolution::Free));
        };

        if self.same_content(source, source_size, &occupant)? {
            return Ok((target.to_path_buf(), Resolution::Identical));
        }

        let parent = target.parent().unwrap_or_else(|| Path::new(""));
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = target
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        for counter in 1..=MAX_COLLISION_ATTEMPTS {
            let candidate = parent.join(format!("{}_{}{}", stem, counter, extension));
            match self.occupant(&candidate) {
                None => return Ok((candidate, Resolution::Renamed)),
                Some(occupant) if self.same_content(source, source_size, &occupant)? => {
                    return Ok((candidate, Resolution::Identical));
                }
                Some(_) => {}
            }
        }

        Err(CopyError::TooManyCollisions(target.to_path_buf()))
    }

    /// The file whose content sits at `path`, if any: the file itself, or in
    /// dry-run the source planned for it.
    fn occupant(&self, path: &Path) -> Option<PathBuf> {
        if path.exists() {
            Some(path.to_path_buf())
        } else {
            self.planned.get(path).cloned()
        }
    }

    fn same_content(&self, source: &Path, source_size: u64, other: &Path) -> CopyOpResult<bool> {
        let other_size = fs::metadata(other)
            .map_err(|e| CopyError::file(other, e))?
            .len();
        if other_size != source_size {
            return Ok(false);
        }
        hasher::files_identical(source, other).map_err(|e| CopyError::file(source, e))
    }
}

/// Copies without ever replacing an existing file, then stamps the copy with
/// the source modification time.
fn copy_preserving_mtime(source: &Path, target: &Path, mtime: FileTime) -> CopyOpResult<()> {
    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| CopyError::file(parent, e))?;
    }

    let mut reader = File::open(source).map_err(|e| CopyError::file(source, e))?;
    write_new_file(&mut reader, target, mtime)
}

/// Writes `reader` to a file that must not exist yet. On any failure after
/// the file was created, the partial file is removed again.
fn write_new_file<R: Read>(reader: &mut R, target: &Path, mtime: FileTime) -> CopyOpResult<()> {
    let writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|e| CopyError::file(target, e))?;

    fill_and_stamp(reader, writer, target, mtime).map_err(|e| {
        if let Err(cleanup) = fs::remove_file(target) {
            OutputFormatter::warning(&format!(
                "Could not remove partial copy {}: {}",
                target.display(),
                cleanup
            ));
        }
        CopyError::file(target, e)
    })
}

fn fill_and_stamp<R: Read>(
    reader: &mut R,
    mut writer: File,
    target: &Path,
    mtime: FileTime,
) -> io::Result<()> {
    io::copy(reader, &mut writer)?;
    writer.sync_all()?;
    drop(writer);
    filetime::set_file_mtime(target, mtime)
}

fn write_log_header(log: &mut RunLog, dry_run: bool) -> io::Result<()> {
    log.line(&format!(
        "File Copy Operation Log{} - Started: {}",
        if dry_run { " (DRY RUN)" } else { "" },
        run_log::timestamp()
    ))?;
    log.rule()?;
    if dry_run {
        log.line("DRY RUN MODE - No files were actually copied, this is a preview only")?;
        log.rule()?;
    }
    log.blank()
}

fn write_outcome(
    log: &mut RunLog,
    position: &str,
    outcome: &CopyOutcome,
    dry_run: bool,
) -> io::Result<()> {
    let preview = if dry_run { "[PREVIEW] " } else { "" };
    log.event(&format!(
        "{} {}{}",
        position,
        preview,
        outcome.result.log_label()
    ))?;
    log.line(&format!(
        "  Source: {} ({})",
        outcome.source_path.display(),
        run_log::format_bytes(outcome.file_size)
    ))?;
    match &outcome.original_target_path {
        Some(original) => {
            log.line(&format!("  Original Target: {}", original.display()))?;
            log.line(&format!(
                "  Actual Target: {}",
                outcome.final_target_path.display()
            ))?;
        }
        None => log.line(&format!("  Target: {}", outcome.final_target_path.display()))?,
    }
    log.blank()
}

fn write_log_summary(
    log: &mut RunLog,
    totals: &CopyTotals,
    elapsed: Duration,
    dry_run: bool,
) -> io::Result<()> {
    let would = if dry_run { "would be " } else { "" };
    log.blank()?;
    log.rule()?;
    log.line(&format!("Operation completed: {}", run_log::timestamp()))?;
    log.line(&format!("Duration: {}", run_log::format_duration(elapsed)))?;
    log.line(&format!("Total files processed: {}", totals.processed))?;
    log.line(&format!("Files {}copied: {}", would, totals.copied))?;
    log.line(&format!("Files {}skipped: {}", would, totals.skipped))?;
    log.line(&format!("Files failed: {}", totals.failed.len()))?;
    log.line(&format!(
        "Bytes {}copied: {}",
        would,
        run_log::format_bytes(totals.bytes_copied)
    ))?;
    log.line(&format!(
        "Bytes {}skipped: {}",
        would,
        run_log::format_bytes(totals.bytes_skipped)
    ))?;
    log.line(&format!(
        "Throughput: {}",
        run_log::format_throughput(totals.bytes_copied, elapsed)
    ))?;
    if dry_run {
        log.blank()?;
        log.line("NOTE: This was a DRY RUN. No files were actually copied.")?;
    }
    Ok(())
}
