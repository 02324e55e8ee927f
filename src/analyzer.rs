//! Counts the files in a folder by extension.

use crate::config::ExclusionFilter;
use crate::output::OutputFormatter;
use crate::run_log;
use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Label used for files without an extension.
pub const NO_EXTENSION: &str = "(no extension)";

/// Width of the dashed rule under the report header.
const RULE_WIDTH: usize = 50;

/// File counts per extension for one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionStats {
    pub source_folder: PathBuf,
    pub generated_at: NaiveDateTime,
    pub total_files: usize,
    /// `(extension, count)`, most frequent first, ties by extension.
    pub counts: Vec<(String, usize)>,
}

impl ExtensionStats {
    pub fn count_for(&self, extension: &str) -> usize {
        self.counts
            .iter()
            .find(|(ext, _)| ext == extension)
            .map_or(0, |(_, count)| *count)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(
            w,
            "File Analysis Report - {}",
            run_log::format_timestamp(&self.generated_at)
        )?;
        writeln!(w, "Source Folder: {}", self.source_folder.display())?;
        writeln!(w, "Total Files: {}", self.total_files)?;
        writeln!(w, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(w)?;
        for (extension, count) in &self.counts {
            writeln!(w, "{:<20} {:>10} files", extension, count)?;
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()
    }
}

/// Lowercase extension with its leading dot, or [`NO_EXTENSION`].
pub fn extension_key(path: &Path) -> String {
    match path.extension() {
        Some(ext) if !ext.is_empty() => format!(".{}", ext.to_string_lossy().to_lowercase()),
        _ => NO_EXTENSION.to_string(),
    }
}

/// Walks `source_folder` and counts every file not excluded.
pub fn analyze(source_folder: &Path, exclusions: &ExclusionFilter) -> ExtensionStats {
    let files: Vec<PathBuf> = WalkDir::new(source_folder)
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
        .filter(|path| !exclusions.is_excluded(path))
        .collect();

    let progress = OutputFormatter::create_progress_bar(files.len() as u64, "Analyzed");
    let mut by_extension: HashMap<String, usize> = HashMap::new();
    for path in &files {
        *by_extension.entry(extension_key(path)).or_default() += 1;
        progress.inc(1);
    }
    progress.finish();

    let mut counts: Vec<(String, usize)> = by_extension.into_iter().collect();
    counts.sort_by(|(a_ext, a_count), (b_ext, b_count)| {
        b_count.cmp(a_count).then_with(|| a_ext.cmp(b_ext))
    });

    ExtensionStats {
        source_folder: source_folder.to_path_buf(),
        generated_at: Local::now().naive_local(),
        total_files: files.len(),
        counts,
    }
}
