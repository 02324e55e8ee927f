//! Human-readable run logs and the size/time formatting shared with reports.
//!
//! A [`RunLog`] is rewritten on every run. The buffered writer is flushed when
//! the log is dropped, so an operation that bails out early still leaves a
//! readable (if partial) log behind.

use chrono::{Local, NaiveDateTime};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Width of the `=` rules separating log sections.
pub const RULE_WIDTH: usize = 100;

/// Timestamp layout used in every log and report line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A log file opened for one operation.
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    /// Creates (or truncates) the log file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one line as-is.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "{}", text)
    }

    pub fn blank(&mut self) -> io::Result<()> {
        writeln!(self.writer)
    }

    /// Writes a full-width `=` rule.
    pub fn rule(&mut self) -> io::Result<()> {
        writeln!(self.writer, "{}", "=".repeat(RULE_WIDTH))
    }

    /// Writes `[timestamp] text`.
    pub fn event(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "[{}] {}", timestamp(), text)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn timestamp() -> String {
    format_timestamp(&Local::now().naive_local())
}

pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Formats a byte count with two decimals in the largest unit below 1024.
///
/// # Examples
///
/// ```
/// use datetidy::run_log::format_bytes;
///
/// assert_eq!(format_bytes(512), "512.00 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Formats a duration as `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Bytes per second over `elapsed`, formatted like [`format_bytes`].
pub fn format_throughput(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return format!("{}/s", format_bytes(bytes));
    }
    format!("{}/s", format_bytes((bytes as f64 / secs) as u64))
}
