//! Console output formatting and styling.
//!
//! Provides a centralized interface for all CLI output, including colored
//! messages, progress bars and boxed summaries. Run logs written to disk live
//! in [`crate::run_log`]; this module only talks to the terminal.

use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Width of the boxed summaries, including the borders.
const SUMMARY_WIDTH: usize = 56;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for long scans
/// - Boxed summaries at the end of an operation
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use datetidy::output::OutputFormatter;
    /// OutputFormatter::success("Copy complete!");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar that redraws at most once per second.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use datetidy::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100, "Copying");
    /// pb.inc(1);
    /// pb.finish_with_message("done");
    /// ```
    pub fn create_progress_bar(total: u64, prefix: &str) -> ProgressBar {
        let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr_with_hz(1));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb.set_prefix(prefix.to_string());
        pb
    }

    /// Prints a boxed summary with one `label: value` row per entry.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use datetidy::output::OutputFormatter;
    ///
    /// OutputFormatter::summary_box(
    ///     "CLEANUP SUMMARY",
    ///     &[("Files deleted", "12".to_string()), ("Space freed", "1.20 GB".to_string())],
    /// );
    /// ```
    pub fn summary_box(title: &str, rows: &[(&str, String)]) {
        let inner = SUMMARY_WIDTH - 4;
        let border = "=".repeat(SUMMARY_WIDTH);

        println!("{}", border);
        println!("| {:^width$} |", title.bold(), width = inner);
        println!("{}", border);

        let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0) + 1;
        for (label, value) in rows {
            let value_width = inner.saturating_sub(label_width + 1);
            println!(
                "| {:<lw$} {:>vw$} |",
                format!("{}:", label),
                value.green(),
                lw = label_width,
                vw = value_width
            );
        }
        println!("{}", border);
    }
}
