//! Path templating for the organized layout.
//!
//! Target patterns are plain strings with a small, fixed set of macros:
//!
//! - `{FileDate:yyyy}`, `{FileDate:MM}` and `{FileDate:yyyyMMdd_HHmmss}` are
//!   taken from the source file's last-modified time
//! - `{FileName}` is the source file name without its extension
//! - `{FileExtension}` is the source extension without the leading dot
//! - `{DateTime:<format>}` is the current local time, used in log file names
//!
//! Nothing in this module touches the filesystem.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

static DATE_TIME_MACRO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{DateTime:([^}]+)\}").expect("Invalid DateTime macro regex"));

const FILE_NAME_TOKEN: &str = "{FileName}";
const FILE_DATE_OPEN: &str = "{FileDate:";

/// Replaces every `{DateTime:<format>}` macro with the current local time.
///
/// Braces that do not form a complete macro are left untouched.
///
/// # Examples
///
/// ```
/// use datetidy::templating::expand_date_time_macros;
///
/// assert_eq!(expand_date_time_macros("copy-log.txt"), "copy-log.txt");
/// assert!(!expand_date_time_macros("log-{DateTime:yyyy}.txt").contains('{'));
/// ```
pub fn expand_date_time_macros(text: &str) -> String {
    expand_date_time_macros_at(text, &Local::now().naive_local())
}

/// Same as [`expand_date_time_macros`] with an explicit "now".
pub fn expand_date_time_macros_at(text: &str, now: &NaiveDateTime) -> String {
    DATE_TIME_MACRO
        .replace_all(text, |caps: &regex::Captures| format_date(now, &caps[1]))
        .into_owned()
}

/// Builds the target path for a source file from a target pattern.
///
/// Only the exact tokens listed in the module docs are recognized; anything
/// else in the pattern is kept verbatim.
pub fn build_target_path(source: &Path, modified: &NaiveDateTime, pattern: &str) -> PathBuf {
    let file_name = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    let target = pattern
        .replace("{FileDate:yyyy}", &modified.format("%Y").to_string())
        .replace("{FileDate:MM}", &modified.format("%m").to_string())
        .replace(
            "{FileDate:yyyyMMdd_HHmmss}",
            &modified.format("%Y%m%d_%H%M%S").to_string(),
        )
        .replace(FILE_NAME_TOKEN, &file_name)
        .replace("{FileExtension}", &extension);

    PathBuf::from(target)
}

/// Derives a regex fragment matching the text that precedes `{FileName}` in
/// the last segment of `pattern`.
///
/// Literal text is escaped. Inside a `{FileDate:<format>}` token every letter
/// becomes `\d` and every other character is escaped, so
/// `{FileDate:yyyyMMdd_HHmmss}_` turns into eight digits, `_`, six digits, `_`.
/// Returns an empty string when the last segment has no `{FileName}`.
///
/// # Examples
///
/// ```
/// use datetidy::templating::extract_prefix_pattern;
///
/// assert_eq!(extract_prefix_pattern("out/{FileDate:yyyy}-{FileName}.jpg"), r"\d\d\d\d\-");
/// assert_eq!(extract_prefix_pattern("out/{FileDate:yyyy}/photo.jpg"), "");
/// ```
pub fn extract_prefix_pattern(pattern: &str) -> String {
    let last_segment = pattern.rsplit(['/', '\\']).next().unwrap_or(pattern);
    let Some(name_at) = last_segment.find(FILE_NAME_TOKEN) else {
        return String::new();
    };

    let mut prefix = &last_segment[..name_at];
    let mut fragment = String::new();

    while let Some(open) = prefix.find(FILE_DATE_OPEN) {
        fragment.push_str(&regex::escape(&prefix[..open]));
        let rest = &prefix[open + FILE_DATE_OPEN.len()..];
        let Some(close) = rest.find('}') else {
            // Unterminated token, treat the remainder as literal text.
            fragment.push_str(&regex::escape(&prefix[open..]));
            return fragment;
        };
        for c in rest[..close].chars() {
            if c.is_ascii_alphabetic() {
                fragment.push_str(r"\d");
            } else {
                fragment.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
            }
        }
        prefix = &rest[close + 1..];
    }
    fragment.push_str(&regex::escape(prefix));
    fragment
}

/// Returns the leading directories of `pattern` that contain no macro.
///
/// `/data/sorted/{FileDate:yyyy}/{FileName}.jpg` yields `/data/sorted`.
pub fn static_root(pattern: &str) -> PathBuf {
    let mut root = PathBuf::new();
    let components: Vec<Component> = Path::new(pattern).components().collect();
    // The last component is always the file name, even when it has no macro.
    let dirs = components.len().saturating_sub(1);
    for component in components.into_iter().take(dirs) {
        if component.as_os_str().to_string_lossy().contains('{') {
            break;
        }
        root.push(component);
    }
    root
}

/// Formats `dt` with a .NET-style custom date format string.
///
/// Supports runs of `y`, `M`, `d`, `H`, `h`, `m`, `s`, `f` and `t`.
/// Text between single quotes and any other character is copied as-is.
pub fn format_date(dt: &NaiveDateTime, format: &str) -> String {
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::with_capacity(format.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                out.push(chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        match c {
            'y' => {
                let year = dt.year();
                match run {
                    1 => out.push_str(&(year % 100).to_string()),
                    2 => out.push_str(&format!("{:02}", year % 100)),
                    _ => out.push_str(&format!("{:0width$}", year, width = run)),
                }
            }
            'M' => match run {
                1 | 2 => out.push_str(&padded(dt.month(), run)),
                3 => out.push_str(&dt.format("%b").to_string()),
                _ => out.push_str(&dt.format("%B").to_string()),
            },
            'd' => match run {
                1 | 2 => out.push_str(&padded(dt.day(), run)),
                3 => out.push_str(&dt.format("%a").to_string()),
                _ => out.push_str(&dt.format("%A").to_string()),
            },
            'H' => out.push_str(&padded(dt.hour(), run)),
            'h' => out.push_str(&padded(dt.hour12().1, run)),
            'm' => out.push_str(&padded(dt.minute(), run)),
            's' => out.push_str(&padded(dt.second(), run)),
            'f' => {
                let digits = run.min(9);
                let nanos = dt.nanosecond() % 1_000_000_000;
                let value = nanos / 10u32.pow(9 - digits as u32);
                out.push_str(&format!("{:0width$}", value, width = digits));
            }
            't' => {
                let marker = if dt.hour12().0 { "PM" } else { "AM" };
                out.push_str(if run == 1 { &marker[..1] } else { marker });
            }
            _ => {
                for _ in 0..run {
                    out.push(c);
                }
            }
        }

        i += run;
    }

    out
}

fn padded(value: u32, run: usize) -> String {
    if run == 1 {
        value.to_string()
    } else {
        format!("{:02}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_milli_opt(14, 5, 9, 250)
            .unwrap()
    }

    #[test]
    fn test_format_date_common_tokens() {
        let dt = sample_time();
        assert_eq!(format_date(&dt, "yyyyMMdd_HHmmss"), "20240307_140509");
        assert_eq!(format_date(&dt, "yyyy-MM-dd HH:mm:ss"), "2024-03-07 14:05:09");
        assert_eq!(format_date(&dt, "yy"), "24");
        assert_eq!(format_date(&dt, "M/d"), "3/7");
        assert_eq!(format_date(&dt, "hh tt"), "02 PM");
        assert_eq!(format_date(&dt, "ss.fff"), "09.250");
    }

    #[test]
    fn test_format_date_quoted_literal() {
        let dt = sample_time();
        assert_eq!(format_date(&dt, "'day' dd"), "day 07");
    }

    #[test]
    fn test_expand_multiple_macros() {
        let dt = sample_time();
        let expanded =
            expand_date_time_macros_at("log-{DateTime:yyyy}-{DateTime:HHmm}.txt", &dt);
        assert_eq!(expanded, "log-2024-1405.txt");
    }

    #[test]
    fn test_expand_leaves_unmatched_braces() {
        let dt = sample_time();
        assert_eq!(
            expand_date_time_macros_at("{DateTime:yyyy}{oops}{DateTime:", &dt),
            "2024{oops}{DateTime:"
        );
        assert_eq!(expand_date_time_macros_at("{}", &dt), "{}");
    }

    #[test]
    fn test_build_target_path_tokens() {
        let dt = sample_time();
        let path = build_target_path(
            Path::new("/src/holiday/IMG_0042.JPG"),
            &dt,
            "/out/{FileDate:yyyy}/{FileDate:MM}/{FileDate:yyyyMMdd_HHmmss}_{FileName}.{FileExtension}",
        );
        assert_eq!(
            path,
            PathBuf::from("/out/2024/03/20240307_140509_IMG_0042.JPG")
        );
    }

    #[test]
    fn test_build_target_path_ignores_unknown_tokens() {
        let dt = sample_time();
        let path = build_target_path(Path::new("a.txt"), &dt, "{FileDate:dd}/{FileName}");
        assert_eq!(path, PathBuf::from("{FileDate:dd}/a"));
    }

    #[test]
    fn test_extract_prefix_pattern_date_stamp() {
        let pattern = "/out/{FileDate:yyyy}/{FileDate:yyyyMMdd_HHmmss}_{FileName}.{FileExtension}";
        let prefix = extract_prefix_pattern(pattern);
        assert_eq!(prefix, r"\d\d\d\d\d\d\d\d_\d\d\d\d\d\d_");

        let re = Regex::new(&format!("^{}", prefix)).unwrap();
        assert_eq!(re.replace("20240101_120000_report", ""), "report");
    }

    #[test]
    fn test_extract_prefix_pattern_escapes_literals() {
        assert_eq!(
            extract_prefix_pattern(r"C:\out\[{FileDate:yyyy.MM}] {FileName}"),
            r"\[\d\d\d\d\.\d\d\] "
        );
    }

    #[test]
    fn test_extract_prefix_pattern_without_file_name() {
        assert_eq!(extract_prefix_pattern("/out/{FileName}/fixed.jpg"), "");
        assert_eq!(extract_prefix_pattern("/out/{FileName}.jpg"), "");
    }

    #[test]
    fn test_static_root() {
        assert_eq!(
            static_root("/data/sorted/{FileDate:yyyy}/{FileName}.jpg"),
            PathBuf::from("/data/sorted")
        );
        assert_eq!(static_root("/data/sorted/{FileName}.jpg"), PathBuf::from("/data/sorted"));
        assert_eq!(static_root("{FileDate:yyyy}/{FileName}"), PathBuf::new());
    }
}
