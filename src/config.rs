//! Application settings loaded from a TOML configuration file.
//!
//! Every key is optional in the file itself; each operation asks for the
//! settings it needs and fails with [`ConfigError::MissingSetting`] before
//! touching any file when one is absent.
//!
//! # Configuration File Format
//!
//! ```toml
//! source_folder = "/media/camera"
//! file_extensions = ".jpg;.jpeg;.mp4"
//! target_folder_pattern = "/photos/{FileDate:yyyy}/{FileDate:MM}/{FileDate:yyyyMMdd_HHmmss}_{FileName}.{FileExtension}"
//! output_file_name = "analysis-{DateTime:yyyyMMdd_HHmmss}.txt"
//! copy_log_file_name = "copy-log-{DateTime:yyyyMMdd_HHmmss}.txt"
//! duplicates_log_file_name = "duplicates-log.txt"
//! cleanup_log_file_name = "cleanup-log.txt"
//! exclude_patterns = ["**/.thumbnails/**", "*.tmp"]
//! ```

use crate::templating;
use chrono::{Local, NaiveDateTime};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = ".datetidyrc.toml";

/// Errors that stop an operation before it does any work.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file could be found.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),
    /// A setting needed by the requested operation is not configured.
    #[error("{0} not configured")]
    MissingSetting(&'static str),
    /// Invalid glob pattern in `exclude_patterns`.
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    /// A configured folder does not exist.
    #[error("Folder '{}' does not exist", .0.display())]
    DirectoryNotFound(PathBuf),
}

/// Settings as they appear in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Folder scanned by `--copy` and `--analyze`.
    #[serde(default)]
    pub source_folder: Option<PathBuf>,

    /// Allowed extensions, `;`-separated (e.g. ".jpg;.png").
    #[serde(default)]
    pub file_extensions: Option<String>,

    /// Target path template for copied files.
    #[serde(default)]
    pub target_folder_pattern: Option<String>,

    /// Root scanned by `--find-duplicates`. Derived from the pattern when unset.
    #[serde(default)]
    pub target_folder: Option<PathBuf>,

    /// Report written by `--analyze`.
    #[serde(default)]
    pub output_file_name: Option<String>,

    #[serde(default = "default_copy_log")]
    pub copy_log_file_name: String,

    #[serde(default = "default_duplicates_log")]
    pub duplicates_log_file_name: String,

    #[serde(default = "default_cleanup_log")]
    pub cleanup_log_file_name: String,

    /// Glob patterns for files that are never scanned.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_folder: None,
            file_extensions: None,
            target_folder_pattern: None,
            target_folder: None,
            output_file_name: None,
            copy_log_file_name: default_copy_log(),
            duplicates_log_file_name: default_duplicates_log(),
            cleanup_log_file_name: default_cleanup_log(),
            exclude_patterns: Vec::new(),
        }
    }
}

fn default_copy_log() -> String {
    "copy-log.txt".to_string()
}

fn default_duplicates_log() -> String {
    "duplicates-log.txt".to_string()
}

fn default_cleanup_log() -> String {
    "cleanup-log.txt".to_string()
}

impl AppConfig {
    /// Load configuration from a file.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.datetidyrc.toml` in the current directory
    /// 3. Look for `~/.config/datetidy/config.toml` in home directory
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` when none of these exist.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("datetidy")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Err(ConfigError::ConfigNotFound(local_config))
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// File-name settings come back with their `{DateTime:...}` macros
    /// already expanded, see [`AppConfig::expand_file_names`].
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.expand_file_names();
        Ok(config)
    }

    /// Expands `{DateTime:...}` macros in every file-name setting using the
    /// current time. Done once per run so all stages agree on the names.
    pub fn expand_file_names(&mut self) {
        self.expand_file_names_at(&Local::now().naive_local());
    }

    pub fn expand_file_names_at(&mut self, now: &NaiveDateTime) {
        let expand = |name: &mut String| {
            *name = templating::expand_date_time_macros_at(name, now);
        };
        if let Some(name) = self.output_file_name.as_mut() {
            expand(name);
        }
        expand(&mut self.copy_log_file_name);
        expand(&mut self.duplicates_log_file_name);
        expand(&mut self.cleanup_log_file_name);
    }

    /// The source folder, which must exist.
    pub fn source_folder(&self) -> Result<&Path, ConfigError> {
        let folder = self
            .source_folder
            .as_deref()
            .ok_or(ConfigError::MissingSetting("source_folder"))?;
        if !folder.is_dir() {
            return Err(ConfigError::DirectoryNotFound(folder.to_path_buf()));
        }
        Ok(folder)
    }

    pub fn extensions(&self) -> Result<ExtensionSet, ConfigError> {
        self.file_extensions
            .as_deref()
            .map(ExtensionSet::parse)
            .ok_or(ConfigError::MissingSetting("file_extensions"))
    }

    pub fn target_pattern(&self) -> Result<&str, ConfigError> {
        self.target_folder_pattern
            .as_deref()
            .ok_or(ConfigError::MissingSetting("target_folder_pattern"))
    }

    /// Root folder scanned for duplicates, which must exist.
    ///
    /// Falls back to the macro-free leading directories of the target pattern.
    pub fn target_root(&self) -> Result<PathBuf, ConfigError> {
        let root = match &self.target_folder {
            Some(folder) => folder.clone(),
            None => {
                let derived = templating::static_root(self.target_pattern()?);
                if derived.as_os_str().is_empty() {
                    return Err(ConfigError::MissingSetting("target_folder"));
                }
                derived
            }
        };
        if !root.is_dir() {
            return Err(ConfigError::DirectoryNotFound(root));
        }
        Ok(root)
    }

    pub fn analysis_report_path(&self) -> Result<PathBuf, ConfigError> {
        self.output_file_name
            .as_deref()
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingSetting("output_file_name"))
    }

    pub fn copy_log_path(&self) -> PathBuf {
        PathBuf::from(&self.copy_log_file_name)
    }

    pub fn duplicates_log_path(&self) -> PathBuf {
        PathBuf::from(&self.duplicates_log_file_name)
    }

    pub fn cleanup_log_path(&self) -> PathBuf {
        PathBuf::from(&self.cleanup_log_file_name)
    }

    /// Compile `exclude_patterns` for matching.
    pub fn exclusions(&self) -> Result<ExclusionFilter, ConfigError> {
        ExclusionFilter::new(&self.exclude_patterns)
    }
}

/// Case-insensitive set of allowed file extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    extensions: HashSet<String>,
}

impl ExtensionSet {
    /// Parses a `;`-separated list. Entries are trimmed, lowercased, and a
    /// leading dot is optional.
    ///
    /// # Examples
    ///
    /// ```
    /// use datetidy::config::ExtensionSet;
    /// use std::path::Path;
    ///
    /// let set = ExtensionSet::parse(".jpg; PNG;;");
    /// assert!(set.matches(Path::new("photo.JPG")));
    /// assert!(set.matches(Path::new("scan.png")));
    /// assert!(!set.matches(Path::new("notes.txt")));
    /// ```
    pub fn parse(list: &str) -> Self {
        let extensions = list
            .split(';')
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| self.extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Extensions in sorted order, for display.
    pub fn sorted(&self) -> Vec<&str> {
        let mut list: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        list.sort_unstable();
        list
    }
}

/// Compiled `exclude_patterns`.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<Pattern>,
}

impl ExclusionFilter {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidGlobPattern` for the first invalid pattern.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p).map_err(|_| ConfigError::InvalidGlobPattern(p.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// True if the path, or its file name alone, matches any pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let file_name = path.file_name().map(Path::new);
        self.patterns.iter().any(|pattern| {
            pattern.matches_path(path) || file_name.is_some_and(|name| pattern.matches_path(name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_toml(
            r#"
            source_folder = "/media/camera"
            file_extensions = ".jpg;.png"
            target_folder_pattern = "/photos/{FileDate:yyyy}/{FileName}.{FileExtension}"
            exclude_patterns = ["*.tmp"]
            "#,
        )
        .unwrap();

        assert_eq!(config.source_folder, Some(PathBuf::from("/media/camera")));
        assert_eq!(config.extensions().unwrap().len(), 2);
        assert_eq!(config.copy_log_file_name, "copy-log.txt");
        assert_eq!(config.duplicates_log_file_name, "duplicates-log.txt");
        assert_eq!(config.cleanup_log_file_name, "cleanup-log.txt");
        assert_eq!(config.exclude_patterns, vec!["*.tmp".to_string()]);
    }

    #[test]
    fn test_file_names_expanded_once_at_load() {
        let config = AppConfig::from_toml(
            r#"
            duplicates_log_file_name = "dup-{DateTime:HHmmss}.txt"
            output_file_name = "analysis-{DateTime:yyyy}.txt"
            "#,
        )
        .unwrap();

        assert!(!config.duplicates_log_file_name.contains('{'));
        let first = config.duplicates_log_path();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(config.duplicates_log_path(), first);
        assert!(!config.analysis_report_path().unwrap().to_string_lossy().contains('{'));
    }

    #[test]
    fn test_expand_file_names_at() {
        let now = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(8, 9, 10)
            .unwrap();
        let mut config = AppConfig {
            copy_log_file_name: "copy-{DateTime:yyyyMMdd_HHmmss}.txt".to_string(),
            ..Default::default()
        };
        config.expand_file_names_at(&now);

        assert_eq!(config.copy_log_path(), PathBuf::from("copy-20240305_080910.txt"));
        assert_eq!(config.cleanup_log_path(), PathBuf::from("cleanup-log.txt"));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let result = AppConfig::from_toml("source_folder = [");
        assert!(matches!(result, Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn test_missing_settings_are_reported_by_name() {
        let config = AppConfig::default();
        assert!(matches!(
            config.extensions(),
            Err(ConfigError::MissingSetting("file_extensions"))
        ));
        assert!(matches!(
            config.target_pattern(),
            Err(ConfigError::MissingSetting("target_folder_pattern"))
        ));
        assert!(matches!(
            config.source_folder(),
            Err(ConfigError::MissingSetting("source_folder"))
        ));
    }

    #[test]
    fn test_missing_source_folder_directory() {
        let config = AppConfig {
            source_folder: Some(PathBuf::from("/non/existent/path")),
            ..Default::default()
        };
        assert!(matches!(
            config.source_folder(),
            Err(ConfigError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_target_root_derived_from_pattern() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let pattern = format!(
            "{}/{{FileDate:yyyy}}/{{FileName}}.{{FileExtension}}",
            temp_dir.path().display()
        );
        let config = AppConfig {
            target_folder_pattern: Some(pattern),
            ..Default::default()
        };
        assert_eq!(config.target_root().unwrap(), temp_dir.path());
    }

    #[test]
    fn test_explicit_target_folder_wins() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = AppConfig {
            target_folder: Some(temp_dir.path().to_path_buf()),
            target_folder_pattern: Some("/elsewhere/{FileName}".to_string()),
            ..Default::default()
        };
        assert_eq!(config.target_root().unwrap(), temp_dir.path());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let result = AppConfig::load(Some(Path::new("/non/existent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "file_extensions = \"txt\"\n").unwrap();

        let config = AppConfig::load(Some(path.as_path())).unwrap();
        assert!(config.extensions().unwrap().matches(Path::new("a.TXT")));
    }

    #[test]
    fn test_extension_set_ignores_blank_entries() {
        let set = ExtensionSet::parse(" ; ;.");
        assert!(set.is_empty());
        assert!(!set.matches(Path::new("noext")));
    }

    #[test]
    fn test_extension_set_sorted() {
        let set = ExtensionSet::parse(".png;.JPG;gif");
        assert_eq!(set.sorted(), vec!["gif", "jpg", "png"]);
    }

    #[test]
    fn test_exclusion_filter() {
        let filter = ExclusionFilter::new(&[
            "*.tmp".to_string(),
            "**/.thumbnails/**".to_string(),
        ])
        .unwrap();

        assert!(filter.is_excluded(Path::new("/data/a/b.tmp")));
        assert!(filter.is_excluded(Path::new("data/.thumbnails/x.jpg")));
        assert!(!filter.is_excluded(Path::new("/data/a/b.jpg")));
    }

    #[test]
    fn test_invalid_glob_returns_error() {
        let result = ExclusionFilter::new(&["[invalid".to_string()]);
        assert!(matches!(result, Err(ConfigError::InvalidGlobPattern(_))));
    }
}
