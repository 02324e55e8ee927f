//! datetidy - copy files into a dated layout and clean up the duplicates
//!
//! The pipeline has three stages that only talk through the filesystem:
//! the copy engine fills the target tree, the duplicate finder writes a
//! plain-text report about it, and the cleaner deletes what that report marks.
//! An extension analyzer and a TOML configuration loader round out the tool.

pub mod analyzer;
pub mod cleaner;
pub mod cli;
pub mod config;
pub mod copier;
pub mod finder;
pub mod hasher;
pub mod output;
pub mod report;
pub mod run_log;
pub mod templating;

pub use cleaner::{CleanupError, CleanupReport, DuplicateCleaner};
pub use config::{AppConfig, ConfigError, ExclusionFilter, ExtensionSet};
pub use copier::{CopyEngine, CopyError, CopyOptions, CopyOutcome, CopyResult, CopyTotals};
pub use finder::{DuplicateFinder, DuplicateGroup, FileRecord, FindError};
pub use report::{CleanupPlan, DuplicatesReport, FileAction, ReportError};

pub use cli::{Command, run_cli};
