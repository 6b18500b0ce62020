//! Run configuration consumed by the driver, selection engine and commands.
//!
//! A `Configuration` is assembled once (registry file settings, then CLI
//! flags) and passed explicitly to every component. Required values are
//! validated when read, not when written.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::core::model::{Repository, SourceTree, application_name};
use crate::error::ZimError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    #[default]
    Normal,
    Verbose,
    Quiet,
}

impl LogLevel {
    const VALID: &'static [&'static str] = &["normal", "verbose", "quiet"];

    /// Default `tracing` filter directive for this level.
    pub fn filter_directive(self) -> &'static str {
        match self {
            LogLevel::Normal => "info",
            LogLevel::Verbose => "debug",
            LogLevel::Quiet => "warn",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ZimError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "normal" => Ok(LogLevel::Normal),
            "verbose" => Ok(LogLevel::Verbose),
            "quiet" => Ok(LogLevel::Quiet),
            other => Err(ZimError::InvalidValue {
                field: "log level",
                value: other.to_string(),
                expected: Self::VALID,
            }),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ZimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Git-state filter applied to commands that run inside application directories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionMode {
    #[default]
    All,
    OnlyChanged,
    OnlyUnchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    base_directory: Option<PathBuf>,
    source_tree: Option<String>,
    log_level: LogLevel,
    first_app: Option<String>,
    selection_mode: SelectionMode,
    include_tags: BTreeSet<String>,
    exclude_tags: BTreeSet<String>,
    filters: Vec<String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_base_directory(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.base_directory = Some(dir.into());
        self
    }

    /// Base directory under which source trees live.
    pub fn base_directory(&self) -> Result<&Path, ZimError> {
        match self.base_directory.as_deref() {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir),
            _ => Err(ZimError::BaseDirectoryUndefined),
        }
    }

    pub fn set_source_tree(&mut self, key: impl Into<String>) -> &mut Self {
        self.source_tree = Some(key.into());
        self
    }

    /// Key of the active source tree.
    pub fn source_tree(&self) -> Result<&str, ZimError> {
        match self.source_tree.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ZimError::SourceTreeUndefined),
        }
    }

    pub fn set_log_level(&mut self, level: LogLevel) -> &mut Self {
        self.log_level = level;
        self
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn set_first_app(&mut self, key: impl Into<String>) -> &mut Self {
        self.first_app = Some(key.into());
        self
    }

    pub fn first_app(&self) -> Option<&str> {
        self.first_app.as_deref()
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) -> &mut Self {
        self.selection_mode = mode;
        self
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.selection_mode
    }

    pub fn include_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.include_tags.insert(tag.into());
        self
    }

    pub fn include_tags(&self) -> &BTreeSet<String> {
        &self.include_tags
    }

    pub fn exclude_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.exclude_tags.insert(tag.into());
        self
    }

    pub fn exclude_tags(&self) -> &BTreeSet<String> {
        &self.exclude_tags
    }

    pub fn add_filter(&mut self, command: impl Into<String>) -> &mut Self {
        self.filters.push(command.into());
        self
    }

    /// External filter commands, in the order they were given.
    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Resolve on-disk locations for the active source tree.
    pub fn layout(&self, repository: &Repository) -> Result<Layout, ZimError> {
        let base = self.base_directory()?;
        let tree = repository.source_tree(self.source_tree()?)?;
        Ok(Layout::new(base, tree))
    }
}

/// Resolved directories for one run.
///
/// This is the only place that derives where an application lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    base_directory: PathBuf,
    source_tree_directory: PathBuf,
}

impl Layout {
    pub fn new(base_directory: &Path, tree: &SourceTree) -> Self {
        Self {
            base_directory: base_directory.to_path_buf(),
            source_tree_directory: base_directory.join(tree.directory()),
        }
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn source_tree_directory(&self) -> &Path {
        &self.source_tree_directory
    }

    /// `<base>/<tree directory>/<basename(app key)>`
    pub fn application_directory(&self, app_key: &str) -> PathBuf {
        self.source_tree_directory.join(application_name(app_key))
    }
}
