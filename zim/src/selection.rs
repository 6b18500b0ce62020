//! Selection engine: which applications a run processes, and which command
//! invocations actually execute.
//!
//! Application eligibility is decided once per application, with gates
//! evaluated in a fixed order and short-circuiting on the first exclusion:
//! resume cursor, tags, then external filter commands. Command eligibility
//! is decided per invocation from the selection mode and the checkout's
//! git state.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::command::DirectoryScope;
use crate::config::{Configuration, Layout, SelectionMode};
use crate::core::gates::{ResumeCursor, mode_admits, tags_admit};
use crate::core::model::Application;
use crate::io::git::ChangeDetector;
use crate::io::shell::ShellExecutor;

/// Why an application was left out of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    BeforeResumeCursor,
    Tags,
    /// An external filter exited non-zero.
    Filter { command: String },
    /// Filters were configured but the checkout does not exist.
    MissingDirectory,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::BeforeResumeCursor => f.write_str("before resume cursor"),
            Exclusion::Tags => f.write_str("tag selection"),
            Exclusion::Filter { command } => write!(f, "filter `{command}` failed"),
            Exclusion::MissingDirectory => f.write_str("directory missing for filters"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Excluded(Exclusion),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Stateful application gate for one pass over a source tree.
///
/// Applications must be offered in iteration order; the resume cursor
/// advances as they are seen.
pub struct Selector<'a> {
    config: &'a Configuration,
    layout: &'a Layout,
    shell: &'a dyn ShellExecutor,
    cursor: ResumeCursor<'a>,
}

impl<'a> Selector<'a> {
    pub fn new(config: &'a Configuration, layout: &'a Layout, shell: &'a dyn ShellExecutor) -> Self {
        Self {
            config,
            layout,
            shell,
            cursor: ResumeCursor::new(config.first_app()),
        }
    }

    #[instrument(skip_all, fields(app = application.key()))]
    pub fn application_eligibility(&mut self, application: &Application) -> Result<Eligibility> {
        if !self.cursor.admit(application.key()) {
            return Ok(Eligibility::Excluded(Exclusion::BeforeResumeCursor));
        }

        if !tags_admit(
            application.tags(),
            self.config.include_tags(),
            self.config.exclude_tags(),
        ) {
            debug!("excluded by tags");
            return Ok(Eligibility::Excluded(Exclusion::Tags));
        }

        let filters = self.config.filters();
        if filters.is_empty() {
            return Ok(Eligibility::Eligible);
        }
        let app_dir = self.layout.application_directory(application.key());
        if !app_dir.is_dir() {
            debug!(dir = %app_dir.display(), "cannot run filters, directory missing");
            return Ok(Eligibility::Excluded(Exclusion::MissingDirectory));
        }
        for filter in filters {
            if !self.shell.probe(filter, &app_dir)? {
                debug!(filter = %filter, "excluded by filter");
                return Ok(Eligibility::Excluded(Exclusion::Filter {
                    command: filter.clone(),
                }));
            }
        }
        Ok(Eligibility::Eligible)
    }
}

/// Decide whether one command runs for one application.
///
/// Commands scoped to the source tree always run, since the checkout may not
/// exist yet. A missing checkout is ineligible under a git-state mode.
pub fn command_eligible(
    mode: SelectionMode,
    scope: DirectoryScope,
    app_dir: &Path,
    changes: &dyn ChangeDetector,
) -> Result<bool> {
    if mode == SelectionMode::All || scope == DirectoryScope::SourceTree {
        return Ok(true);
    }
    if !app_dir.is_dir() {
        return Ok(false);
    }
    Ok(mode_admits(mode, changes.has_unpushed_changes(app_dir)?))
}
