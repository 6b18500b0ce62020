//! Orchestration driver: validate, then walk the active source tree.
//!
//! Init checks the configuration and requested commands before any side
//! effect. Iteration visits applications in definition order, runs every
//! requested command for each eligible one, and stops at the first failure
//! with a [`ZimError::CommandFailed`] that carries the resume command line.

use std::ffi::OsString;
use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument};

use crate::command::{CommandRegistry, InvokeOutcome, RunScope, Services};
use crate::config::Configuration;
use crate::core::model::Repository;
use crate::core::resume::resume_command_line;
use crate::error::ZimError;
use crate::selection::{Eligibility, Exclusion, Selector};

/// How the original process was started; used to build the resume line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a raw command line (program first). Arguments that are not
    /// valid UTF-8 are converted lossily; they only feed the resume line.
    pub fn from_os_args<I>(raw: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        let mut args = raw.into_iter().map(|arg| {
            let arg: OsString = arg.into();
            arg.to_string_lossy().into_owned()
        });
        let program = args.next().unwrap_or_else(|| "zim".to_string());
        Self {
            program,
            args: args.collect(),
        }
    }

    pub fn resume_from(&self, app: &str) -> String {
        resume_command_line(&self.program, &self.args, app)
    }
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Applications whose requested commands were invoked, in order.
    pub processed: Vec<String>,
    /// Applications left out by application eligibility.
    pub skipped: Vec<(String, Exclusion)>,
    /// Invocations that executed their action.
    pub executed: usize,
    /// Invocations skipped by command eligibility.
    pub skipped_invocations: usize,
}

pub struct Driver<'a> {
    repository: &'a Repository,
    commands: &'a CommandRegistry,
    config: &'a Configuration,
    services: Services<'a>,
}

impl<'a> Driver<'a> {
    pub fn new(
        repository: &'a Repository,
        commands: &'a CommandRegistry,
        config: &'a Configuration,
        services: Services<'a>,
    ) -> Self {
        Self {
            repository,
            commands,
            config,
            services,
        }
    }

    /// Check that a run could start. Performs no side effects.
    pub fn validate(&self, requested: &[String]) -> Result<(), ZimError> {
        self.config.base_directory()?;
        let tree = self.repository.source_tree(self.config.source_tree()?)?;
        if requested.is_empty() {
            return Err(ZimError::NoCommandsSpecified {
                available: self.commands.listing(),
            });
        }
        for key in requested {
            self.commands.get(key)?;
        }
        if let Some(first_app) = self.config.first_app() {
            tree.application(first_app)?;
        }
        Ok(())
    }

    /// Run `requested` commands, in order, for every eligible application.
    #[instrument(skip_all)]
    pub fn run(&self, requested: &[String], invocation: &Invocation) -> Result<RunSummary> {
        self.validate(requested)?;
        let layout = self.config.layout(self.repository)?;
        let tree = self.repository.source_tree(self.config.source_tree()?)?;

        let tree_dir = layout.source_tree_directory();
        fs::create_dir_all(tree_dir)
            .with_context(|| format!("create source tree directory {}", tree_dir.display()))?;
        debug!("Source Tree Directory: {}", tree_dir.display());
        debug!("Commands specified: {}", requested.join(", "));

        let scope = RunScope {
            config: self.config,
            layout: &layout,
            source_tree: tree,
            services: self.services,
        };
        let mut selector = Selector::new(self.config, &layout, self.services.shell);
        let mut summary = RunSummary::default();

        for application in tree.applications() {
            let key = application.key();
            let eligibility = match selector.application_eligibility(application) {
                Ok(eligibility) => eligibility,
                Err(source) => {
                    error!(app = key, "{source:#}");
                    return Err(ZimError::SelectionFailed {
                        application: key.to_string(),
                        resume_command: invocation.resume_from(key),
                        source,
                    }
                    .into());
                }
            };
            if let Eligibility::Excluded(reason) = eligibility {
                debug!(app = key, reason = %reason, "Skipping {key}");
                summary.skipped.push((key.to_string(), reason));
                continue;
            }

            info!(app = key, "Processing {key}");
            for command in requested {
                match self.commands.invoke(&scope, command, key) {
                    Ok(InvokeOutcome::Executed) => summary.executed += 1,
                    Ok(InvokeOutcome::Skipped) => summary.skipped_invocations += 1,
                    Err(source) => {
                        let resume_command = invocation.resume_from(key);
                        error!(app = key, command = %command, "{source:#}");
                        return Err(ZimError::CommandFailed {
                            command: command.clone(),
                            application: key.to_string(),
                            resume_command,
                            source,
                        }
                        .into());
                    }
                }
            }
            summary.processed.push(key.to_string());
        }

        Ok(summary)
    }
}
