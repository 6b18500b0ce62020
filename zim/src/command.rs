//! Command registry and the invocation contract.
//!
//! A command pairs a key with an [`Action`] and a [`DirectoryScope`]. The
//! registry resolves the scoped working directory for every invocation and
//! hands it to the action explicitly, so no component changes the process's
//! current directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, instrument};

use crate::config::{Configuration, Layout};
use crate::core::model::{Application, SourceTree};
use crate::error::ZimError;
use crate::io::git::{ChangeDetector, Git, GitChangeDetector};
use crate::io::patch::{FilePatcher, FsPatcher};
use crate::io::shell::{ShellExecutor, SystemShell};
use crate::io::template::{AppVars, SourceTreeVars, TemplateVars};
use crate::selection::command_eligible;

/// External collaborators available to actions and gates.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub shell: &'a dyn ShellExecutor,
    pub patcher: &'a dyn FilePatcher,
    pub changes: &'a dyn ChangeDetector,
}

impl Services<'static> {
    /// Real shell, filesystem and git.
    pub fn system() -> Self {
        Self {
            shell: &SystemShell,
            patcher: &FsPatcher,
            changes: &GitChangeDetector,
        }
    }
}

impl fmt::Debug for Services<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Everything an action may look at while it runs for one application.
pub struct ActionContext<'a> {
    pub application: &'a Application,
    pub source_tree: &'a SourceTree,
    pub layout: &'a Layout,
    /// Scoped working directory for this invocation.
    pub workdir: &'a Path,
    pub services: Services<'a>,
}

impl ActionContext<'_> {
    /// Where the application lives on disk, regardless of the command's scope.
    pub fn app_dir(&self) -> PathBuf {
        self.layout.application_directory(self.application.key())
    }

    /// Run a shell command in the scoped working directory.
    pub fn run(&self, command: &str) -> Result<()> {
        self.services.shell.run(command, self.workdir)
    }

    /// Patch a file given relative to the scoped working directory.
    pub fn patch_file(&self, relative: &str, transform: &dyn Fn(&str) -> String) -> Result<bool> {
        self.services
            .patcher
            .apply_patch(&self.workdir.join(relative), transform)
    }

    pub fn git(&self) -> Git {
        Git::new(self.workdir)
    }

    /// Values exposed to shell-command templates.
    pub fn template_vars(&self) -> TemplateVars {
        TemplateVars {
            app: AppVars {
                key: self.application.key().to_string(),
                name: self.application.name().to_string(),
                git_url: self.application.remote_url(self.source_tree),
                tags: self.application.tags().clone(),
                directory: self.app_dir().display().to_string(),
            },
            source_tree: SourceTreeVars {
                key: self.source_tree.key().to_string(),
                directory: self.layout.source_tree_directory().display().to_string(),
            },
            base_directory: self.layout.base_directory().display().to_string(),
            workdir: self.workdir.display().to_string(),
        }
    }
}

/// Executable behavior of a command.
pub trait Action {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<()>;
}

/// Adapts a closure into an [`Action`].
pub struct FnAction<F>(F);

impl<F> Action for FnAction<F>
where
    F: Fn(&ActionContext<'_>) -> Result<()>,
{
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Working directory a command runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectoryScope {
    #[default]
    Application,
    SourceTree,
}

pub struct Command {
    key: String,
    description: Option<String>,
    scope: DirectoryScope,
    action: Box<dyn Action>,
}

impl Command {
    pub fn new(key: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            key: key.into(),
            description: None,
            scope: DirectoryScope::Application,
            action: Box::new(action),
        }
    }

    pub fn from_fn<F>(key: impl Into<String>, action: F) -> Self
    where
        F: Fn(&ActionContext<'_>) -> Result<()> + 'static,
    {
        Self::new(key, FnAction(action))
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn scope(mut self, scope: DirectoryScope) -> Self {
        self.scope = scope;
        self
    }

    /// Run in the source tree directory instead of the application's.
    pub fn in_source_tree_dir(self) -> Self {
        self.scope(DirectoryScope::SourceTree)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn directory_scope(&self) -> DirectoryScope {
        self.scope
    }

    /// Description for help output, falling back to the key.
    pub fn help_text(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.key)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("key", &self.key)
            .field("description", &self.description)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Resolved state shared by every invocation in one run.
#[derive(Debug, Clone, Copy)]
pub struct RunScope<'a> {
    pub config: &'a Configuration,
    pub layout: &'a Layout,
    pub source_tree: &'a SourceTree,
    pub services: Services<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOutcome {
    Executed,
    /// Command eligibility excluded this application.
    Skipped,
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. A duplicate key is rejected and the existing command kept.
    pub fn register(&mut self, command: Command) -> Result<(), ZimError> {
        if self.commands.contains_key(command.key()) {
            return Err(ZimError::DuplicateCommand {
                key: command.key().to_string(),
            });
        }
        self.commands.insert(command.key().to_string(), command);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&Command, ZimError> {
        self.commands
            .get(key)
            .ok_or_else(|| ZimError::UnknownCommand {
                key: key.to_string(),
                available: self.listing(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.commands.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// `key: help text` per command, sorted by key.
    pub fn listing(&self) -> Vec<String> {
        self.commands
            .values()
            .map(|command| format!("{}: {}", command.key(), command.help_text()))
            .collect()
    }

    /// Invoke `key` for one application of the active source tree.
    ///
    /// Ineligible applications are skipped without error. Action failures
    /// propagate unchanged.
    #[instrument(skip_all, fields(command = key, app = app_key))]
    pub fn invoke(&self, scope: &RunScope<'_>, key: &str, app_key: &str) -> Result<InvokeOutcome> {
        let command = self.get(key)?;
        let application = scope.source_tree.application(app_key)?;
        let app_dir = scope.layout.application_directory(app_key);

        if !command_eligible(
            scope.config.selection_mode(),
            command.directory_scope(),
            &app_dir,
            scope.services.changes,
        )? {
            debug!("Skipping {key} for {app_key}");
            return Ok(InvokeOutcome::Skipped);
        }

        let workdir = match command.directory_scope() {
            DirectoryScope::Application => {
                if !app_dir.is_dir() {
                    anyhow::bail!("application directory {} does not exist", app_dir.display());
                }
                app_dir
            }
            DirectoryScope::SourceTree => scope.layout.source_tree_directory().to_path_buf(),
        };

        debug!(dir = %workdir.display(), "running command");
        let ctx = ActionContext {
            application,
            source_tree: scope.source_tree,
            layout: scope.layout,
            workdir: &workdir,
            services: scope.services,
        };
        command.action.execute(&ctx)?;
        Ok(InvokeOutcome::Executed)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::SelectionMode;
    use crate::test_support::{FakeChanges, ScriptedShell, demo_repository};

    fn noop(key: &str) -> Command {
        Command::from_fn(key, |_ctx| Ok(()))
    }

    #[test]
    fn duplicate_command_is_rejected_and_first_kept() {
        let mut registry = CommandRegistry::new();
        registry
            .register(noop("print").description("first"))
            .expect("register");
        let err = registry
            .register(noop("print").description("second").in_source_tree_dir())
            .expect_err("duplicate");
        assert!(matches!(err, ZimError::DuplicateCommand { key } if key == "print"));

        let kept = registry.get("print").expect("get");
        assert_eq!(kept.help_text(), "first");
        assert_eq!(kept.directory_scope(), DirectoryScope::Application);
    }

    #[test]
    fn help_text_falls_back_to_key() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("fetch")).expect("fetch");
        registry
            .register(noop("clone").description("Clone missing checkouts"))
            .expect("clone");
        assert_eq!(
            registry.listing(),
            vec!["clone: Clone missing checkouts", "fetch: fetch"]
        );
    }

    #[test]
    fn unknown_command_lists_available() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("fetch")).expect("fetch");
        let err = registry.get("fetchh").expect_err("unknown");
        assert!(err.to_string().contains("  * fetch: fetch"));
    }

    #[test]
    fn invoke_passes_scoped_directory_to_action() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (repository, config) = demo_repository(temp.path(), &["alpha"]);
        let layout = config.layout(&repository).expect("layout");
        std::fs::create_dir_all(layout.application_directory("alpha")).expect("mkdir");
        let tree = repository.source_tree("demo").expect("demo");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CommandRegistry::new();
        let app_seen = Rc::clone(&seen);
        registry
            .register(Command::from_fn("in_app", move |ctx| {
                app_seen.borrow_mut().push(ctx.workdir.to_path_buf());
                Ok(())
            }))
            .expect("register");
        let tree_seen = Rc::clone(&seen);
        registry
            .register(
                Command::from_fn("in_tree", move |ctx| {
                    tree_seen.borrow_mut().push(ctx.workdir.to_path_buf());
                    Ok(())
                })
                .in_source_tree_dir(),
            )
            .expect("register");

        let shell = ScriptedShell::new();
        let changes = FakeChanges::default();
        let scope = RunScope {
            config: &config,
            layout: &layout,
            source_tree: tree,
            services: Services {
                shell: &shell,
                patcher: &FsPatcher,
                changes: &changes,
            },
        };
        registry.invoke(&scope, "in_app", "alpha").expect("in_app");
        registry.invoke(&scope, "in_tree", "alpha").expect("in_tree");

        assert_eq!(
            *seen.borrow(),
            vec![
                layout.application_directory("alpha"),
                layout.source_tree_directory().to_path_buf()
            ]
        );
    }

    #[test]
    fn invoke_skips_ineligible_application_silently() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (repository, mut config) = demo_repository(temp.path(), &["alpha"]);
        config.set_selection_mode(SelectionMode::OnlyChanged);
        let layout = config.layout(&repository).expect("layout");
        std::fs::create_dir_all(layout.application_directory("alpha")).expect("mkdir");

        let mut registry = CommandRegistry::new();
        registry
            .register(Command::from_fn("fail", |_ctx| anyhow::bail!("should not run")))
            .expect("register");

        let shell = ScriptedShell::new();
        let changes = FakeChanges::default();
        let scope = RunScope {
            config: &config,
            layout: &layout,
            source_tree: repository.source_tree("demo").expect("demo"),
            services: Services {
                shell: &shell,
                patcher: &FsPatcher,
                changes: &changes,
            },
        };
        let outcome = registry.invoke(&scope, "fail", "alpha").expect("skip");
        assert_eq!(outcome, InvokeOutcome::Skipped);
    }

    #[test]
    fn invoke_fails_when_application_directory_is_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (repository, config) = demo_repository(temp.path(), &["alpha"]);
        let layout = config.layout(&repository).expect("layout");

        let mut registry = CommandRegistry::new();
        registry.register(noop("noop")).expect("register");
        let shell = ScriptedShell::new();
        let changes = FakeChanges::default();
        let scope = RunScope {
            config: &config,
            layout: &layout,
            source_tree: repository.source_tree("demo").expect("demo"),
            services: Services {
                shell: &shell,
                patcher: &FsPatcher,
                changes: &changes,
            },
        };
        let err = registry.invoke(&scope, "noop", "alpha").expect_err("missing");
        assert!(err.to_string().contains("does not exist"));
    }
}
