//! Concrete command actions: shell templates, file patches, dependency
//! bumps, braid vendoring and the built-in git commands.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::command::{Action, ActionContext, Command, CommandRegistry};
use crate::core::resume::shell_quote;
use crate::error::ZimError;
use crate::io::git::Git;
use crate::io::patch::{CoordinateRewrite, apply_replacements, coordinate_group};
use crate::io::template;

/// Files rewritten by dependency bumps, relative to the application directory.
pub const DEPENDENCY_FILES: &[&str] = &["build.yaml", "README.md"];

/// Environment variables that pin an rbenv selection from the calling shell.
const RBENV_VARS: &[&str] = &["RBENV_DIR", "RBENV_VERSION", "RBENV_ROOT", "RBENV_HOOK_PATH"];

/// Wrap `command` in `rbenv exec` with any inherited rbenv selection cleared,
/// so the application's own `.ruby-version` applies.
pub fn rbenv_exec(command: &str) -> String {
    let unset: Vec<String> = RBENV_VARS.iter().map(|var| format!("unset {var};")).collect();
    format!("{} rbenv exec {command}", unset.join(" "))
}

/// Render and run template steps in order; the first failure stops.
fn run_steps(ctx: &ActionContext<'_>, steps: &[String], rbenv: bool) -> Result<()> {
    if steps.is_empty() {
        return Ok(());
    }
    let vars = ctx.template_vars();
    for step in steps {
        let command = template::render(step, &vars)?;
        if rbenv {
            ctx.run(&rbenv_exec(&command))?;
        } else {
            ctx.run(&command)?;
        }
    }
    Ok(())
}

/// Runs each rendered template step in order; the first failure stops the command.
#[derive(Debug, Clone)]
pub struct ShellAction {
    steps: Vec<String>,
    rbenv: bool,
}

impl ShellAction {
    pub fn new(steps: Vec<String>) -> Self {
        Self {
            steps,
            rbenv: false,
        }
    }

    /// Run every step through [`rbenv_exec`].
    pub fn under_rbenv(mut self, rbenv: bool) -> Self {
        self.rbenv = rbenv;
        self
    }
}

impl Action for ShellAction {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<()> {
        run_steps(ctx, &self.steps, self.rbenv)
    }
}

/// Regex substitutions over a fixed set of files.
///
/// When a file changed, the `post_patch` steps run (for example regenerating a
/// lock file), then the changed files plus any tracked `stage_if_tracked` files
/// are committed if a commit message is configured.
#[derive(Debug, Clone)]
pub struct PatchAction {
    files: Vec<String>,
    replacements: Vec<(Regex, String)>,
    commit_message: Option<String>,
    post_patch: Vec<String>,
    stage_if_tracked: Vec<String>,
    rbenv: bool,
}

impl PatchAction {
    pub fn new(files: Vec<String>) -> Self {
        Self {
            files,
            replacements: Vec::new(),
            commit_message: None,
            post_patch: Vec::new(),
            stage_if_tracked: Vec::new(),
            rbenv: false,
        }
    }

    pub fn post_patch(mut self, steps: Vec<String>) -> Self {
        self.post_patch = steps;
        self
    }

    /// Extra files staged with the commit, but only if git already tracks them.
    pub fn stage_if_tracked(mut self, files: Vec<String>) -> Self {
        self.stage_if_tracked = files;
        self
    }

    /// Run `post_patch` steps through [`rbenv_exec`].
    pub fn under_rbenv(mut self, rbenv: bool) -> Self {
        self.rbenv = rbenv;
        self
    }

    pub fn replace(mut self, pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let re = Regex::new(pattern).with_context(|| format!("compile pattern `{pattern}`"))?;
        self.replacements.push((re, replacement.into()));
        Ok(self)
    }

    pub fn commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }
}

impl Action for PatchAction {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let transform = |content: &str| apply_replacements(content, &self.replacements);
        let mut changed = Vec::new();
        for file in &self.files {
            if ctx.patch_file(file, &transform)? {
                changed.push(file.as_str());
            }
        }
        if changed.is_empty() {
            debug!(app = ctx.application.key(), "no files changed");
            return Ok(());
        }
        info!(app = ctx.application.key(), files = ?changed, "patched");
        run_steps(ctx, &self.post_patch, self.rbenv)?;
        let Some(message) = &self.commit_message else {
            return Ok(());
        };
        let git = ctx.git();
        for file in &self.stage_if_tracked {
            if git.is_tracked(Path::new(file))? {
                changed.push(file.as_str());
            } else {
                debug!(file = %file, "not tracked, left unstaged");
            }
        }
        stage_and_commit(&git, &changed, message)
    }
}

/// Rewrites dependency coordinates in build files and commits the result.
#[derive(Debug, Clone)]
pub struct DependencyBumpAction {
    name: String,
    rewrites: Vec<CoordinateRewrite>,
    moves_coordinates: bool,
}

/// Declarative description of a dependency update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySpec {
    /// Human name used in commit messages; defaults to the first artifact's group.
    pub name: Option<String>,
    pub artifacts: Vec<String>,
    pub target_version: String,
    /// Only these versions are replaced; empty means any version.
    pub source_versions: Vec<String>,
    /// `(from, to)` coordinate moves, applied with `target_version`.
    pub moves: Vec<(String, String)>,
}

impl DependencyBumpAction {
    pub fn new(spec: &DependencySpec) -> Result<Self> {
        if spec.target_version.trim().is_empty() {
            return Err(ZimError::InvalidDefinition {
                what: "dependency".to_string(),
                reason: "target_version must be non-empty".to_string(),
            }
            .into());
        }
        let first = spec
            .artifacts
            .first()
            .or_else(|| spec.moves.first().map(|(from, _)| from))
            .ok_or_else(|| ZimError::InvalidDefinition {
                what: "dependency".to_string(),
                reason: "at least one artifact or move is required".to_string(),
            })?;
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| coordinate_group(first).to_string());

        let mut rewrites = Vec::new();
        for artifact in &spec.artifacts {
            rewrites.push(CoordinateRewrite::version_bump(
                artifact,
                &spec.source_versions,
                &spec.target_version,
            )?);
        }
        for (from, to) in &spec.moves {
            rewrites.push(CoordinateRewrite::new(
                from,
                &spec.source_versions,
                to,
                &spec.target_version,
            )?);
        }
        Ok(Self {
            name,
            rewrites,
            moves_coordinates: !spec.moves.is_empty(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn commit_message(&self) -> String {
        if self.moves_coordinates {
            format!("Update the {} dependency coordinates.", self.name)
        } else {
            format!("Update the {} dependency.", self.name)
        }
    }
}

impl Action for DependencyBumpAction {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let transform = |content: &str| {
            self.rewrites
                .iter()
                .fold(content.to_string(), |acc, rewrite| rewrite.apply(&acc))
        };
        let mut changed = Vec::new();
        for file in DEPENDENCY_FILES {
            if ctx.patch_file(file, &transform)? {
                changed.push(*file);
            }
        }
        if changed.is_empty() {
            return Ok(());
        }
        stage_and_commit(&ctx.git(), &changed, &self.commit_message())?;
        info!(
            app = ctx.application.key(),
            "Updated the {} dependency in {}",
            self.name,
            ctx.application.key()
        );
        Ok(())
    }
}

fn stage_and_commit(git: &Git, files: &[&str], message: &str) -> Result<()> {
    for file in files {
        git.add(Path::new(file))?;
    }
    git.commit_staged(message)?;
    Ok(())
}

/// Command key generated for a dependency definition.
pub fn dependency_command_key(code: &str) -> String {
    format!("patch_{code}_dep")
}

/// `braid update` for a vendored path, when the application has it.
///
/// A failed update is retried once after dropping the path's braid remote,
/// which braid leaves behind when a previous update was interrupted.
#[derive(Debug, Clone)]
pub struct BraidUpdateAction {
    path: String,
}

impl BraidUpdateAction {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Action for BraidUpdateAction {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let key = ctx.application.key();
        if !ctx.workdir.join(&self.path).exists() {
            debug!(app = key, path = %self.path, "braid path absent");
            return Ok(());
        }
        let update = rbenv_exec(&format!("braid update {}", shell_quote(&self.path)));
        if let Err(err) = ctx.run(&update) {
            warn!(app = key, path = %self.path, "braid update failed, retrying: {err:#}");
            let remote = shell_quote(&format!("master/braid/{}", self.path));
            ctx.services
                .shell
                .probe(&format!("git remote rm {remote}"), ctx.workdir)?;
            ctx.run(&update)?;
        }
        info!(app = key, "Upgraded {} in {key}", self.path);
        Ok(())
    }
}

/// `braid diff` for a vendored path, when the application has it.
#[derive(Debug, Clone)]
pub struct BraidDiffAction {
    path: String,
}

impl BraidDiffAction {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Action for BraidDiffAction {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let key = ctx.application.key();
        if !ctx.workdir.join(&self.path).exists() {
            debug!(app = key, path = %self.path, "braid path absent");
            return Ok(());
        }
        println!("Braid Diff {} in {key}", self.path);
        ctx.run(&rbenv_exec(&format!("braid diff {}", shell_quote(&self.path))))
    }
}

/// The `braid_update_<key>` and `braid_diff_<key>` commands for `path`.
pub fn braid_commands(key: &str, path: &str) -> [Command; 2] {
    [
        Command::new(format!("braid_update_{key}"), BraidUpdateAction::new(path))
            .description(format!("Braid update {path}")),
        Command::new(format!("braid_diff_{key}"), BraidDiffAction::new(path))
            .description(format!("Braid diff {path}")),
    ]
}

/// Local commits not yet upstream, headed by application and branch.
/// `None` when there are none.
fn unpushed_report(git: &Git, app: &str) -> Result<Option<String>> {
    let log = git.unpushed_log()?;
    if log.trim().is_empty() {
        return Ok(None);
    }
    let heading = match git.current_branch()? {
        Some(branch) => format!("{app} ({branch})"),
        None => app.to_string(),
    };
    Ok(Some(format!("{heading}:\n{}", log.trim_end())))
}

struct CloneAction;

impl Action for CloneAction {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let dest = ctx.app_dir();
        if dest.exists() {
            debug!(dir = %dest.display(), "already cloned");
            return Ok(());
        }
        let url = ctx
            .application
            .remote_url(ctx.source_tree)
            .ok_or_else(|| {
                anyhow!(
                    "no remote for application '{}'; set git_url or the source tree's base_git_url",
                    ctx.application.key()
                )
            })?;
        info!(app = ctx.application.key(), url = %url, "cloning");
        Git::clone_into(&url, &dest)?;
        Ok(())
    }
}

/// Register `clone`, `fetch`, `reset`, `push` and `diff` unless already defined.
pub fn register_builtins(registry: &mut CommandRegistry) -> Result<(), ZimError> {
    let builtins = [
        Command::new("clone", CloneAction)
            .description("Clone applications that are not checked out yet")
            .in_source_tree_dir(),
        Command::from_fn("fetch", |ctx| ctx.git().fetch())
            .description("Fetch and prune from the remote"),
        Command::from_fn("reset", |ctx| ctx.git().reset_to_upstream())
            .description("Hard reset to the upstream branch and remove untracked files"),
        Command::from_fn("push", |ctx| ctx.git().push()).description("Push local commits"),
        Command::from_fn("diff", |ctx| {
            if let Some(report) = unpushed_report(&ctx.git(), ctx.application.key())? {
                println!("{report}");
            }
            Ok(())
        })
        .description("Show local commits that are not upstream"),
    ];
    for command in builtins {
        if registry.contains(command.key()) {
            debug!(command = command.key(), "built-in overridden");
            continue;
        }
        registry.register(command)?;
    }
    Ok(())
}
