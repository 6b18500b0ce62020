//! Load the declarative registry (settings, source trees, commands) from TOML.
//!
//! Every table rejects unknown keys, so a misspelled property fails at load
//! time rather than being silently ignored.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::actions::{
    DependencyBumpAction, DependencySpec, PatchAction, ShellAction, braid_commands,
    dependency_command_key, register_builtins,
};
use crate::command::{Command, CommandRegistry, DirectoryScope};
use crate::config::LogLevel;
use crate::core::model::{ApplicationOptions, Repository, SourceTreeOptions};
use crate::error::ZimError;

/// Default registry file name, looked up in the current directory.
pub const DEFAULT_REGISTRY_FILE: &str = "zim.toml";

fn default_true() -> bool {
    true
}

/// `[settings]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub base_directory: Option<PathBuf>,
    pub source_tree: Option<String>,
    pub log_level: Option<LogLevel>,
    #[serde(default = "default_true")]
    pub builtin_commands: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_directory: None,
            source_tree: None,
            log_level: None,
            builtin_commands: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    source_tree: Vec<SourceTreeEntry>,
    #[serde(default)]
    command: Vec<CommandEntry>,
    #[serde(default)]
    dependency: Vec<DependencyEntry>,
    #[serde(default)]
    braid: Vec<BraidEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceTreeEntry {
    key: String,
    directory: Option<String>,
    base_git_url: Option<String>,
    #[serde(default)]
    application: Vec<ApplicationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplicationEntry {
    key: String,
    git_url: Option<String>,
    #[serde(default)]
    tags: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandEntry {
    key: String,
    description: Option<String>,
    #[serde(default = "default_true")]
    in_app_dir: bool,
    /// Run shell and post-patch steps under `rbenv exec`.
    #[serde(default)]
    rbenv: bool,
    shell: Option<Vec<String>>,
    patch: Option<PatchEntry>,
    dependency: Option<DependencyBody>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatchEntry {
    files: Vec<String>,
    commit_message: Option<String>,
    #[serde(default)]
    replace: Vec<ReplaceEntry>,
    #[serde(default)]
    post_patch: Vec<String>,
    #[serde(default)]
    stage_if_tracked: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReplaceEntry {
    pattern: String,
    replacement: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DependencyBody {
    name: Option<String>,
    #[serde(default)]
    artifacts: Vec<String>,
    target_version: String,
    #[serde(default)]
    source_versions: Vec<String>,
    #[serde(default)]
    moves: BTreeMap<String, String>,
}

impl DependencyBody {
    fn into_spec(self) -> DependencySpec {
        DependencySpec {
            name: self.name,
            artifacts: self.artifacts,
            target_version: self.target_version,
            source_versions: self.source_versions,
            moves: self.moves.into_iter().collect(),
        }
    }
}

/// `[[dependency]]` sugar: defines the command `patch_<code>_dep`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DependencyEntry {
    code: String,
    name: Option<String>,
    artifacts: Vec<String>,
    target_version: String,
    #[serde(default)]
    source_versions: Vec<String>,
}

impl DependencyEntry {
    fn spec(&self) -> DependencySpec {
        DependencySpec {
            name: self.name.clone(),
            artifacts: self.artifacts.clone(),
            target_version: self.target_version.clone(),
            source_versions: self.source_versions.clone(),
            moves: Vec::new(),
        }
    }
}

/// `[[braid]]` sugar: defines `braid_update_<key>` and `braid_diff_<key>`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BraidEntry {
    key: String,
    path: String,
}

/// Everything a registry file defines.
#[derive(Debug)]
pub struct Registry {
    pub repository: Repository,
    pub commands: CommandRegistry,
    pub settings: Settings,
}

impl Registry {
    /// Registry with no source trees and only the built-in commands.
    pub fn empty() -> Result<Self> {
        build(RegistryFile::default())
    }
}

pub fn load_registry(path: &Path) -> Result<Registry> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read registry file {}", path.display()))?;
    parse_registry(&raw).with_context(|| format!("load registry file {}", path.display()))
}

pub fn parse_registry(raw: &str) -> Result<Registry> {
    let file: RegistryFile = toml::from_str(raw).context("parse registry toml")?;
    build(file)
}

fn build(file: RegistryFile) -> Result<Registry> {
    let mut repository = Repository::new();
    for tree in file.source_tree {
        let defined = repository.define_source_tree(
            &tree.key,
            SourceTreeOptions {
                directory: tree.directory,
                base_git_url: tree.base_git_url,
            },
        )?;
        for app in tree.application {
            defined.define_application(
                &app.key,
                ApplicationOptions {
                    git_url: app.git_url,
                    tags: app.tags,
                },
            )?;
        }
    }

    let mut commands = CommandRegistry::new();
    for entry in file.command {
        commands.register(command_from_entry(entry)?)?;
    }
    for entry in file.dependency {
        let key = dependency_command_key(&entry.code);
        let action = DependencyBumpAction::new(&entry.spec())
            .with_context(|| format!("dependency '{}'", entry.code))?;
        let description = format!("Update the {} dependency", action.name());
        commands.register(Command::new(key, action).description(description))?;
    }
    for entry in file.braid {
        for command in braid_commands(&entry.key, &entry.path) {
            commands.register(command)?;
        }
    }
    if file.settings.builtin_commands {
        register_builtins(&mut commands)?;
    }
    debug!(
        source_trees = repository.source_tree_keys().len(),
        commands = commands.keys().count(),
        "registry loaded"
    );

    Ok(Registry {
        repository,
        commands,
        settings: file.settings,
    })
}

fn command_from_entry(entry: CommandEntry) -> Result<Command> {
    let invalid = |reason: &str| ZimError::InvalidDefinition {
        what: format!("command '{}'", entry.key),
        reason: reason.to_string(),
    };
    let command = match (entry.shell, entry.patch, entry.dependency) {
        (Some(steps), None, None) => {
            if steps.is_empty() {
                return Err(invalid("shell must list at least one step").into());
            }
            Command::new(&entry.key, ShellAction::new(steps).under_rbenv(entry.rbenv))
        }
        (None, Some(patch), None) => {
            let mut action = PatchAction::new(patch.files)
                .post_patch(patch.post_patch)
                .stage_if_tracked(patch.stage_if_tracked)
                .under_rbenv(entry.rbenv);
            for replace in patch.replace {
                action = action.replace(&replace.pattern, replace.replacement)?;
            }
            if let Some(message) = patch.commit_message {
                action = action.commit_message(message);
            }
            Command::new(&entry.key, action)
        }
        (None, None, Some(_)) if entry.rbenv => {
            return Err(invalid("rbenv applies to shell and patch commands only").into());
        }
        (None, None, Some(dependency)) => {
            Command::new(&entry.key, DependencyBumpAction::new(&dependency.into_spec())?)
        }
        _ => {
            return Err(invalid("exactly one of shell, patch or dependency is required").into());
        }
    };
    let command = if entry.in_app_dir {
        command.scope(DirectoryScope::Application)
    } else {
        command.scope(DirectoryScope::SourceTree)
    };
    Ok(match entry.description {
        Some(description) => command.description(description),
        None => command,
    })
}
