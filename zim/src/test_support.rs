//! Fakes and fixtures for tests: a scripted shell, a fake change detector,
//! demo registries and a real git remote/clone pair.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::config::Configuration;
use crate::core::model::{ApplicationOptions, Repository, SourceTreeOptions};
use crate::io::git::ChangeDetector;
use crate::io::shell::ShellExecutor;

/// Records every `(command, cwd)` and fails the commands it was told to.
#[derive(Debug, Default)]
pub struct ScriptedShell {
    calls: RefCell<Vec<(String, PathBuf)>>,
    failing: BTreeSet<String>,
    failing_once: RefCell<BTreeSet<String>>,
    unavailable: BTreeSet<String>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` exit non-zero.
    pub fn fail_on(mut self, command: &str) -> Self {
        self.failing.insert(command.to_string());
        self
    }

    /// Make the first run of `command` exit non-zero; later runs succeed.
    pub fn fail_once(self, command: &str) -> Self {
        self.failing_once.borrow_mut().insert(command.to_string());
        self
    }

    /// Make `command` fail to spawn at all.
    pub fn unavailable(mut self, command: &str) -> Self {
        self.unavailable.insert(command.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.borrow().clone()
    }

    /// Commands only, in call order.
    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(cmd, _)| cmd.clone()).collect()
    }

    fn record(&self, command: &str, cwd: &Path) -> Result<bool> {
        self.calls
            .borrow_mut()
            .push((command.to_string(), cwd.to_path_buf()));
        if self.unavailable.contains(command) {
            return Err(anyhow!("cannot spawn: {command}"));
        }
        if self.failing_once.borrow_mut().remove(command) {
            return Ok(false);
        }
        Ok(!self.failing.contains(command))
    }
}

impl ShellExecutor for ScriptedShell {
    fn run(&self, command: &str, cwd: &Path) -> Result<()> {
        if self.record(command, cwd)? {
            Ok(())
        } else {
            Err(anyhow!("scripted failure: {command}"))
        }
    }

    fn probe(&self, command: &str, cwd: &Path) -> Result<bool> {
        self.record(command, cwd)
    }
}

/// Reports unpushed changes for a fixed set of directories.
#[derive(Debug, Default)]
pub struct FakeChanges {
    changed: BTreeSet<PathBuf>,
}

impl FakeChanges {
    pub fn with_changed(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            changed: dirs.into_iter().collect(),
        }
    }
}

impl ChangeDetector for FakeChanges {
    fn has_unpushed_changes(&self, app_dir: &Path) -> Result<bool> {
        Ok(self.changed.contains(app_dir))
    }
}

/// Source tree `demo` holding untagged `apps`, plus a configuration that
/// selects it with `base` as the base directory.
pub fn demo_repository(base: &Path, apps: &[&str]) -> (Repository, Configuration) {
    let tagged: Vec<(&str, &[&str])> = apps.iter().map(|app| (*app, &[] as &[&str])).collect();
    tagged_repository(base, &tagged)
}

/// Like [`demo_repository`], with tags per application.
pub fn tagged_repository(base: &Path, apps: &[(&str, &[&str])]) -> (Repository, Configuration) {
    let mut repository = Repository::new();
    let tree = repository
        .define_source_tree("demo", SourceTreeOptions::default())
        .expect("define demo source tree");
    for (key, tags) in apps {
        tree.define_application(
            key,
            ApplicationOptions {
                git_url: None,
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
            },
        )
        .expect("define application");
    }
    let mut config = Configuration::new();
    config.set_base_directory(base).set_source_tree("demo");
    (repository, config)
}

/// A bare "remote" repository with one commit, and a clone of it laid out
/// as application [`GitFixture::APP_KEY`] of source tree `demo`.
pub struct GitFixture {
    _temp: TempDir,
    root: PathBuf,
    clone_dir: PathBuf,
}

impl GitFixture {
    pub const APP_KEY: &'static str = "remote";

    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create fixture dir")?;
        let root = temp.path().to_path_buf();

        let seed = root.join("seed");
        fs::create_dir_all(&seed).context("create seed repo")?;
        run_git(&seed, &["init", "--quiet"])?;
        fs::write(seed.join("README.md"), "# remote\n").context("write README.md")?;
        run_git(&seed, &["add", "README.md"])?;
        run_git(
            &seed,
            &[
                "-c",
                "user.name=zim",
                "-c",
                "user.email=zim@example.com",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "-m",
                "initial",
            ],
        )?;
        run_git(&root, &["clone", "--quiet", "--bare", "seed", "remote.git"])?;

        let clone_dir = root.join("base").join("demo").join(Self::APP_KEY);
        let parent = clone_dir
            .parent()
            .ok_or_else(|| anyhow!("clone dir has no parent"))?;
        fs::create_dir_all(parent).context("create clone parent")?;
        let remote = root.join("remote.git");
        run_git(
            &root,
            &[
                "clone",
                "--quiet",
                &remote.to_string_lossy(),
                &clone_dir.to_string_lossy(),
            ],
        )?;
        run_git(&clone_dir, &["config", "user.name", "zim"])?;
        run_git(&clone_dir, &["config", "user.email", "zim@example.com"])?;
        run_git(&clone_dir, &["config", "commit.gpgsign", "false"])?;

        Ok(Self {
            _temp: temp,
            root,
            clone_dir,
        })
    }

    /// Working copy of the application.
    pub fn clone_dir(&self) -> &Path {
        &self.clone_dir
    }

    /// Run git inside the working copy and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.clone_dir, args)
    }

    /// Write and commit a file locally without pushing.
    pub fn commit_file(&self, name: &str, contents: &str) -> Result<()> {
        fs::write(self.clone_dir.join(name), contents)
            .with_context(|| format!("write {name}"))?;
        self.git(&["add", name])?;
        self.git(&["commit", "--quiet", "-m", &format!("add {name}")])?;
        Ok(())
    }

    pub fn push(&self) -> Result<()> {
        self.git(&["push", "--quiet"])?;
        Ok(())
    }

    /// Registry whose single application is the working copy.
    pub fn repository(&self) -> (Repository, Configuration) {
        self.repository_at(&self.root.join("base"))
    }

    /// Registry pointing at the fixture remote, with `base` as base directory.
    pub fn repository_at(&self, base: &Path) -> (Repository, Configuration) {
        let mut repository = Repository::new();
        let tree = repository
            .define_source_tree(
                "demo",
                SourceTreeOptions {
                    directory: None,
                    base_git_url: Some(self.root.display().to_string()),
                },
            )
            .expect("define demo source tree");
        tree.define_application(Self::APP_KEY, ApplicationOptions::default())
            .expect("define application");
        let mut config = Configuration::new();
        config.set_base_directory(base).set_source_tree("demo");
        (repository, config)
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
