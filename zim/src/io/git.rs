//! Git adapter for built-in commands and change detection.
//!
//! A thin wrapper around `git` subprocess calls, always bound to an explicit
//! working directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Clone `url` into `dest`, running from `dest`'s parent directory.
    #[instrument(skip_all, fields(url = %url, dest = %dest.display()))]
    pub fn clone_into(url: &str, dest: &Path) -> Result<Git> {
        let parent = dest
            .parent()
            .ok_or_else(|| anyhow!("clone destination {} has no parent", dest.display()))?;
        let dest_arg = dest.to_string_lossy();
        Git::new(parent).run_checked(&["clone", url, &dest_arg])?;
        Ok(Git::new(dest))
    }

    /// Checked-out branch, or `None` on a detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim();
        Ok((name != "HEAD").then(|| name.to_string()))
    }

    /// Remote-tracking branch of HEAD, or `None` when no upstream is configured.
    pub fn upstream(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])?;
        if !out.status.success() {
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }

    /// Number of local commits not present on the upstream branch.
    pub fn unpushed_commit_count(&self, upstream: &str) -> Result<usize> {
        let range = format!("{upstream}..HEAD");
        let out = self.run_capture(&["rev-list", "--count", &range])?;
        out.trim()
            .parse()
            .with_context(|| format!("parse rev-list count '{}'", out.trim()))
    }

    /// True if HEAD has commits that are absent upstream.
    ///
    /// A branch without an upstream has nothing pushed, so it counts as changed.
    #[instrument(skip_all, fields(dir = %self.workdir.display()))]
    pub fn has_unpushed_changes(&self) -> Result<bool> {
        let Some(upstream) = self.upstream()? else {
            warn!("no upstream branch configured");
            return Ok(true);
        };
        let count = self.unpushed_commit_count(&upstream)?;
        debug!(upstream = %upstream, count, "unpushed commits");
        Ok(count > 0)
    }

    /// Stage a path relative to the working directory.
    pub fn add(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.run_checked(&["add", "--", &path])?;
        Ok(())
    }

    /// True if git tracks `path`, relative to the working directory.
    pub fn is_tracked(&self, path: &Path) -> Result<bool> {
        let path = path.to_string_lossy();
        let out = self.run(&["ls-files", "--error-unmatch", "--", &path])?;
        Ok(out.status.success())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    pub fn fetch(&self) -> Result<()> {
        self.run_checked(&["fetch", "--prune"])?;
        Ok(())
    }

    pub fn push(&self) -> Result<()> {
        self.run_checked(&["push"])?;
        Ok(())
    }

    /// Discard local commits and untracked files, matching the upstream branch.
    #[instrument(skip_all, fields(dir = %self.workdir.display()))]
    pub fn reset_to_upstream(&self) -> Result<()> {
        let upstream = self
            .upstream()?
            .ok_or_else(|| anyhow!("no upstream branch in {}", self.workdir.display()))?;
        self.run_checked(&["reset", "--hard", &upstream])?;
        self.run_checked(&["clean", "-f", "-d", "-x"])?;
        Ok(())
    }

    /// One line per local commit not yet upstream.
    pub fn unpushed_log(&self) -> Result<String> {
        let Some(upstream) = self.upstream()? else {
            return self.run_capture(&["log", "--oneline"]);
        };
        let range = format!("{upstream}..HEAD");
        self.run_capture(&["log", "--oneline", &range])
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(dir = %self.workdir.display(), "git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Answers "does this checkout have local commits that are not upstream?".
pub trait ChangeDetector {
    fn has_unpushed_changes(&self, app_dir: &Path) -> Result<bool>;
}

/// Change detection backed by the checkout's remote-tracking branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitChangeDetector;

impl ChangeDetector for GitChangeDetector {
    fn has_unpushed_changes(&self, app_dir: &Path) -> Result<bool> {
        Git::new(app_dir).has_unpushed_changes()
    }
}
