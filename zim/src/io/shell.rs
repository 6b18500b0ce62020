//! Shell executor used by commands and external filters.
//!
//! Every call takes its working directory explicitly; the process-wide
//! current directory is never changed.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

pub trait ShellExecutor {
    /// Run `command` with inherited stdio. A non-zero exit is an error.
    fn run(&self, command: &str, cwd: &Path) -> Result<()>;

    /// Run `command` with captured output and report whether it exited zero.
    fn probe(&self, command: &str, cwd: &Path) -> Result<bool>;
}

/// Executes commands through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl SystemShell {
    fn command(command: &str, cwd: &Path) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        };
        cmd.current_dir(cwd);
        cmd
    }
}

impl ShellExecutor for SystemShell {
    #[instrument(skip_all, fields(dir = %cwd.display()))]
    fn run(&self, command: &str, cwd: &Path) -> Result<()> {
        debug!(command, "system");
        let status = Self::command(command, cwd)
            .stdin(Stdio::inherit())
            .status()
            .with_context(|| format!("spawn `{command}` in {}", cwd.display()))?;
        if !status.success() {
            warn!(command, exit_code = ?status.code(), "command failed");
            return Err(anyhow!(
                "error executing `{command}` in {} (exit status {:?})",
                cwd.display(),
                status.code()
            ));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(dir = %cwd.display()))]
    fn probe(&self, command: &str, cwd: &Path) -> Result<bool> {
        let output = Self::command(command, cwd)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawn `{command}` in {}", cwd.display()))?;
        debug!(
            command,
            exit_code = ?output.status.code(),
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "probe finished"
        );
        Ok(output.status.success())
    }
}
