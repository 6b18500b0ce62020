//! zim: run named commands across the applications of a source tree.
//!
//! Reads the registry from `zim.toml` (or `--config`), layers command-line
//! flags over the file's settings, and hands the run to the driver.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser};
use tracing::debug;

use zim::command::{CommandRegistry, Services};
use zim::config::{Configuration, LogLevel, SelectionMode};
use zim::driver::{Driver, Invocation};
use zim::error::ZimError;
use zim::exit_codes;
use zim::io::registry_file::{DEFAULT_REGISTRY_FILE, Registry, Settings, load_registry};
use zim::logging;

#[derive(Parser, Debug)]
#[command(
    name = "zim",
    version,
    about = "Run named commands across a fleet of application checkouts",
    disable_help_flag = true
)]
struct Cli {
    /// Commands to run, in order, for every selected application.
    #[arg(value_name = "COMMAND")]
    commands: Vec<String>,

    /// Source tree whose applications are processed.
    #[arg(short = 's', long = "source-tree-set", value_name = "SET")]
    source_tree: Option<String>,

    /// Skip applications before this one (resume an interrupted run).
    #[arg(long, value_name = "APP")]
    first_app: Option<String>,

    /// Only run in-application commands for checkouts with unpushed commits.
    #[arg(short = 'c', long, conflicts_with = "unchanged")]
    changed: bool,

    /// Only run in-application commands for checkouts without unpushed commits.
    #[arg(long)]
    unchanged: bool,

    /// Require this tag (repeatable).
    #[arg(long = "include", value_name = "TAG", action = ArgAction::Append)]
    include: Vec<String>,

    /// Reject applications carrying this tag (repeatable).
    #[arg(long = "exclude", value_name = "TAG", action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Shell command that must exit zero inside the application directory (repeatable).
    #[arg(long = "filter", value_name = "COMMAND", action = ArgAction::Append)]
    filter: Vec<String>,

    #[arg(short = 'v', long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short = 'q', long)]
    quiet: bool,

    /// Directory under which source trees are checked out.
    #[arg(short = 'd', long, value_name = "DIR")]
    base_directory: Option<PathBuf>,

    /// Registry file (default: ./zim.toml when present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print help and the available commands.
    #[arg(short = 'h', long)]
    help: bool,
}

fn main() {
    let raw: Vec<OsString> = std::env::args_os().collect();
    let cli = match Cli::try_parse_from(&raw) {
        Ok(cli) => cli,
        Err(err) => std::process::exit(usage_exit(&err)),
    };
    if let Err(err) = run(&cli, &Invocation::from_os_args(raw)) {
        std::process::exit(report(&err));
    }
}

/// Print a clap parse outcome. `--version` succeeds; usage errors are invalid input.
fn usage_exit(err: &clap::Error) -> i32 {
    let _ = err.print();
    if err.use_stderr() {
        exit_codes::INVALID
    } else {
        exit_codes::OK
    }
}

fn run(cli: &Cli, invocation: &Invocation) -> Result<()> {
    let registry = load(cli.config.as_deref())?;

    if cli.help {
        print!("{}", help_text(&registry.commands));
        return Ok(());
    }

    let config = build_configuration(cli, &registry.settings)?;
    logging::init(config.log_level());

    let driver = Driver::new(
        &registry.repository,
        &registry.commands,
        &config,
        Services::system(),
    );
    let summary = driver.run(&cli.commands, invocation)?;
    debug!(
        processed = summary.processed.len(),
        skipped = summary.skipped.len(),
        executed = summary.executed,
        skipped_invocations = summary.skipped_invocations,
        "run complete"
    );
    Ok(())
}

/// Print `err` and pick the exit code for it.
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ZimError>() {
        Some(failed) if failed.is_execution_failure() => {
            eprintln!("{failed}");
            exit_codes::COMMAND_FAILED
        }
        _ => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    }
}

fn load(explicit: Option<&Path>) -> Result<Registry> {
    if let Some(path) = explicit {
        return load_registry(path);
    }
    let default = Path::new(DEFAULT_REGISTRY_FILE);
    if default.exists() {
        load_registry(default)
    } else {
        Registry::empty()
    }
}

/// File settings first, then command-line flags.
fn build_configuration(cli: &Cli, settings: &Settings) -> Result<Configuration> {
    let mut config = Configuration::new();

    if let Some(base) = cli.base_directory.as_ref().or(settings.base_directory.as_ref()) {
        config.set_base_directory(absolute(base)?);
    }
    if let Some(tree) = cli.source_tree.as_ref().or(settings.source_tree.as_ref()) {
        config.set_source_tree(tree.as_str());
    }

    let mut level = settings.log_level.unwrap_or_default();
    if cli.verbose {
        level = LogLevel::Verbose;
    } else if cli.quiet {
        level = LogLevel::Quiet;
    }
    config.set_log_level(level);

    if let Some(first_app) = &cli.first_app {
        config.set_first_app(first_app.as_str());
    }
    let mode = if cli.changed {
        SelectionMode::OnlyChanged
    } else if cli.unchanged {
        SelectionMode::OnlyUnchanged
    } else {
        SelectionMode::All
    };
    config.set_selection_mode(mode);

    for tag in &cli.include {
        config.include_tag(tag.as_str());
    }
    for tag in &cli.exclude {
        config.exclude_tag(tag.as_str());
    }
    for filter in &cli.filter {
        config.add_filter(filter.as_str());
    }
    Ok(config)
}

/// Resolve a relative path against the current directory. Empty stays empty
/// so the configuration reports it as unset.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() || path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("read current directory")?;
    Ok(cwd.join(path))
}

fn help_text(commands: &CommandRegistry) -> String {
    let mut text = Cli::command().render_help().to_string();
    text.push_str("\nCommands:\n");
    for line in commands.listing() {
        text.push_str(&format!("  * {line}\n"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use zim::command::Command;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn parse_commands_and_flags() {
        let cli = Cli::parse_from([
            "zim",
            "-s",
            "demo",
            "--first-app",
            "beta",
            "--include",
            "java",
            "--include",
            "service",
            "--filter",
            "test -f pom.xml",
            "fetch",
            "push",
        ]);
        assert_eq!(cli.commands, vec!["fetch", "push"]);
        assert_eq!(cli.source_tree.as_deref(), Some("demo"));
        assert_eq!(cli.first_app.as_deref(), Some("beta"));
        assert_eq!(cli.include, vec!["java", "service"]);
        assert_eq!(cli.filter, vec!["test -f pom.xml"]);
    }

    #[test]
    fn changed_and_unchanged_conflict() {
        assert!(Cli::try_parse_from(["zim", "--changed", "--unchanged", "fetch"]).is_err());
        assert!(Cli::try_parse_from(["zim", "-v", "-q", "fetch"]).is_err());
    }

    #[test]
    fn usage_errors_exit_invalid_and_version_exits_ok() {
        let err = Cli::try_parse_from(["zim", "--bogus", "fetch"]).expect_err("unknown flag");
        assert_eq!(usage_exit(&err), exit_codes::INVALID);

        let err = Cli::try_parse_from(["zim", "--version"]).expect_err("version");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        assert_eq!(usage_exit(&err), exit_codes::OK);
    }

    #[test]
    fn flags_override_file_settings() {
        let file = Settings {
            base_directory: Some(PathBuf::from("/from/file")),
            source_tree: Some("file-tree".to_string()),
            log_level: Some(LogLevel::Quiet),
            builtin_commands: true,
        };
        let cli = Cli::parse_from(["zim", "-d", "/from/cli", "-v", "--changed", "fetch"]);
        let config = build_configuration(&cli, &file).expect("config");
        assert_eq!(config.base_directory().expect("base"), Path::new("/from/cli"));
        assert_eq!(config.source_tree().expect("tree"), "file-tree");
        assert_eq!(config.log_level(), LogLevel::Verbose);
        assert_eq!(config.selection_mode(), SelectionMode::OnlyChanged);
    }

    #[test]
    fn relative_base_directory_is_made_absolute() {
        let cli = Cli::parse_from(["zim", "-d", "checkouts", "fetch"]);
        let config = build_configuration(&cli, &settings()).expect("config");
        let base = config.base_directory().expect("base");
        assert!(base.is_absolute());
        assert!(base.ends_with("checkouts"));
    }

    #[test]
    fn empty_base_directory_stays_unset() {
        let file = Settings {
            base_directory: Some(PathBuf::new()),
            ..Settings::default()
        };
        let cli = Cli::parse_from(["zim", "fetch"]);
        let config = build_configuration(&cli, &file).expect("config");
        assert!(matches!(
            config.base_directory(),
            Err(ZimError::BaseDirectoryUndefined)
        ));
    }

    #[test]
    fn help_lists_commands_sorted() {
        let mut registry = CommandRegistry::new();
        registry
            .register(Command::from_fn("push", |_ctx| Ok(())).description("Push commits"))
            .expect("push");
        registry
            .register(Command::from_fn("fetch", |_ctx| Ok(())))
            .expect("fetch");
        let text = help_text(&registry);
        assert!(text.contains("Usage:"));
        assert!(text.ends_with("Commands:\n  * fetch: fetch\n  * push: Push commits\n"));
    }
}
