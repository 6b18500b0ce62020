//! Driver-level scenarios: ordering, selection gates, resume and failure
//! propagation, using the scripted collaborators from `test_support`.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use zim::command::{Command, CommandRegistry, Services};
use zim::config::SelectionMode;
use zim::driver::{Driver, Invocation};
use zim::error::ZimError;
use zim::io::patch::FsPatcher;
use zim::selection::Exclusion;
use zim::test_support::{FakeChanges, ScriptedShell, demo_repository, tagged_repository};

type Log = Rc<RefCell<Vec<String>>>;

/// Command that appends `<label>:<app>` to `log`.
fn recording(key: &str, label: &'static str, log: &Log) -> Command {
    let log = Rc::clone(log);
    Command::from_fn(key, move |ctx| {
        log.borrow_mut()
            .push(format!("{label}:{}", ctx.application.key()));
        Ok(())
    })
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn end_to_end_records_applications_in_definition_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, config) = demo_repository(temp.path(), &["alpha", "beta"]);
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("print", "print", &log).in_source_tree_dir())
        .expect("register");

    let shell = ScriptedShell::new();
    let changes = FakeChanges::default();
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    let summary = Driver::new(&repository, &registry, &config, services)
        .run(&args(&["print"]), &Invocation::default())
        .expect("run");

    assert_eq!(*log.borrow(), vec!["print:alpha", "print:beta"]);
    assert_eq!(summary.processed, vec!["alpha", "beta"]);
    assert!(summary.skipped.is_empty());
}

#[test]
fn commands_run_in_command_line_order_per_application() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, config) = demo_repository(temp.path(), &["alpha", "beta"]);
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("first", "first", &log).in_source_tree_dir())
        .expect("first");
    registry
        .register(recording("second", "second", &log).in_source_tree_dir())
        .expect("second");

    let shell = ScriptedShell::new();
    let changes = FakeChanges::default();
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    Driver::new(&repository, &registry, &config, services)
        .run(&args(&["second", "first"]), &Invocation::default())
        .expect("run");

    assert_eq!(
        *log.borrow(),
        vec!["second:alpha", "first:alpha", "second:beta", "first:beta"]
    );
}

#[test]
fn resume_cursor_skips_earlier_applications() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, mut config) = demo_repository(temp.path(), &["app1", "app2", "app3"]);
    config.set_first_app("app2");
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("print", "print", &log).in_source_tree_dir())
        .expect("register");

    let shell = ScriptedShell::new();
    let changes = FakeChanges::default();
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    let summary = Driver::new(&repository, &registry, &config, services)
        .run(&args(&["print"]), &Invocation::default())
        .expect("run");

    assert_eq!(*log.borrow(), vec!["print:app2", "print:app3"]);
    assert_eq!(
        summary.skipped,
        vec![("app1".to_string(), Exclusion::BeforeResumeCursor)]
    );
}

#[test]
fn tag_gate_selects_applications() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, mut config) = tagged_repository(
        temp.path(),
        &[
            ("abc", &["a", "b", "c"][..]),
            ("ab", &["a", "b"][..]),
            ("a", &["a"][..]),
        ],
    );
    config.include_tag("a").include_tag("b").exclude_tag("c");
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("print", "print", &log).in_source_tree_dir())
        .expect("register");

    let shell = ScriptedShell::new();
    let changes = FakeChanges::default();
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    let summary = Driver::new(&repository, &registry, &config, services)
        .run(&args(&["print"]), &Invocation::default())
        .expect("run");

    assert_eq!(*log.borrow(), vec!["print:ab"]);
    assert_eq!(
        summary.skipped,
        vec![
            ("abc".to_string(), Exclusion::Tags),
            ("a".to_string(), Exclusion::Tags)
        ]
    );
}

#[test]
fn filters_run_in_each_application_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, mut config) = demo_repository(temp.path(), &["alpha", "beta"]);
    config.add_filter("test -f pom.xml");
    let layout = config.layout(&repository).expect("layout");
    for app in ["alpha", "beta"] {
        fs::create_dir_all(layout.application_directory(app)).expect("mkdir");
    }
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("print", "print", &log))
        .expect("register");

    let shell = ScriptedShell::new();
    let changes = FakeChanges::default();
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    Driver::new(&repository, &registry, &config, services)
        .run(&args(&["print"]), &Invocation::default())
        .expect("run");

    let calls = shell.calls();
    assert_eq!(
        calls,
        vec![
            (
                "test -f pom.xml".to_string(),
                layout.application_directory("alpha")
            ),
            (
                "test -f pom.xml".to_string(),
                layout.application_directory("beta")
            ),
        ]
    );
    assert_eq!(*log.borrow(), vec!["print:alpha", "print:beta"]);
}

#[test]
fn only_changed_skips_clean_applications_silently() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, mut config) = demo_repository(temp.path(), &["app1", "app2"]);
    config.set_selection_mode(SelectionMode::OnlyChanged);
    let layout = config.layout(&repository).expect("layout");
    for app in ["app1", "app2"] {
        fs::create_dir_all(layout.application_directory(app)).expect("mkdir");
    }
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("print", "print", &log))
        .expect("register");

    let shell = ScriptedShell::new();
    let changes = FakeChanges::with_changed([layout.application_directory("app1")]);
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    let summary = Driver::new(&repository, &registry, &config, services)
        .run(&args(&["print"]), &Invocation::default())
        .expect("run");

    assert_eq!(*log.borrow(), vec!["print:app1"]);
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.skipped_invocations, 1);
}

#[test]
fn failure_stops_run_and_reports_resume_line() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, config) = demo_repository(temp.path(), &["alpha", "beta", "gamma"]);
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("print", "print", &log).in_source_tree_dir())
        .expect("print");
    let explode_log = Rc::clone(&log);
    registry
        .register(
            Command::from_fn("explode", move |ctx| {
                let key = ctx.application.key();
                explode_log.borrow_mut().push(format!("explode:{key}"));
                if key == "beta" {
                    anyhow::bail!("boom in {key}");
                }
                Ok(())
            })
            .in_source_tree_dir(),
        )
        .expect("explode");

    let shell = ScriptedShell::new();
    let changes = FakeChanges::default();
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    let cwd_before = std::env::current_dir().expect("cwd");
    let invocation = Invocation::new("zim", args(&["-s", "demo", "print", "explode"]));
    let err = Driver::new(&repository, &registry, &config, services)
        .run(&args(&["print", "explode"]), &invocation)
        .expect_err("run fails");
    let cwd_after = std::env::current_dir().expect("cwd");

    assert_eq!(cwd_before, cwd_after);
    assert_eq!(
        *log.borrow(),
        vec!["print:alpha", "explode:alpha", "print:beta", "explode:beta"]
    );
    match err.downcast_ref::<ZimError>() {
        Some(ZimError::CommandFailed {
            command,
            application,
            resume_command,
            source,
        }) => {
            assert_eq!(command, "explode");
            assert_eq!(application, "beta");
            assert_eq!(resume_command, "zim --first-app beta -s demo print explode");
            assert_eq!(source.to_string(), "boom in beta");
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[test]
fn working_directory_is_unchanged_after_successful_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, config) = demo_repository(temp.path(), &["alpha"]);
    let layout = config.layout(&repository).expect("layout");
    fs::create_dir_all(layout.application_directory("alpha")).expect("mkdir");
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("in_app", "in_app", &log))
        .expect("in_app");
    registry
        .register(recording("in_tree", "in_tree", &log).in_source_tree_dir())
        .expect("in_tree");

    let shell = ScriptedShell::new();
    let changes = FakeChanges::default();
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    let cwd_before = std::env::current_dir().expect("cwd");
    Driver::new(&repository, &registry, &config, services)
        .run(&args(&["in_app", "in_tree"]), &Invocation::default())
        .expect("run");
    assert_eq!(std::env::current_dir().expect("cwd"), cwd_before);
}

#[test]
fn duplicate_registration_keeps_first_command() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (repository, config) = demo_repository(temp.path(), &["alpha"]);
    let log = Log::default();
    let mut registry = CommandRegistry::new();
    registry
        .register(recording("print", "first", &log).in_source_tree_dir())
        .expect("first");
    assert!(matches!(
        registry.register(recording("print", "second", &log).in_source_tree_dir()),
        Err(ZimError::DuplicateCommand { .. })
    ));

    let shell = ScriptedShell::new();
    let changes = FakeChanges::default();
    let services = Services {
        shell: &shell,
        patcher: &FsPatcher,
        changes: &changes,
    };
    Driver::new(&repository, &registry, &config, services)
        .run(&args(&["print"]), &Invocation::default())
        .expect("run");
    assert_eq!(*log.borrow(), vec!["first:alpha"]);
}
