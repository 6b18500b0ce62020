//! Rebuild the command line that restarts an interrupted run.

const FIRST_APP_FLAG: &str = "--first-app";

/// Render `<program> --first-app <app> <args...>` with any previous
/// `--first-app` removed from `args`.
pub fn resume_command_line(program: &str, args: &[String], app: &str) -> String {
    let mut parts = vec![
        shell_quote(program),
        FIRST_APP_FLAG.to_string(),
        shell_quote(app),
    ];

    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == FIRST_APP_FLAG {
            skip_next = true;
            continue;
        }
        if arg
            .strip_prefix(FIRST_APP_FLAG)
            .is_some_and(|rest| rest.starts_with('='))
        {
            continue;
        }
        parts.push(shell_quote(arg));
    }

    parts.join(" ")
}

/// Quote `arg` for a POSIX shell when it contains anything but safe characters.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,@+%".contains(c));
    if safe {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
