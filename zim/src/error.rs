//! Error taxonomy for registry definition, configuration and execution.
//!
//! Definition errors are raised while the registry is being built, before any
//! run starts. Configuration errors are raised by the driver's init phase.
//! Ineligibility is never an error, but a filter that cannot be evaluated is.
//! Both execution errors, `SelectionFailed` and `CommandFailed`, carry the
//! command line that resumes the interrupted run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZimError {
    #[error("attempting to register duplicate source tree with key '{key}'")]
    DuplicateSourceTree { key: String },

    #[error(
        "attempting to register duplicate application definition with key '{key}' in source tree '{tree}'"
    )]
    DuplicateApplication { tree: String, key: String },

    #[error("attempting to define duplicate command '{key}'")]
    DuplicateCommand { key: String },

    #[error("bad source tree set '{key}' specified. Specify one of:\n{}", bullet_list(.available))]
    SourceTreeNotFound { key: String, available: Vec<String> },

    #[error("unable to locate application definition by key '{key}' in source tree '{tree}'")]
    ApplicationNotFound { tree: String, key: String },

    #[error("unknown command specified: {key}. Specify one of:\n{}", bullet_list(.available))]
    UnknownCommand { key: String, available: Vec<String> },

    #[error("no commands specified. Specify one of:\n{}", bullet_list(.available))]
    NoCommandsSpecified { available: Vec<String> },

    #[error("invalid {field} '{value}', expected one of {expected:?}")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static [&'static str],
    },

    #[error("invalid {what}: {reason}")]
    InvalidDefinition { what: String, reason: String },

    #[error(
        "no base directory defined. Set settings.base_directory in the registry file or pass --base-directory DIR"
    )]
    BaseDirectoryUndefined,

    #[error("no source tree set. Set one by passing --source-tree-set SET")]
    SourceTreeUndefined,

    #[error(
        "Error processing stage {command} on application '{application}'.\nFix the problem and rerun the command via:\n {resume_command}"
    )]
    CommandFailed {
        command: String,
        application: String,
        resume_command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "Error selecting application '{application}'.\nFix the problem and rerun the command via:\n {resume_command}"
    )]
    SelectionFailed {
        application: String,
        resume_command: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ZimError {
    /// True for errors raised while the run was iterating applications.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            ZimError::CommandFailed { .. } | ZimError::SelectionFailed { .. }
        )
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  * {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tree_not_found_lists_valid_keys() {
        let err = ZimError::SourceTreeNotFound {
            key: "nope".to_string(),
            available: vec!["alpha".to_string(), "beta".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'nope'"));
        assert!(msg.contains("  * alpha\n  * beta"));
    }

    #[test]
    fn command_failed_carries_resume_line_and_source() {
        let err = ZimError::CommandFailed {
            command: "fetch".to_string(),
            application: "beta".to_string(),
            resume_command: "zim --first-app beta fetch".to_string(),
            source: anyhow::anyhow!("git fetch failed"),
        };
        let msg = err.to_string();
        assert!(msg.contains("stage fetch on application 'beta'"));
        assert!(msg.contains("zim --first-app beta fetch"));
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "git fetch failed");
        assert!(err.is_execution_failure());
    }

    #[test]
    fn selection_failed_names_application() {
        let err = ZimError::SelectionFailed {
            application: "beta".to_string(),
            resume_command: "zim --first-app beta fetch".to_string(),
            source: anyhow::anyhow!("spawn sh"),
        };
        assert!(err.to_string().contains("selecting application 'beta'"));
        assert!(err.is_execution_failure());
        assert!(!ZimError::SourceTreeUndefined.is_execution_failure());
    }
}
