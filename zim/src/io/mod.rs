//! Side-effecting collaborators: shell, git, file patching, templates and
//! the registry file.

pub mod git;
pub mod patch;
pub mod registry_file;
pub mod shell;
pub mod template;
