//! Stable exit codes for the zim CLI.

/// Run completed, or help was printed.
pub const OK: i32 = 0;
/// Invalid registry file, incomplete configuration, unknown or missing commands.
pub const INVALID: i32 = 1;
/// A command failed for an application; the resume line was printed.
pub const COMMAND_FAILED: i32 = 2;
