//! Run named commands across a fleet of application checkouts.
//!
//! A registry groups applications into source trees. A run picks one source
//! tree and a list of command keys, then visits the tree's applications in
//! definition order and invokes each command for every application that
//! passes selection. The layering:
//!
//! - **[`core`]**: the registry model and pure gate logic. No I/O.
//! - **[`io`]**: shell, git, file patching, templates and registry loading.
//!   Each external capability sits behind a trait so tests can fake it.
//! - Orchestration ([`command`], [`selection`], [`driver`]) combines the two.
//!
//! No component changes the process's current directory; every command and
//! filter receives its working directory explicitly.

pub mod actions;
pub mod command;
pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod selection;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
