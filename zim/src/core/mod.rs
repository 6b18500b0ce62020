//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules do no I/O: they hold the registry model and the gate
//! decisions, and return deterministic outputs suitable for tests.

pub mod gates;
pub mod model;
pub mod resume;
