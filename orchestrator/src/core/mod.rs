//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and text captured from subprocesses, and return deterministic outputs
//! suitable for tests.

pub mod generation;
pub mod git_output;
pub mod ids;
pub mod tasks;
pub mod traceability;
pub mod types;
