//! Generation-trail orchestrator for iterative, agent-driven development.
//!
//! A generation is a git branch plus worktree on which the orchestrator runs
//! measure → stitch → commit cycles. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (identifier extraction,
//!   traceability, git output parsing, generation state derivation, task
//!   selection). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, process execution,
//!   agent invocation). Isolated to enable fakes in tests.
//!
//! Orchestration modules ([`cycle`], [`generator`], [`orchestrator`]) combine
//! the two to implement CLI commands.

pub mod core;
pub mod cycle;
pub mod error;
pub mod exit_codes;
pub mod generator;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
