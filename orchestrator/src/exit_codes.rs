//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed (invalid config, external command failure, invalid state, ...).
pub const FAILED: i32 = 1;
/// `generator resume`/`switch` found no generation to act on.
pub const NO_RECOVERABLE_STATE: i32 = 2;
/// A cycle failed; the generation was left suspended.
pub const SUSPENDED: i32 = 3;
