//! Typed failures that callers branch on.
//!
//! Most of the crate propagates `anyhow::Error` with context. The variants here
//! are the ones the command boundary recovers with `downcast_ref` to choose an
//! exit code or to decide whether a generation can be recovered.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A document or directory that must exist is missing.
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A document exists but its structure could not be decoded.
    #[error("parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// An external tool exited non-zero, timed out, or could not be spawned.
    #[error("{command} failed: {detail}")]
    ExternalCommand { command: String, detail: String },

    /// `resume`/`switch` found nothing to act on.
    #[error("no recoverable generation: {0}")]
    NoRecoverableState(String),

    #[error("generation {0} already exists")]
    GenerationExists(String),

    /// The generation is in a state that does not allow the operation.
    #[error("cannot {operation} generation {name}: it is {state}")]
    InvalidState {
        name: String,
        state: String,
        operation: &'static str,
    },

    /// A cycle failed and the generation was left suspended at `cycle`.
    #[error("generation {name} suspended at cycle {cycle}: {reason}")]
    CycleSuspended {
        name: String,
        cycle: u32,
        reason: String,
    },
}

impl OrchestratorError {
    pub fn external(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalCommand {
            command: command.into(),
            detail: detail.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}
