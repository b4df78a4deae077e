//! Naming, checkpoint trailers and state derivation for generation trails.
//!
//! A generation's state is never stored on its own. Every commit the
//! orchestrator writes to a generation branch carries trailers:
//!
//! ```text
//! Generation: generation-20260214.0
//! Generation-Cycle: 3
//! Generation-State: active
//! ```
//!
//! and [`derive_state`] combines the tip's trailers with what is observable in
//! the repository (worktree present/dirty, branch merged) to recover the
//! lifecycle state after restarts or out-of-band git operations.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const BRANCH_PREFIX: &str = "generation-";
/// Glob handed to `git branch --list`.
pub const BRANCH_GLOB: &str = "generation-*";

const TRAILER_NAME: &str = "Generation";
const TRAILER_CYCLE: &str = "Generation-Cycle";
const TRAILER_STATE: &str = "Generation-State";

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^generation-(\d{8})\.(\d+)$").expect("valid generation name regex")
});

/// `generation-<YYYYMMDD>.<seq>`; orders by date, then numeric sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationName {
    date: String,
    seq: u32,
}

impl GenerationName {
    pub fn parse(name: &str) -> Option<Self> {
        let caps = NAME_RE.captures(name)?;
        Some(Self {
            date: caps.get(1)?.as_str().to_string(),
            seq: caps.get(2)?.as_str().parse().ok()?,
        })
    }

    /// Smallest unused sequence number for `date` (`YYYYMMDD`).
    pub fn next_for_date<S: AsRef<str>>(date: &str, existing: &[S]) -> Self {
        let used: BTreeSet<u32> = existing
            .iter()
            .filter_map(|name| Self::parse(name.as_ref()))
            .filter(|name| name.date == date)
            .map(|name| name.seq)
            .collect();
        let seq = (0..).find(|seq| !used.contains(seq)).unwrap_or_default();
        Self {
            date: date.to_string(),
            seq,
        }
    }
}

impl fmt::Display for GenerationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BRANCH_PREFIX}{}.{}", self.date, self.seq)
    }
}

/// State recorded in the `Generation-State` trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointState {
    Active,
    Suspended,
    Completing,
}

impl CheckpointState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Completing => "completing",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "completing" => Some(Self::Completing),
            _ => None,
        }
    }
}

/// Trailers carried by an orchestrator commit on a generation branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub generation: String,
    pub cycle: u32,
    pub state: CheckpointState,
}

impl Checkpoint {
    pub fn new(generation: impl Into<String>, cycle: u32, state: CheckpointState) -> Self {
        Self {
            generation: generation.into(),
            cycle,
            state,
        }
    }

    pub fn trailers(&self) -> String {
        format!(
            "{TRAILER_NAME}: {}\n{TRAILER_CYCLE}: {}\n{TRAILER_STATE}: {}",
            self.generation,
            self.cycle,
            self.state.as_str()
        )
    }

    /// Full commit message: subject, optional body, trailer block.
    pub fn commit_message(&self, subject: &str, body: Option<&str>) -> String {
        let mut message = subject.trim().to_string();
        if let Some(body) = body.map(str::trim).filter(|b| !b.is_empty()) {
            message.push_str("\n\n");
            message.push_str(body);
        }
        message.push_str("\n\n");
        message.push_str(&self.trailers());
        message.push('\n');
        message
    }

    /// Read trailers from a commit message. Later lines win; all three
    /// trailers must be present.
    pub fn parse(message: &str) -> Option<Self> {
        let mut generation = None;
        let mut cycle = None;
        let mut state = None;
        for line in message.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                TRAILER_NAME => generation = Some(value.to_string()),
                TRAILER_CYCLE => cycle = value.parse().ok(),
                TRAILER_STATE => state = CheckpointState::parse(value),
                _ => {}
            }
        }
        Some(Self {
            generation: generation?,
            cycle: cycle?,
            state: state?,
        })
    }
}

/// Why a generation counts as suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendReason {
    /// A `suspended` checkpoint was committed (failed cycle or switch).
    Recorded,
    /// The tip says `active` but the worktree holds uncommitted changes.
    Interrupted,
    /// The tip says `active` but the worktree directory is gone.
    WorktreeMissing,
    /// The branch tip carries no checkpoint for this generation.
    NoCheckpoint,
}

impl SuspendReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Interrupted => "interrupted",
            Self::WorktreeMissing => "worktree missing",
            Self::NoCheckpoint => "no checkpoint",
        }
    }
}

/// Lifecycle state of an existing generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum GenerationState {
    Active { cycle: u32 },
    Suspended { cycle: u32, reason: SuspendReason },
    Completing { cycle: u32 },
    Merged { cycle: u32 },
}

impl GenerationState {
    /// Last committed cycle.
    pub fn cycle(&self) -> u32 {
        match *self {
            Self::Active { cycle }
            | Self::Suspended { cycle, .. }
            | Self::Completing { cycle }
            | Self::Merged { cycle } => cycle,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }

    /// `resume` can bring it back to `Active`.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Suspended { .. } | Self::Completing { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Active { .. } => "active",
            Self::Suspended { .. } => "suspended",
            Self::Completing { .. } => "completing",
            Self::Merged { .. } => "merged",
        }
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspended { reason, .. } => write!(f, "suspended ({})", reason.as_str()),
            other => f.write_str(other.label()),
        }
    }
}

/// Repository facts about one generation branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub name: String,
    /// Checkpoint parsed from the branch tip, if any.
    pub checkpoint: Option<Checkpoint>,
    pub worktree_present: bool,
    pub worktree_dirty: bool,
    /// The branch tip is reachable from the base branch.
    pub merged_into_base: bool,
}

/// Derive the lifecycle state from durable repository facts.
pub fn derive_state(obs: &Observation) -> GenerationState {
    let checkpoint = obs
        .checkpoint
        .as_ref()
        .filter(|checkpoint| checkpoint.generation == obs.name);
    let cycle = checkpoint.map(|c| c.cycle).unwrap_or(0);

    if obs.merged_into_base {
        return GenerationState::Merged { cycle };
    }
    let Some(checkpoint) = checkpoint else {
        return GenerationState::Suspended {
            cycle,
            reason: SuspendReason::NoCheckpoint,
        };
    };
    match checkpoint.state {
        CheckpointState::Completing => GenerationState::Completing { cycle },
        CheckpointState::Suspended => GenerationState::Suspended {
            cycle,
            reason: SuspendReason::Recorded,
        },
        CheckpointState::Active if !obs.worktree_present => GenerationState::Suspended {
            cycle,
            reason: SuspendReason::WorktreeMissing,
        },
        CheckpointState::Active if obs.worktree_dirty => GenerationState::Suspended {
            cycle,
            reason: SuspendReason::Interrupted,
        },
        CheckpointState::Active => GenerationState::Active { cycle },
    }
}
