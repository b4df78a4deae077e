//! Side-effecting adapters: filesystem, git, child processes, the agent.

pub mod agent;
pub mod config;
pub mod cycle_log;
pub mod git;
pub mod process;
pub mod prompt;
pub mod scratch;
pub mod specs;
pub mod task_store;
pub mod tools;
