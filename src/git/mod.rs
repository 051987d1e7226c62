//! Git operations using git2-rs
//!
//! This module provides git functionality organized into focused submodules:
//! - `manager` - Core GitManager struct, open/init
//! - `branches` - Branch operations (create, list, checkout)
//! - `commits` - Staging, commits, history, diffs and push
//! - `status` - Working tree status
//! - `state` - Per-path cache of open repositories
//! - `types` - Shared data structures

mod branches;
mod commits;
mod manager;
mod state;
mod status;
#[cfg(test)]
mod tests;
mod types;

pub use manager::GitManager;
pub use state::GitState;
pub use types::{BranchInfo, CommitInfo, DiffInfo, FileDiff, FilePatch, FileStatus, GitStatus};
