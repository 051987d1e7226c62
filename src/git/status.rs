//! Status and file tracking operations for GitManager

use git2::{Error as GitError, Status, StatusOptions};

use crate::git::types::{FileStatus, GitStatus};
use crate::git::GitManager;

impl GitManager {
    /// Get git status split into staged, unstaged and untracked paths.
    /// A path can appear both staged and unstaged.
    pub fn get_status(&self) -> Result<GitStatus, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        opts.recurse_untracked_dirs(true);
        opts.renames_head_to_index(true);

        let statuses = self.repo.statuses(Some(&mut opts))?;

        let mut result = GitStatus {
            branch: self.current_branch()?,
            ..GitStatus::default()
        };

        for entry in statuses.iter() {
            let Some(path) = entry.path() else {
                continue;
            };
            let status = entry.status();

            if status.contains(Status::WT_NEW) {
                result.untracked.push(path.to_string());
                continue;
            }
            if let Some(staged) = index_status_to_str(status) {
                result.staged.push(FileStatus {
                    path: path.to_string(),
                    status: staged.to_string(),
                });
            }
            if let Some(unstaged) = worktree_status_to_str(status) {
                result.unstaged.push(FileStatus {
                    path: path.to_string(),
                    status: unstaged.to_string(),
                });
            }
        }

        Ok(result)
    }
}

/// HEAD vs index
fn index_status_to_str(status: Status) -> Option<&'static str> {
    if status.contains(Status::INDEX_NEW) {
        Some("added")
    } else if status.contains(Status::INDEX_MODIFIED) {
        Some("modified")
    } else if status.contains(Status::INDEX_DELETED) {
        Some("deleted")
    } else if status.contains(Status::INDEX_RENAMED) {
        Some("renamed")
    } else if status.contains(Status::INDEX_TYPECHANGE) {
        Some("typechange")
    } else {
        None
    }
}

/// Index vs working tree
fn worktree_status_to_str(status: Status) -> Option<&'static str> {
    if status.contains(Status::CONFLICTED) {
        Some("conflicted")
    } else if status.contains(Status::WT_MODIFIED) {
        Some("modified")
    } else if status.contains(Status::WT_DELETED) {
        Some("deleted")
    } else if status.contains(Status::WT_RENAMED) {
        Some("renamed")
    } else if status.contains(Status::WT_TYPECHANGE) {
        Some("typechange")
    } else {
        None
    }
}
