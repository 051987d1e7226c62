//! Commit operations for GitManager
//!
//! Contains methods for staging, committing, viewing history, diffs and pushing

use git2::{
    build::CheckoutBuilder, Cred, CredentialType, Delta, Diff, DiffFormat, DiffOptions,
    Error as GitError, IndexAddOption, Patch, PushOptions, RemoteCallbacks, Status,
};
use std::path::{Component, Path};

use crate::git::types::{CommitInfo, DiffInfo, FileDiff, FilePatch};
use crate::git::GitManager;

/// Reject absolute paths and `..` components; everything is repo-relative
fn validate_repo_path(path: &str) -> Result<&Path, GitError> {
    let candidate = Path::new(path);
    if path.trim().is_empty() {
        return Err(GitError::from_str("Path cannot be empty"));
    }
    let escapes = candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(GitError::from_str(&format!(
            "Path must be relative to the repository: {}",
            path
        )));
    }
    Ok(candidate)
}

impl GitManager {
    /// Get commit history starting at HEAD; empty for a repository with no commits
    pub fn get_commit_history(&self, max_count: usize) -> Result<Vec<CommitInfo>, GitError> {
        if self.is_unborn() {
            return Ok(Vec::new());
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;

        let mut result = Vec::new();
        for oid in revwalk.take(max_count) {
            let commit = self.repo.find_commit(oid?)?;
            result.push(self.commit_to_info(&commit));
        }

        Ok(result)
    }

    /// Commit the staged changes
    pub fn create_commit(&self, message: &str) -> Result<CommitInfo, GitError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(GitError::from_str("Commit message cannot be empty"));
        }
        if !self.has_staged_changes()? {
            return Err(GitError::from_str("Nothing staged to commit"));
        }

        let signature = self.signature()?;
        let mut index = self.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let parent = if self.is_unborn() {
            None
        } else {
            Some(self.repo.head()?.peel_to_commit()?)
        };
        let parents: Vec<_> = parent.iter().collect();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;

        log::info!("[GitManager] Created commit {}", oid);
        let commit = self.repo.find_commit(oid)?;
        Ok(self.commit_to_info(&commit))
    }

    /// Whether the index differs from HEAD
    pub fn has_staged_changes(&self) -> Result<bool, GitError> {
        let head_tree = self.head_tree()?;
        let index = self.index()?;
        let diff = self
            .repo
            .diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;
        Ok(diff.deltas().count() > 0)
    }

    /// Stage paths. Paths missing from the working tree are staged as deletions.
    pub fn stage_files(&self, paths: &[String]) -> Result<(), GitError> {
        let workdir = self.workdir()?.to_path_buf();
        let mut index = self.index()?;

        for path in paths {
            let relative = validate_repo_path(path)?;
            if workdir.join(relative).exists() {
                index.add_path(relative)?;
            } else {
                index.remove_path(relative)?;
            }
        }

        index.write()?;
        Ok(())
    }

    /// Stage everything, including deletions
    pub fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    /// Move staged changes for the paths back to the working tree
    pub fn unstage_files(&self, paths: &[String]) -> Result<(), GitError> {
        for path in paths {
            validate_repo_path(path)?;
        }

        if self.is_unborn() {
            // Nothing to reset to; drop the entries from the index
            let mut index = self.index()?;
            for path in paths {
                index.remove_path(Path::new(path))?;
            }
            index.write()?;
            return Ok(());
        }

        let head = self.repo.head()?.peel_to_commit()?;
        self.repo
            .reset_default(Some(head.as_object()), paths.iter().map(String::as_str))?;
        Ok(())
    }

    /// Throw away working tree changes. Tracked files are restored from the
    /// index; untracked files are deleted.
    pub fn discard_changes(&self, paths: &[String]) -> Result<(), GitError> {
        let workdir = self.workdir()?.to_path_buf();
        let mut tracked = Vec::new();

        for path in paths {
            let relative = validate_repo_path(path)?;
            let status = self.repo.status_file(relative)?;
            if status.contains(Status::WT_NEW) {
                let absolute = workdir.join(relative);
                let removed = if absolute.is_dir() {
                    std::fs::remove_dir_all(&absolute)
                } else {
                    std::fs::remove_file(&absolute)
                };
                removed.map_err(|e| {
                    GitError::from_str(&format!("Failed to remove {}: {}", path, e))
                })?;
            } else {
                tracked.push(path.as_str());
            }
        }

        if !tracked.is_empty() {
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            for path in &tracked {
                checkout.path(path);
            }
            let mut index = self.index()?;
            self.repo.checkout_index(Some(&mut index), Some(&mut checkout))?;
        }

        log::info!("[GitManager] Discarded changes in {} path(s)", paths.len());
        Ok(())
    }

    /// Summary of all uncommitted changes (staged and unstaged) against HEAD
    pub fn get_working_diff(&self) -> Result<DiffInfo, GitError> {
        let head_tree = self.head_tree()?;
        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;

        self.diff_to_info(&diff)
    }

    /// Unified patch text for one path, either staged (HEAD vs index) or
    /// unstaged (index vs working tree)
    pub fn get_file_diff(&self, path: &str, staged: bool) -> Result<FilePatch, GitError> {
        validate_repo_path(path)?;

        let mut opts = DiffOptions::new();
        opts.pathspec(path).disable_pathspec_match(true);

        let diff = if staged {
            let head_tree = self.head_tree()?;
            let index = self.index()?;
            self.repo
                .diff_tree_to_index(head_tree.as_ref(), Some(&index), Some(&mut opts))?
        } else {
            opts.include_untracked(true)
                .recurse_untracked_dirs(true)
                .show_untracked_content(true);
            let index = self.index()?;
            self.repo.diff_index_to_workdir(Some(&index), Some(&mut opts))?
        };

        Ok(FilePatch {
            path: path.to_string(),
            staged,
            patch: diff_to_patch_text(&diff)?,
        })
    }

    /// Push a branch (default: the current one) to origin
    pub fn push_branch(&self, branch_name: Option<&str>) -> Result<(), GitError> {
        let branch_name = match branch_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self
                .current_branch()?
                .ok_or_else(|| GitError::from_str("HEAD is not on a branch"))?,
        };

        let mut remote = self.repo.find_remote("origin")?;
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch_name, branch_name);

        let config = self.repo.config()?;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username_from_url, allowed_types| {
            if allowed_types.contains(CredentialType::SSH_KEY) {
                Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
            } else if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                Cred::credential_helper(&config, url, username_from_url)
            } else {
                Cred::default()
            }
        });

        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(callbacks);

        remote.push(&[&refspec], Some(&mut push_options))?;

        log::info!("[GitManager] Pushed branch {} to origin", branch_name);
        Ok(())
    }

    /// HEAD's tree, `None` before the first commit
    pub(crate) fn head_tree(&self) -> Result<Option<git2::Tree<'_>>, GitError> {
        if self.is_unborn() {
            return Ok(None);
        }
        Ok(Some(self.repo.head()?.peel_to_tree()?))
    }

    /// Convert a Diff to DiffInfo with per-file line counts
    pub(crate) fn diff_to_info(&self, diff: &Diff) -> Result<DiffInfo, GitError> {
        let stats = diff.stats()?;

        let mut files = Vec::new();
        for (idx, delta) in diff.deltas().enumerate() {
            let (insertions, deletions) = match Patch::from_diff(diff, idx)? {
                Some(patch) => {
                    let (_, additions, deletions) = patch.line_stats()?;
                    (additions, deletions)
                }
                None => (0, 0),
            };

            files.push(FileDiff {
                old_path: delta
                    .old_file()
                    .path()
                    .map(|p| p.to_string_lossy().to_string()),
                new_path: delta
                    .new_file()
                    .path()
                    .map(|p| p.to_string_lossy().to_string()),
                status: delta_to_string(delta.status()).to_string(),
                insertions,
                deletions,
            });
        }

        Ok(DiffInfo {
            files_changed: stats.files_changed(),
            insertions: stats.insertions(),
            deletions: stats.deletions(),
            files,
        })
    }
}

fn diff_to_patch_text(diff: &Diff) -> Result<String, GitError> {
    let mut text = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            text.push(line.origin());
        }
        text.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;
    Ok(text)
}

/// Convert a Delta to a string representation
pub(crate) fn delta_to_string(delta: Delta) -> &'static str {
    match delta {
        Delta::Added => "added",
        Delta::Deleted => "deleted",
        Delta::Modified => "modified",
        Delta::Renamed => "renamed",
        Delta::Copied => "copied",
        Delta::Ignored => "ignored",
        Delta::Untracked => "untracked",
        Delta::Typechange => "typechange",
        Delta::Unmodified => "unmodified",
        Delta::Unreadable => "unreadable",
        Delta::Conflicted => "conflicted",
    }
}
