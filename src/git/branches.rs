//! Branch operations for GitManager
//!
//! Contains methods for creating, listing, and checking out branches

use git2::{build::CheckoutBuilder, Branch, BranchType, Commit, Error as GitError, Signature};

use crate::git::types::{BranchInfo, CommitInfo};
use crate::git::GitManager;

/// Identity used when the repository has no user.name/user.email configured
pub(crate) const FALLBACK_SIGNATURE_NAME: &str = "Claudito";
pub(crate) const FALLBACK_SIGNATURE_EMAIL: &str = "claudito@localhost";

impl GitManager {
    /// Create a new branch from the current HEAD, optionally switching to it
    pub fn create_branch(&self, name: &str, checkout: bool) -> Result<BranchInfo, GitError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GitError::from_str("Branch name cannot be empty"));
        }

        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                log::info!("[GitManager] No commits found, creating initial commit");
                self.create_initial_commit()?;
                self.repo.head()?
            }
            Err(e) => return Err(e),
        };

        let head_commit = head.peel_to_commit()?;
        let branch = self.repo.branch(name, &head_commit, false)?;
        log::info!("[GitManager] Created branch {}", name);

        if checkout {
            self.checkout_branch(name)?;
            let branch = self.repo.find_branch(name, BranchType::Local)?;
            return self.branch_to_info(&branch);
        }

        self.branch_to_info(&branch)
    }

    /// Create an initial empty commit for a new repository
    pub(crate) fn create_initial_commit(&self) -> Result<(), GitError> {
        let tree_id = self.index()?.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "Initial commit",
            &tree,
            &[],
        )?;

        log::info!("[GitManager] Created initial commit");
        Ok(())
    }

    /// The configured identity, or a fallback one
    pub(crate) fn signature(&self) -> Result<Signature<'static>, GitError> {
        self.repo
            .signature()
            .or_else(|_| Signature::now(FALLBACK_SIGNATURE_NAME, FALLBACK_SIGNATURE_EMAIL))
    }

    /// Get all local branches, current branch first
    pub fn list_branches(&self) -> Result<Vec<BranchInfo>, GitError> {
        let branches = self.repo.branches(Some(BranchType::Local))?;

        let mut result = Vec::new();
        for branch in branches {
            let (branch, _) = branch?;
            result.push(self.branch_to_info(&branch)?);
        }

        result.sort_by(|a, b| b.is_head.cmp(&a.is_head).then_with(|| a.name.cmp(&b.name)));
        Ok(result)
    }

    /// Name of the current branch. Works on an unborn HEAD; `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                // HEAD is a symbolic ref to a branch that does not exist yet
                let head_ref = self.repo.find_reference("HEAD")?;
                Ok(head_ref
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(e) => Err(e),
        }
    }

    /// Checkout a local branch. Refuses to overwrite local modifications.
    pub fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        let refname = format!("refs/heads/{}", name);
        let obj = self.repo.revparse_single(&refname)?;

        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo.checkout_tree(&obj, Some(&mut checkout))?;
        self.repo.set_head(&refname)?;

        log::info!("[GitManager] Checked out {}", name);
        Ok(())
    }

    /// Convert a Branch to BranchInfo
    pub(crate) fn branch_to_info(&self, branch: &Branch) -> Result<BranchInfo, GitError> {
        let name = branch.name()?.unwrap_or("").to_string();
        let is_head = branch.is_head();
        let upstream = branch
            .upstream()
            .ok()
            .and_then(|b| b.name().ok().flatten().map(|s| s.to_string()));

        let commit = branch.get().peel_to_commit()?;

        Ok(BranchInfo {
            name,
            is_head,
            upstream,
            commit_id: commit.id().to_string(),
        })
    }

    /// Convert a Commit to CommitInfo
    pub(crate) fn commit_to_info(&self, commit: &Commit) -> CommitInfo {
        let author = commit.author();
        let id = commit.id().to_string();

        CommitInfo {
            short_id: id.chars().take(7).collect(),
            id,
            message: commit.message().unwrap_or("").to_string(),
            author: author.name().unwrap_or("").to_string(),
            email: author.email().unwrap_or("").to_string(),
            timestamp: commit.time().seconds(),
            parent_ids: commit.parent_ids().map(|oid| oid.to_string()).collect(),
        }
    }
}
