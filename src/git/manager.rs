//! Core GitManager implementation
//!
//! Contains the GitManager struct, repository discovery and init

use git2::{Error as GitError, Index, Repository};
use std::path::{Path, PathBuf};

/// Git manager for repository operations
pub struct GitManager {
    pub(crate) repo: Repository,
}

impl GitManager {
    /// Open the repository at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    /// Initialize a new repository (no-op on an existing one) and open it
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        if let Ok(existing) = Self::new(path) {
            return Ok(existing);
        }
        let repo = Repository::init(path)?;
        log::info!("[GitManager] Initialized repository at {}", path.display());
        Ok(Self { repo })
    }

    /// Whether the path is the root of a (non-bare) repository
    pub fn is_repository<P: AsRef<Path>>(path: P) -> bool {
        Repository::open(path)
            .map(|repo| !repo.is_bare())
            .unwrap_or(false)
    }

    /// Get the `.git` directory path
    pub fn repo_path(&self) -> PathBuf {
        self.repo.path().to_path_buf()
    }

    /// Get the working directory
    pub fn workdir(&self) -> Result<&Path, GitError> {
        self.repo
            .workdir()
            .ok_or_else(|| GitError::from_str("Repository has no working directory"))
    }

    /// The index, reloaded from disk. Agents and shell commands change the
    /// repository behind our back, so a cached handle can be stale.
    pub(crate) fn index(&self) -> Result<Index, GitError> {
        let mut index = self.repo.index()?;
        index.read(false)?;
        Ok(index)
    }

    /// Whether HEAD points to a branch with no commits yet
    pub(crate) fn is_unborn(&self) -> bool {
        matches!(
            self.repo.head(),
            Err(ref e) if e.code() == git2::ErrorCode::UnbornBranch
        )
    }
}
