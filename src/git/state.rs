//! Shared cache of open repositories, keyed by project path

use super::GitManager;
use crate::utils::{lock_mutex_recover, ResultExt};
use std::collections::HashMap;
use std::sync::Mutex;

/// Git manager state
pub struct GitState {
    managers: Mutex<HashMap<String, GitManager>>,
}

impl Default for GitState {
    fn default() -> Self {
        Self::new()
    }
}

impl GitState {
    pub fn new() -> Self {
        Self {
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` against the repository at `repo_path`, opening it on first use
    pub fn with_manager<F, R>(&self, repo_path: &str, f: F) -> Result<R, String>
    where
        F: FnOnce(&GitManager) -> Result<R, git2::Error>,
    {
        let mut managers = lock_mutex_recover(&self.managers);

        if !managers.contains_key(repo_path) {
            let manager = GitManager::new(repo_path).with_context("Not a git repository")?;
            managers.insert(repo_path.to_string(), manager);
        }

        let manager = managers
            .get(repo_path)
            .ok_or_else(|| "Repository not found".to_string())?;
        f(manager).with_context("Git operation failed")
    }

    /// Initialize a repository and cache it
    pub fn init(&self, repo_path: &str) -> Result<(), String> {
        let manager = GitManager::init(repo_path).with_context("Failed to initialize repository")?;
        lock_mutex_recover(&self.managers).insert(repo_path.to_string(), manager);
        Ok(())
    }

    /// Drop the cached handle, e.g. when a project is removed
    pub fn forget(&self, repo_path: &str) {
        lock_mutex_recover(&self.managers).remove(repo_path);
    }
}
