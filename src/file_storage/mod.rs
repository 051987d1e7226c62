//! File-based storage module for Claudito
//!
//! All state lives under a single data directory (default `~/.claudito/`):
//! - `projects.json` - Project registry
//! - `settings.json` - User settings
//! - `projects/{project_id}/conversations/` - Conversation history
//! - `projects/{project_id}/ralph-loops/` - Ralph loop state and iteration artifacts

pub mod conversations;
pub mod projects;
pub mod ralph_loops;
pub mod settings;

use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Common file operations result type
pub type FileResult<T> = Result<T, String>;

/// Get the default global data directory in user home
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claudito")
}

/// Get the per-project data directory inside the data dir
pub fn project_data_dir(data_dir: &Path, project_id: &str) -> PathBuf {
    data_dir.join("projects").join(project_id)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> FileResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory {:?}: {}", path, e))?;
    }
    Ok(())
}

/// Write data to a file atomically (temp file + rename)
pub fn atomic_write(path: &Path, content: &str) -> FileResult<()> {
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    fs::write(&temp_path, content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", temp_path, e))?;

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename {:?} to {:?}: {}", temp_path, path, e))?;

    Ok(())
}

/// Read a JSON file and deserialize it
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> FileResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read file {:?}: {}", path, e))?;

    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse JSON from {:?}: {}", path, e))
}

/// Write data as pretty-printed JSON atomically
pub fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> FileResult<()> {
    let content = serde_json::to_string_pretty(data)
        .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;

    atomic_write(path, &content)
}

/// Run `f` while holding an exclusive advisory lock on `{path}.lock`.
///
/// Used for read-modify-write cycles on shared registry files.
pub fn with_file_lock<T, F>(path: &Path, f: F) -> FileResult<T>
where
    F: FnOnce() -> FileResult<T>,
{
    let lock_path = path.with_extension("lock");
    if let Some(parent) = lock_path.parent() {
        ensure_dir(parent)?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| format!("Failed to open lock file {:?}: {}", lock_path, e))?;

    lock_file
        .lock_exclusive()
        .map_err(|e| format!("Failed to lock {:?}: {}", lock_path, e))?;

    let result = f();

    if let Err(e) = FileExt::unlock(&lock_file) {
        log::warn!("Failed to release lock {:?}: {}", lock_path, e);
    }

    result
}

/// Remove a directory tree if it exists
pub fn remove_dir_if_exists(path: &Path) -> FileResult<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .map_err(|e| format!("Failed to remove directory {:?}: {}", path, e))?;
    }
    Ok(())
}
