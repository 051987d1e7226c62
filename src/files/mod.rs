//! File browser for project directories
//!
//! Every path coming from a client is relative to the project root and goes
//! through `resolve_in_project`, which refuses absolute paths, `..` segments
//! and symlinks that lead outside the root.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Files up to this size are returned as text when they are valid UTF-8
pub const MAX_TEXT_FILE_BYTES: u64 = 1024 * 1024;
/// Hard limit for any read
pub const MAX_READ_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_SEARCH_LIMIT: usize = 100;
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// Directories never descended into by `search`
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target"];

#[derive(Debug, Error)]
pub enum FileBrowserError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Path is outside the project: {0}")]
    OutsideProject(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Is a directory: {0}")]
    IsADirectory(String),
    #[error("File is too large ({0} bytes)")]
    TooLarge(u64),
    #[error("Path is inside .git: {0}")]
    GitInternal(String),
    #[error("Search query cannot be empty")]
    EmptyQuery,
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    /// Relative to the project root, `/`-separated
    pub path: String,
    pub is_dir: bool,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileEncoding {
    Utf8,
    Base64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub encoding: FileEncoding,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

fn io_error(path: &Path, e: std::io::Error) -> FileBrowserError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FileBrowserError::NotFound(path.display().to_string())
    } else {
        FileBrowserError::Io(format!("{}: {}", path.display(), e))
    }
}

/// Resolve a client-supplied relative path inside `root`. The target does
/// not have to exist, but its nearest existing ancestor must lie inside
/// the root after symlinks are followed. A dangling symlink on the way is
/// refused since the place it would create is unknown until written.
pub fn resolve_in_project(root: &Path, relative: &str) -> Result<PathBuf, FileBrowserError> {
    let root = root.canonicalize().map_err(|e| io_error(root, e))?;
    let relative = relative.trim();

    let rel_path = Path::new(relative);
    if rel_path.is_absolute() || relative.starts_with('/') || relative.starts_with('\\') {
        return Err(FileBrowserError::InvalidPath(relative.to_string()));
    }
    for component in rel_path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(FileBrowserError::InvalidPath(relative.to_string())),
        }
    }

    let candidate = root.join(rel_path);
    // symlink_metadata does not follow links, so dangling ones are found here
    let existing = candidate
        .ancestors()
        .find(|p| fs::symlink_metadata(p).is_ok())
        .ok_or_else(|| FileBrowserError::NotFound(relative.to_string()))?;
    let canonical = match existing.canonicalize() {
        Ok(canonical) => canonical,
        Err(_) if existing.is_symlink() => {
            return Err(FileBrowserError::OutsideProject(relative.to_string()))
        }
        Err(e) => return Err(io_error(existing, e)),
    };
    if !canonical.starts_with(&root) {
        return Err(FileBrowserError::OutsideProject(relative.to_string()));
    }

    if existing == candidate {
        Ok(canonical)
    } else {
        // Re-attach the part that does not exist yet
        let rest = candidate
            .strip_prefix(existing)
            .map_err(|_| FileBrowserError::InvalidPath(relative.to_string()))?;
        Ok(canonical.join(rest))
    }
}

/// `.git` internals are neither readable nor writable through the browser
fn reject_git_internal(relative: &str) -> Result<(), FileBrowserError> {
    if Path::new(relative.trim())
        .components()
        .any(|c| c.as_os_str() == ".git")
    {
        return Err(FileBrowserError::GitInternal(relative.to_string()));
    }
    Ok(())
}

/// `path` relative to `root`, `/`-separated
fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn canonical_root(root: &Path) -> Result<PathBuf, FileBrowserError> {
    root.canonicalize().map_err(|e| io_error(root, e))
}

/// List a directory: directories first, then files, each alphabetically.
/// `.git` is hidden.
pub fn list_dir(root: &Path, relative: &str) -> Result<Vec<DirEntry>, FileBrowserError> {
    let root = canonical_root(root)?;
    let dir = resolve_in_project(&root, relative)?;
    if !dir.exists() {
        return Err(FileBrowserError::NotFound(relative.to_string()));
    }
    if !dir.is_dir() {
        return Err(FileBrowserError::NotADirectory(relative.to_string()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| io_error(&dir, e))? {
        let entry = entry.map_err(|e| io_error(&dir, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == ".git" {
            continue;
        }

        // Follow symlinks for type and size; a dangling link is listed as a file
        let metadata = fs::metadata(entry.path()).ok();
        let is_dir = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);

        entries.push(DirEntry {
            path: relative_display(&root, &entry.path()),
            name,
            is_dir,
            size: metadata.as_ref().filter(|m| m.is_file()).map(|m| m.len()),
            modified: metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
        });
    }

    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(entries)
}

fn looks_like_text(bytes: &[u8]) -> bool {
    !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}

/// Read a file. Small UTF-8 files come back as text, everything else as base64.
pub fn read_file(root: &Path, relative: &str) -> Result<FileContent, FileBrowserError> {
    reject_git_internal(relative)?;
    let root = canonical_root(root)?;
    let path = resolve_in_project(&root, relative)?;
    let metadata = fs::metadata(&path).map_err(|e| io_error(&path, e))?;
    if metadata.is_dir() {
        return Err(FileBrowserError::IsADirectory(relative.to_string()));
    }
    if metadata.len() > MAX_READ_BYTES {
        return Err(FileBrowserError::TooLarge(metadata.len()));
    }

    let bytes = fs::read(&path).map_err(|e| io_error(&path, e))?;
    let guessed = mime_guess::from_path(&path).first();
    let size = bytes.len() as u64;

    let (content, encoding, mime_type) =
        if size <= MAX_TEXT_FILE_BYTES && looks_like_text(&bytes) {
            let mime = guessed
                .map(|m| m.to_string())
                .unwrap_or_else(|| "text/plain".to_string());
            (
                String::from_utf8_lossy(&bytes).to_string(),
                FileEncoding::Utf8,
                mime,
            )
        } else {
            let mime = guessed
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            (BASE64.encode(&bytes), FileEncoding::Base64, mime)
        };

    Ok(FileContent {
        path: relative_display(&root, &path),
        content,
        encoding,
        mime_type,
        size,
    })
}

/// Write a text file, creating missing parent directories
pub fn write_file(
    root: &Path,
    relative: &str,
    content: &str,
) -> Result<DirEntry, FileBrowserError> {
    let root = canonical_root(root)?;
    if relative.trim().is_empty() {
        return Err(FileBrowserError::InvalidPath(relative.to_string()));
    }
    reject_git_internal(relative)?;
    let path = resolve_in_project(&root, relative)?;
    if path.is_dir() {
        return Err(FileBrowserError::IsADirectory(relative.to_string()));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    fs::write(&path, content).map_err(|e| io_error(&path, e))?;
    log::debug!("[FileBrowser] Wrote {} bytes to {}", content.len(), path.display());

    let metadata = fs::metadata(&path).ok();
    Ok(DirEntry {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        path: relative_display(&root, &path),
        is_dir: false,
        size: metadata.as_ref().map(|m| m.len()),
        modified: metadata
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from),
    })
}

/// Case-insensitive file name search, skipping `.git`, `node_modules` and `target`
pub fn search(
    root: &Path,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<SearchResult>, FileBrowserError> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Err(FileBrowserError::EmptyQuery);
    }
    let limit = limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let root = canonical_root(root)?;

    let results = WalkDir::new(&root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && SKIPPED_DIRS.iter().any(|skipped| *skipped == name))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().to_lowercase().contains(&query))
        .take(limit)
        .map(|e| SearchResult {
            name: e.file_name().to_string_lossy().to_string(),
            path: relative_display(&root, e.path()),
            is_dir: e.file_type().is_dir(),
        })
        .collect();

    Ok(results)
}
