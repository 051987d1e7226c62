// Utility functions

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Convert a project path string to a Path reference.
///
/// # Example
/// ```ignore
/// use crate::utils::as_path;
///
/// // Instead of: let path = Path::new(&project.path);
/// let path = as_path(&project.path);
/// ```
#[inline]
pub fn as_path(project_path: &str) -> &Path {
    Path::new(project_path)
}

/// Extension trait for Result that provides convenient error context methods.
/// Converts any error to a String with a descriptive message prefix.
///
/// # Example
/// ```ignore
/// use crate::utils::ResultExt;
///
/// let file = std::fs::read_to_string("settings.json")
///     .with_context("Failed to read settings file")?;
/// ```
pub trait ResultExt<T> {
    /// Converts the error to a String with context message.
    fn with_context(self, msg: &str) -> Result<T, String>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn with_context(self, msg: &str) -> Result<T, String> {
        self.map_err(|e| format!("{}: {}", msg, e))
    }
}

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// This is useful when you want to continue even if a previous thread panicked.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Generate a prefixed short identifier, e.g. `proj_3f2a9c1b7d4e`.
pub fn generate_id(prefix: &str) -> String {
    format!(
        "{}_{}",
        prefix,
        &Uuid::new_v4().to_string().replace('-', "")[..12]
    )
}

/// Truncate a string to at most `max_chars` characters without splitting a
/// multi-byte character.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id1 = generate_id("proj");
        let id2 = generate_id("proj");
        assert_ne!(id1, id2);
        assert!(id1.starts_with("proj_"));
        assert_eq!(id1.len(), "proj_".len() + 12);
    }

    #[test]
    fn test_as_path() {
        let project_path = "/home/user/project";
        let path = as_path(project_path);
        assert_eq!(path, Path::new("/home/user/project"));
    }

    #[test]
    fn test_truncate_string_multibyte() {
        assert_eq!(truncate_string("héllo wörld", 4), "héll");
        assert_eq!(truncate_string("short", 50), "short");
        assert_eq!(truncate_string("", 3), "");
    }

    #[test]
    fn test_with_context() {
        let result: Result<(), &str> = Err("boom");
        assert_eq!(
            result.with_context("Failed to do thing").unwrap_err(),
            "Failed to do thing: boom"
        );
    }

    #[test]
    fn test_lock_mutex_recover() {
        let mutex = Mutex::new(5);
        *lock_mutex_recover(&mutex) += 1;
        assert_eq!(*lock_mutex_recover(&mutex), 6);
    }
}
