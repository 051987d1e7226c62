// CLI binary path resolution for the claude tool

use std::path::PathBuf;

pub struct CliPathResolver;

impl CliPathResolver {
    /// Resolve Claude CLI binary path
    pub fn resolve_claude() -> Option<PathBuf> {
        Self::resolve_cli(
            "claude",
            &[dirs::home_dir().map(|h| h.join(".claude/local/claude"))],
        )
    }

    /// Resolve a CLI binary by checking common paths then falling back to `PATH`
    fn resolve_cli(name: &str, extra_paths: &[Option<PathBuf>]) -> Option<PathBuf> {
        let standard_paths = [
            dirs::home_dir().map(|h| h.join(format!(".npm-global/bin/{}", name))),
            dirs::home_dir().map(|h| h.join(format!(".local/bin/{}", name))),
            Some(PathBuf::from(format!("/usr/local/bin/{}", name))),
            Some(PathBuf::from(format!("/opt/homebrew/bin/{}", name))),
        ];

        for path in extra_paths.iter().chain(standard_paths.iter()).flatten() {
            if path.is_file() {
                log::info!("[CliPathResolver] Found {} at: {:?}", name, path);
                return Some(path.clone());
            }
        }

        Self::which(name)
    }

    /// Find a binary in PATH
    fn which(cmd: &str) -> Option<PathBuf> {
        match which::which(cmd) {
            Ok(path) => {
                log::info!("[CliPathResolver] Found {} via PATH at: {:?}", cmd, path);
                Some(path)
            }
            Err(_) => None,
        }
    }
}
