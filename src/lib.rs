// Clippy allows for reasonable defaults
#![allow(clippy::too_many_arguments)] // Service constructors take every collaborator explicitly
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::single_char_add_str)] // push_str("\n") reads better than push('\n')

// Module declarations
pub mod agents;
pub mod config;
pub mod events;
pub mod file_storage;
pub mod files;
pub mod git;
pub mod models;
pub mod ralph_loop;
pub mod server;
pub mod shell;
pub mod shutdown;
pub mod utils;

pub use utils::as_path;

use std::path::Path;

/// Startup recovery.
///
/// No child process outlives the server, so any loop persisted in a running
/// state can never report back. Those loops are marked `interrupted` so the
/// client can resume them explicitly.
pub fn perform_auto_recovery(data_dir: &Path) {
    match file_storage::ralph_loops::mark_interrupted_loops(data_dir) {
        Ok(0) => log::debug!("[Recovery] No interrupted Ralph loops found"),
        Ok(count) => log::info!("[Recovery] Marked {} Ralph loop(s) as interrupted", count),
        Err(e) => log::warn!("[Recovery] Failed to recover Ralph loops: {}", e),
    }
}
