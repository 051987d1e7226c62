// Graceful shutdown handling for signal trapping

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared shutdown state across the application
#[derive(Clone)]
pub struct ShutdownState {
    /// Flag indicating shutdown has been requested
    shutdown_requested: Arc<AtomicBool>,
    /// Flag indicating cleanup has completed
    cleanup_complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            cleanup_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        log::info!("[Shutdown] Shutdown requested");
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn mark_cleanup_complete(&self) {
        self.cleanup_complete.store(true, Ordering::SeqCst);
    }

    pub fn is_cleanup_complete(&self) -> bool {
        self.cleanup_complete.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

/// What the cleanup pass stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownResult {
    /// Interactive agent processes that were signalled
    pub agents_stopped: usize,
    /// Ralph loops that were moved to `stopped`
    pub loops_stopped: usize,
    /// Shell commands that were killed
    pub commands_killed: usize,
}

impl ShutdownResult {
    pub fn total(&self) -> usize {
        self.agents_stopped + self.loops_stopped + self.commands_killed
    }
}

/// Graceful shutdown handler
pub struct ShutdownHandler {
    state: ShutdownState,
}

impl ShutdownHandler {
    pub fn with_state(state: ShutdownState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ShutdownState {
        &self.state
    }

    /// Run the cleanup once. Later calls are no-ops and return an empty result.
    pub fn handle_shutdown<F>(&self, cleanup_fn: F) -> ShutdownResult
    where
        F: FnOnce() -> ShutdownResult,
    {
        if self.state.is_cleanup_complete() {
            return ShutdownResult::default();
        }
        self.state.request_shutdown();

        log::info!("[Shutdown] Starting graceful shutdown...");
        let result = cleanup_fn();
        log::info!(
            "[Shutdown] Complete: {} agent(s), {} loop(s), {} shell command(s) stopped",
            result.agents_stopped,
            result.loops_stopped,
            result.commands_killed
        );

        self.state.mark_cleanup_complete();
        result
    }
}

/// Register signal handlers for graceful shutdown
/// This sets up handlers for SIGINT (Ctrl+C), SIGTERM, and SIGHUP
#[cfg(unix)]
pub fn register_signal_handlers(state: ShutdownState) -> Result<()> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
        .map_err(|e| anyhow::anyhow!("Failed to register signal handlers: {}", e))?;

    thread::spawn(move || {
        for signal in signals.forever() {
            let name = match signal {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => continue,
            };
            log::info!("[Shutdown] Received {}", name);
            state.request_shutdown();
        }
    });

    log::debug!("[Shutdown] Signal handlers registered (SIGINT, SIGTERM, SIGHUP)");
    Ok(())
}

/// Register signal handlers for Windows
#[cfg(windows)]
pub fn register_signal_handlers(state: ShutdownState) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("[Shutdown] Received Ctrl+C");
        state.request_shutdown();
    })
    .map_err(|e| anyhow::anyhow!("Failed to register Ctrl+C handler: {}", e))?;

    log::debug!("[Shutdown] Signal handler registered (Ctrl+C)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shutdown_is_shared_between_clones() {
        let state = ShutdownState::new();
        let other = state.clone();
        assert!(!other.is_shutdown_requested());

        state.request_shutdown();
        assert!(other.is_shutdown_requested());
    }

    #[test]
    fn test_handle_shutdown_runs_cleanup_once() {
        let handler = ShutdownHandler::with_state(ShutdownState::new());
        let mut calls = 0;

        let result = handler.handle_shutdown(|| {
            calls += 1;
            ShutdownResult {
                agents_stopped: 1,
                loops_stopped: 2,
                commands_killed: 0,
            }
        });
        assert_eq!(result.total(), 3);
        assert!(handler.state().is_shutdown_requested());
        assert!(handler.state().is_cleanup_complete());

        let again = handler.handle_shutdown(|| {
            calls += 1;
            ShutdownResult::default()
        });
        assert_eq!(again, ShutdownResult::default());
        assert_eq!(calls, 1);
    }
}
