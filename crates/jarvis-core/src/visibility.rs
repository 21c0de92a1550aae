//! Visibility recovery.
//!
//! When the user comes back to the client after it was in the background, a
//! stale connection error is cleared so the next prompt starts clean. The
//! monitor never reopens a channel.

use tracing::debug;

use crate::controller::StreamController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Applies visibility changes to a controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct VisibilityMonitor;

impl VisibilityMonitor {
    /// Returns whether the controller changed.
    pub fn observe(visibility: Visibility, controller: &mut StreamController) -> bool {
        match visibility {
            Visibility::Hidden => false,
            Visibility::Visible => {
                let changed = controller.clear_stale_error();
                if changed {
                    debug!(status = %controller.status(), "cleared stale error on resume");
                }
                changed
            }
        }
    }
}

/// Source of foreground transitions for a terminal process.
///
/// On Unix a `SIGCONT` (the shell resuming a stopped job) counts as becoming
/// visible. Elsewhere nothing ever fires.
pub struct VisibilitySignals {
    #[cfg(unix)]
    cont: Option<tokio::signal::unix::Signal>,
}

impl VisibilitySignals {
    /// Registers the signal handler. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn new() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        let cont = match signal(SignalKind::from_raw(libc::SIGCONT)) {
            Ok(stream) => Some(stream),
            Err(err) => {
                tracing::warn!(error = %err, "could not listen for SIGCONT");
                None
            }
        };
        Self { cont }
    }

    #[cfg(not(unix))]
    pub fn new() -> Self {
        Self {}
    }

    /// Waits for the next transition. Pends forever when no source exists.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Visibility {
        if let Some(cont) = self.cont.as_mut() {
            if cont.recv().await.is_some() {
                return Visibility::Visible;
            }
            self.cont = None;
        }
        std::future::pending().await
    }

    /// Waits for the next transition. Never resolves on this platform.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Visibility {
        std::future::pending().await
    }
}

impl Default for VisibilitySignals {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VisibilitySignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilitySignals").finish_non_exhaustive()
    }
}
