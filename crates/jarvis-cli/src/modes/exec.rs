//! Single-shot exec mode.
//!
//! Streams one turn's reply to stdout. The prompt echo is not printed.

use std::sync::Arc;

use anyhow::{Context, Result};
use jarvis_core::client::AgentClient;
use jarvis_core::controller::{
    CONNECTION_ERROR_MESSAGE, StartOptions, StreamController, StreamStatus,
};
use jarvis_core::session::SessionStore;
use jarvis_core::transport::AgentTransport;

use super::InterruptedError;
use super::render::TranscriptRenderer;

/// Options for exec execution.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Project directory forwarded with the prompt.
    pub workdir: Option<String>,
    /// Ask the server to drop conversation state first.
    pub reset: bool,
}

/// Runs one turn to completion.
///
/// # Errors
/// Returns the turn's error message when it ends in `Error`, and
/// [`InterruptedError`] on Ctrl+C.
pub async fn run_exec(
    client: Arc<AgentClient>,
    sessions: Box<dyn SessionStore>,
    prompt: &str,
    options: &ExecOptions,
) -> Result<()> {
    let (controller, mut events) =
        StreamController::new(client as Arc<dyn AgentTransport>, sessions);
    let mut controller = controller.with_workdir(options.workdir.clone());
    let mut renderer = TranscriptRenderer::stdio();

    controller.start(
        prompt,
        StartOptions {
            reset: options.reset,
        },
    );
    renderer.skip_to(controller.output());

    while controller.is_streaming() {
        tokio::select! {
            message = events.recv() => {
                let Some(message) = message else { break };
                controller.apply(message);
                renderer.render(controller.output());
            }
            result = tokio::signal::ctrl_c() => {
                result.context("listen for Ctrl+C")?;
                controller.stop();
                renderer.notice("\n^C Interrupted.");
                return Err(InterruptedError.into());
            }
        }
    }

    renderer.finish();
    match controller.status() {
        StreamStatus::Error => {
            anyhow::bail!(
                "{}",
                controller.error().unwrap_or(CONNECTION_ERROR_MESSAGE)
            )
        }
        _ => Ok(()),
    }
}
