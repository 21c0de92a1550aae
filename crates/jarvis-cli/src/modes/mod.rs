//! Runtime execution modes.
//!
//! - `exec`: one turn streamed to stdout
//! - `chat`: line-based interactive session

pub mod chat;
pub mod exec;
pub mod render;

/// Returned when the user interrupts a one-shot turn.
#[derive(Debug)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for InterruptedError {}
