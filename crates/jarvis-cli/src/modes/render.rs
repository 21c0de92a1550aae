//! Terminal rendering of a controller's transcript.
//!
//! # Output contract
//! - transcript segments → stdout, written once each, in order
//! - status lines, errors, the input marker → stderr

use std::io::{Stderr, Stdout, Write, stderr, stdout};

use jarvis_core::controller::{CONNECTION_ERROR_MESSAGE, StreamStatus, Transcript};

pub struct TranscriptRenderer<O = Stdout, E = Stderr> {
    out: O,
    err: E,
    /// Number of transcript segments already written.
    seen: usize,
    /// Whether stdout currently ends with a newline.
    at_line_start: bool,
}

impl TranscriptRenderer {
    pub fn stdio() -> Self {
        Self::new(stdout(), stderr())
    }
}

impl<O: Write, E: Write> TranscriptRenderer<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            seen: 0,
            at_line_start: true,
        }
    }

    /// Treats everything currently in `transcript` as already shown.
    pub fn skip_to(&mut self, transcript: &Transcript) {
        self.seen = transcript.len();
    }

    /// Writes segments appended since the last call.
    pub fn render(&mut self, transcript: &Transcript) {
        let fresh = transcript.since(self.seen);
        if fresh.is_empty() {
            return;
        }
        for segment in fresh {
            let _ = write!(self.out, "{segment}");
            self.at_line_start = segment.ends_with('\n');
        }
        self.seen = transcript.len();
        let _ = self.out.flush();
    }

    /// Reports how a turn ended.
    pub fn turn_finished(&mut self, status: StreamStatus, error: Option<&str>) {
        self.break_line();
        if status == StreamStatus::Error {
            let message = error.unwrap_or(CONNECTION_ERROR_MESSAGE);
            let _ = writeln!(self.err, "Error: {message}");
        }
    }

    /// Writes one status line to stderr.
    pub fn notice(&mut self, message: &str) {
        self.break_line();
        let _ = writeln!(self.err, "{message}");
    }

    /// Shows the input marker.
    pub fn prompt(&mut self) {
        let _ = write!(self.err, "> ");
        let _ = self.err.flush();
    }

    /// Leaves stdout ending on a newline.
    pub fn finish(&mut self) {
        self.break_line();
    }

    fn break_line(&mut self) {
        if !self.at_line_start {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
            self.at_line_start = true;
        }
    }

    #[cfg(test)]
    fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}
