//! Stream session controller.
//!
//! Owns the status state machine, the transcript, and the single open push
//! channel. The controller never awaits inside `start`/`stop`; channel output
//! arrives on [`ChannelEvents`], which the owner drains on its own event loop
//! and feeds back through [`StreamController::apply`].
//!
//! ```text
//! Idle|Error|Done --start--> Streaming
//! Streaming --done--> Done
//! Streaming --server error | disconnect--> Error
//! Streaming --stop--> Done
//! Error --visible--> Done
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::protocol::{self, StreamEvent};
use crate::session::{SessionId, SessionStore};
use crate::transport::{
    AgentTransport, ChannelGuard, ChannelId, ChannelMessage, ChannelSignal, ChannelSink,
    StreamRequest, TransportError,
};

/// Surfaced when the channel drops before the server finished the turn.
pub const CONNECTION_ERROR_MESSAGE: &str = "stream connection error";
/// Surfaced when the server reports an error without a message.
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

const USER_PREFIX: &str = "You> ";
/// Upper bound on the server-side reset request.
const RESET_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    #[default]
    Idle,
    Streaming,
    Error,
    Done,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Idle => write!(f, "idle"),
            StreamStatus::Streaming => write!(f, "streaming"),
            StreamStatus::Error => write!(f, "error"),
            StreamStatus::Done => write!(f, "done"),
        }
    }
}

/// Append-only transcript shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    segments: Vec<String>,
}

impl Transcript {
    fn push(&mut self, segment: String) {
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }

    /// Segments appended after the first `seen` ones.
    pub fn since(&self, seen: usize) -> &[String] {
        self.segments.get(seen..).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The whole transcript as one string.
    pub fn text(&self) -> String {
        self.segments.concat()
    }
}

/// Options for [`StreamController::start`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Ask the server to drop conversation state before this turn.
    pub reset: bool,
}

/// Receiving end of every channel the controller opens.
#[derive(Debug)]
pub struct ChannelEvents {
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
}

impl ChannelEvents {
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelMessage> {
        self.rx.try_recv().ok()
    }
}

struct ActiveChannel {
    id: ChannelId,
    guard: Option<ChannelGuard>,
    /// Set once the server sent `done` or `error`.
    finished: bool,
}

impl ActiveChannel {
    fn close(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.close();
        }
    }
}

pub struct StreamController {
    transport: Arc<dyn AgentTransport>,
    sessions: Box<dyn SessionStore>,
    workdir: Option<String>,
    status: StreamStatus,
    output: Transcript,
    error: Option<String>,
    channel: Option<ActiveChannel>,
    next_channel: u64,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl StreamController {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        sessions: Box<dyn SessionStore>,
    ) -> (Self, ChannelEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            transport,
            sessions,
            workdir: None,
            status: StreamStatus::Idle,
            output: Transcript::default(),
            error: None,
            channel: None,
            next_channel: 0,
            tx,
        };
        (controller, ChannelEvents { rx })
    }

    /// Sends `workdir` along with every prompt.
    #[must_use]
    pub fn with_workdir(mut self, workdir: Option<String>) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn output(&self) -> &Transcript {
        &self.output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.status == StreamStatus::Streaming
    }

    /// The session id the next turn will continue.
    pub fn session_id(&mut self) -> SessionId {
        self.sessions.get()
    }

    /// Starts a new turn, replacing any open channel.
    ///
    /// The prompt is echoed into the transcript before anything is sent.
    /// Must be called within a Tokio runtime when the transport spawns its
    /// channel task, as [`crate::client::AgentClient`] does.
    pub fn start(&mut self, prompt: &str, options: StartOptions) {
        self.close_channel();
        self.error = None;
        self.status = StreamStatus::Streaming;

        let echo = if self.output.is_empty() {
            format!("{USER_PREFIX}{prompt}\n\n")
        } else {
            format!("\n\n{USER_PREFIX}{prompt}\n\n")
        };
        self.output.push(echo);

        self.next_channel += 1;
        let id = ChannelId(self.next_channel);
        let request = StreamRequest {
            prompt: prompt.to_string(),
            session_id: self.sessions.get(),
            reset: options.reset,
            workdir: self.workdir.clone(),
        };
        debug!(
            channel = %id,
            session_id = %request.session_id,
            reset = request.reset,
            "opening stream channel"
        );

        let guard = self
            .transport
            .open_stream(request, ChannelSink::new(id, self.tx.clone()));
        self.channel = Some(ActiveChannel {
            id,
            guard: Some(guard),
            finished: false,
        });
    }

    /// Cancels the current turn. Safe to call at any time.
    pub fn stop(&mut self) {
        self.close_channel();
        if self.status == StreamStatus::Streaming {
            self.status = StreamStatus::Done;
        }
    }

    /// Ends conversation continuity: the server forgets the current session
    /// and the next `start` uses a fresh id. Status and transcript are left
    /// untouched.
    pub async fn reset_session(&mut self) -> SessionId {
        let current = self.sessions.get();
        match tokio::time::timeout(RESET_TIMEOUT, self.transport.reset_session(&current)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(session_id = %current, error = %err, "session reset request failed");
            }
            Err(_) => warn!(session_id = %current, "session reset request timed out"),
        }
        let next = self.sessions.rotate();
        debug!(old = %current, new = %next, "session reset");
        next
    }

    /// Clears a stale error so the next `start` begins from a clean slate.
    /// Returns whether anything changed.
    pub fn clear_stale_error(&mut self) -> bool {
        let had_error = self.error.take().is_some();
        if self.status == StreamStatus::Error {
            self.status = StreamStatus::Done;
            return true;
        }
        had_error
    }

    /// Applies everything already queued on `events` without waiting.
    /// Returns how many messages were applied.
    pub fn apply_pending(&mut self, events: &mut ChannelEvents) -> usize {
        let mut applied = 0;
        while let Some(message) = events.try_recv() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    /// Routes one channel signal. Signals from channels other than the
    /// current one are dropped.
    pub fn apply(&mut self, message: ChannelMessage) {
        let Some(active) = self
            .channel
            .as_ref()
            .filter(|active| active.id == message.channel)
        else {
            trace!(channel = %message.channel, "dropping signal from stale channel");
            return;
        };
        let finished = active.finished;

        match message.signal {
            ChannelSignal::Opened => debug!(channel = %message.channel, "stream channel open"),
            ChannelSignal::Message(raw) => {
                if finished {
                    trace!(channel = %message.channel, "dropping message after turn finished");
                } else {
                    self.dispatch(protocol::decode(&raw));
                }
            }
            ChannelSignal::Disconnected(cause) => {
                self.on_disconnect(message.channel, finished, cause);
            }
        }
    }

    fn dispatch(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Chunk { text: Some(text) } => self.output.push(format!("{text}\n")),
            StreamEvent::Chunk { text: None } => {}
            StreamEvent::Done => {
                self.finish_channel();
                self.status = StreamStatus::Done;
            }
            StreamEvent::Error { message } => {
                self.finish_channel();
                self.error = Some(message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()));
                self.status = StreamStatus::Error;
            }
            StreamEvent::Meta(meta) => trace!(%meta, "stream meta"),
            StreamEvent::Unrecognized(raw) => self.output.push(format!("{raw}\n")),
            StreamEvent::Malformed(raw) => self.output.push(raw),
        }
    }

    fn on_disconnect(&mut self, id: ChannelId, finished: bool, cause: Option<TransportError>) {
        if finished {
            debug!(channel = %id, "channel closed after turn finished");
            return;
        }

        match &cause {
            Some(err) => warn!(channel = %id, kind = %err.kind, error = %err, "stream channel failed"),
            None => warn!(channel = %id, "stream channel closed before done"),
        }
        self.finish_channel();
        self.error = Some(CONNECTION_ERROR_MESSAGE.to_string());
        self.status = StreamStatus::Error;
    }

    /// Marks the current turn finished and closes its transport, keeping the
    /// channel id so its trailing signals are still recognized.
    fn finish_channel(&mut self) {
        if let Some(active) = self.channel.as_mut() {
            active.finished = true;
            active.close();
        }
    }

    fn close_channel(&mut self) {
        if let Some(mut active) = self.channel.take() {
            debug!(channel = %active.id, "closing stream channel");
            active.close();
        }
    }
}

impl fmt::Debug for StreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamController")
            .field("status", &self.status)
            .field("error", &self.error)
            .field("channel", &self.channel.as_ref().map(|c| c.id))
            .field("segments", &self.output.len())
            .finish_non_exhaustive()
    }
}
