//! Push-channel seam between the stream controller and the network.
//!
//! A transport opens one channel per turn. The channel's task reports what it
//! sees through a [`ChannelSink`]; the controller owns the receiving end and
//! closes the channel through the returned [`ChannelGuard`].

use std::fmt;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::SessionId;

/// Parameters of one streamed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub prompt: String,
    pub session_id: SessionId,
    /// Ask the server to drop conversation state before this turn.
    pub reset: bool,
    /// Project directory the agent should work in.
    pub workdir: Option<String>,
}

/// Identifies one opened channel within a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a channel task observed.
#[derive(Debug)]
pub enum ChannelSignal {
    /// The server accepted the stream.
    Opened,
    /// One raw message payload.
    Message(String),
    /// The stream ended or failed. `None` means the server closed it.
    Disconnected(Option<TransportError>),
}

/// A signal tagged with the channel it came from.
#[derive(Debug)]
pub struct ChannelMessage {
    pub channel: ChannelId,
    pub signal: ChannelSignal,
}

/// Sending half handed to a transport for one channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    channel: ChannelId,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl ChannelSink {
    pub fn new(channel: ChannelId, tx: mpsc::UnboundedSender<ChannelMessage>) -> Self {
        Self { channel, tx }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Returns `false` once nobody is listening anymore.
    pub fn opened(&self) -> bool {
        self.send(ChannelSignal::Opened)
    }

    /// Returns `false` once nobody is listening anymore.
    pub fn message(&self, raw: impl Into<String>) -> bool {
        self.send(ChannelSignal::Message(raw.into()))
    }

    /// Returns `false` once nobody is listening anymore.
    pub fn disconnected(&self, cause: Option<TransportError>) -> bool {
        self.send(ChannelSignal::Disconnected(cause))
    }

    fn send(&self, signal: ChannelSignal) -> bool {
        self.tx
            .send(ChannelMessage {
                channel: self.channel,
                signal,
            })
            .is_ok()
    }
}

/// Closes its channel when asked or when dropped.
#[derive(Debug)]
pub struct ChannelGuard {
    token: CancellationToken,
}

impl ChannelGuard {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Closes the channel. Safe to call any number of times.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Network side of the controller.
pub trait AgentTransport: Send + Sync {
    /// Opens a push channel for `request`. Everything the channel sees goes
    /// through `sink` in arrival order until the guard is closed.
    ///
    /// Implementations may spawn onto the ambient Tokio runtime, so this must
    /// be called from within one.
    fn open_stream(&self, request: StreamRequest, sink: ChannelSink) -> ChannelGuard;

    /// Asks the server to discard continuation state for `session_id`.
    fn reset_session(&self, session_id: &SessionId) -> BoxFuture<'static, TransportResult<()>>;
}

/// Categories of transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not reach the server or send the request
    Connect,
    /// Server answered with a non-success status
    HttpStatus,
    /// The response body broke mid-stream
    Stream,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::HttpStatus => write!(f, "http_status"),
            TransportErrorKind::Stream => write!(f, "stream"),
        }
    }
}

/// Structured transport error with kind and details.
#[derive(Debug, Clone)]
pub struct TransportError {
    /// Error category
    pub kind: TransportErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
    /// HTTP status, when the server answered
    pub status: Option<u16>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            status: None,
        }
    }

    /// Classifies a reqwest failure that happened before any response.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(TransportErrorKind::Connect, format!("Request timed out: {err}"))
        } else if err.is_connect() {
            Self::new(TransportErrorKind::Connect, format!("Connection failed: {err}"))
        } else if err.is_body() || err.is_decode() {
            Self::new(TransportErrorKind::Stream, format!("Body error: {err}"))
        } else {
            Self::new(TransportErrorKind::Connect, format!("Network error: {err}"))
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Stream, message)
    }

    /// Creates an HTTP status error, lifting the server's `detail` or
    /// `error.message` into the summary when the body is JSON.
    pub fn http_status(status: u16, body: &str) -> Self {
        let detail = server_detail(body);

        Self {
            kind: TransportErrorKind::HttpStatus,
            message: match &detail {
                Some(detail) => format!("HTTP {status}: {detail}"),
                None => format!("HTTP {status}"),
            },
            details: (!body.is_empty()).then(|| body.to_string()),
            status: Some(status),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// Pulls a human-readable reason out of a JSON error body.
pub(crate) fn server_detail(body: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(body).ok()?;
    json.get("detail")
        .and_then(Value::as_str)
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
        })
        .map(ToString::to_string)
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
