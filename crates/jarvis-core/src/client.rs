//! HTTP client for the agent bridge server.
//!
//! Streams turns over SSE, resets sessions, and wraps the cookie-based auth
//! endpoints. Auth state lives in the client's cookie jar, so one
//! `AgentClient` should be shared for the lifetime of a run.

use std::pin::pin;

use anyhow::{Context, Result};
use eventsource_stream::Eventsource;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::config::Credentials;
use crate::session::SessionId;
use crate::transport::{
    AgentTransport, ChannelGuard, ChannelSink, StreamRequest, TransportError, TransportErrorKind,
    TransportResult, server_detail,
};

pub const USER_AGENT: &str = concat!("jarvis/", env!("CARGO_PKG_VERSION"));

const STREAM_PATH: &str = "/api/agent/stream";
const RESET_PATH: &str = "/api/agent/session/reset";
const LOGIN_PATH: &str = "/api/auth/login";
const LOGOUT_PATH: &str = "/api/auth/logout";
const ME_PATH: &str = "/api/auth/me";

/// Default SSE event name; only these are forwarded.
const MESSAGE_EVENT: &str = "message";

/// Who the server thinks we are.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthStatus {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
}

impl AgentClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        Url::parse(base_url).with_context(|| format!("Invalid server URL: {base_url}"))?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint<'a>(
        &self,
        path: &str,
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> TransportResult<Url> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url)).map_err(|err| {
            TransportError::new(
                TransportErrorKind::Connect,
                format!("Invalid URL for {path}: {err}"),
            )
        })?;
        let mut params = params.into_iter().peekable();
        if params.peek().is_some() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Builds the streaming URL for one turn.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be formed.
    pub fn stream_url(&self, request: &StreamRequest) -> TransportResult<Url> {
        let mut params = vec![
            ("prompt", request.prompt.as_str()),
            ("session_id", request.session_id.as_str()),
        ];
        if request.reset {
            params.push(("reset", "true"));
        }
        if let Some(workdir) = request.workdir.as_deref() {
            params.push(("workdir", workdir));
        }
        self.endpoint(STREAM_PATH, params)
    }

    /// Builds the session reset URL.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be formed.
    pub fn reset_url(&self, session_id: &SessionId) -> TransportResult<Url> {
        self.endpoint(RESET_PATH, [("session_id", session_id.as_str())])
    }

    /// Logs in and stores the session cookie.
    ///
    /// # Errors
    /// Returns an error if the server rejects the credentials or cannot be
    /// reached.
    pub async fn login(&self, credentials: &Credentials) -> TransportResult<AuthStatus> {
        let url = self.endpoint(LOGIN_PATH, [])?;
        let response = self
            .http
            .post(url)
            .json(&LoginBody {
                email: &credentials.email,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = server_detail(&body).unwrap_or_else(|| "Login failed".to_string());
            return Err(TransportError {
                message,
                ..TransportError::http_status(status.as_u16(), &body)
            });
        }

        let auth = response
            .json::<AuthStatus>()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        debug!(email = ?auth.email, "logged in");
        Ok(auth)
    }

    /// Ends the server-side auth session. Errors from the server are ignored.
    ///
    /// # Errors
    /// Returns an error only if the server cannot be reached.
    pub async fn logout(&self) -> TransportResult<()> {
        let url = self.endpoint(LOGOUT_PATH, [])?;
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        debug!(status = response.status().as_u16(), "logged out");
        Ok(())
    }

    /// Returns the signed-in user, or `None` when not authenticated.
    ///
    /// # Errors
    /// Returns an error only if the server cannot be reached.
    pub async fn me(&self) -> TransportResult<Option<AuthStatus>> {
        let url = self.endpoint(ME_PATH, [])?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        if !response.status().is_success() {
            trace!(status = response.status().as_u16(), "not authenticated");
            return Ok(None);
        }
        Ok(response.json::<AuthStatus>().await.ok())
    }
}

impl AgentTransport for AgentClient {
    fn open_stream(&self, request: StreamRequest, sink: ChannelSink) -> ChannelGuard {
        let token = CancellationToken::new();
        let guard = ChannelGuard::new(token.clone());
        let http = self.http.clone();
        let url = self.stream_url(&request);

        tokio::spawn(async move {
            let channel = sink.channel();
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(%channel, "stream channel cancelled");
                }
                cause = pump_stream(&http, url, &sink) => {
                    if !token.is_cancelled() {
                        sink.disconnected(cause);
                    }
                }
            }
        });

        guard
    }

    fn reset_session(&self, session_id: &SessionId) -> BoxFuture<'static, TransportResult<()>> {
        let http = self.http.clone();
        let url = self.reset_url(session_id);

        async move {
            let response = http
                .get(url?)
                .send()
                .await
                .map_err(|e| TransportError::from_reqwest(&e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransportError::http_status(status.as_u16(), &body));
            }
            Ok(())
        }
        .boxed()
    }
}

/// Runs one SSE connection, forwarding default-type messages to `sink`.
///
/// Returns the disconnect cause: `None` when the server ended the body,
/// `Some` for any failure.
async fn pump_stream(
    http: &reqwest::Client,
    url: TransportResult<Url>,
    sink: &ChannelSink,
) -> Option<TransportError> {
    let url = match url {
        Ok(url) => url,
        Err(err) => return Some(err),
    };

    let response = match http
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => return Some(TransportError::from_reqwest(&err)),
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Some(TransportError::http_status(status.as_u16(), &body));
    }

    if !sink.opened() {
        return None;
    }

    let mut events = pin!(response.bytes_stream().eventsource());
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                let is_message = event.event.is_empty() || event.event == MESSAGE_EVENT;
                if !is_message || event.data.is_empty() {
                    trace!(event = %event.event, "skipping sse event");
                    continue;
                }
                if !sink.message(event.data) {
                    return None;
                }
            }
            Err(err) => {
                return Some(TransportError::stream(format!("SSE stream error: {err}")));
            }
        }
    }

    None
}
