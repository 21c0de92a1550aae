//! Interactive line-based chat.
//!
//! One loop owns the controller and multiplexes stdin lines, channel
//! messages, SIGCONT and Ctrl+C. Plain lines are prompts; lines starting
//! with `/` are commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use jarvis_core::client::AgentClient;
use jarvis_core::controller::{StartOptions, StreamController};
use jarvis_core::session::SessionStore;
use jarvis_core::transport::AgentTransport;
use jarvis_core::visibility::{VisibilityMonitor, VisibilitySignals};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::render::TranscriptRenderer;

const HELP: &str = "\
Commands:
  /stop             stop the current reply
  /reset            forget the conversation and start a new session
  /fresh <prompt>   send a prompt with server-side state dropped first
  /status           show status and session id
  /whoami           show the signed-in user
  /logout           end the server auth session
  /help             show this help
  /quit             exit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Prompt(String),
    Fresh(String),
    Stop,
    Reset,
    Status,
    Whoami,
    Logout,
    Help,
    Quit,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Prompt(line.to_string());
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, rest)| (name, rest.trim()));
        match name {
            "stop" => Self::Stop,
            "reset" => Self::Reset,
            "fresh" if !rest.is_empty() => Self::Fresh(rest.to_string()),
            "status" => Self::Status,
            "whoami" => Self::Whoami,
            "logout" => Self::Logout,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

struct ChatSession {
    client: Arc<AgentClient>,
    controller: StreamController,
    renderer: TranscriptRenderer,
}

impl ChatSession {
    async fn handle(&mut self, command: ReplCommand) -> Flow {
        match command {
            ReplCommand::Empty => {}
            ReplCommand::Prompt(prompt) => self.send(&prompt, StartOptions::default()),
            ReplCommand::Fresh(prompt) => self.send(&prompt, StartOptions { reset: true }),
            ReplCommand::Stop => {
                if self.controller.is_streaming() {
                    self.controller.stop();
                    self.renderer.notice("Stopped.");
                }
            }
            ReplCommand::Reset => {
                let id = self.controller.reset_session().await;
                self.renderer.notice(&format!("New session: {id}"));
            }
            ReplCommand::Status => {
                let status = self.controller.status();
                let id = self.controller.session_id();
                self.renderer
                    .notice(&format!("status: {status}, session: {id}"));
                if let Some(error) = self.controller.error() {
                    let line = format!("last error: {error}");
                    self.renderer.notice(&line);
                }
            }
            ReplCommand::Whoami => match self.client.me().await {
                Ok(Some(auth)) => {
                    let email = auth.email.unwrap_or_else(|| "(unknown)".to_string());
                    self.renderer.notice(&format!("Signed in as {email}"));
                }
                Ok(None) => self.renderer.notice("Not signed in"),
                Err(err) => self.renderer.notice(&format!("whoami failed: {err}")),
            },
            ReplCommand::Logout => match self.client.logout().await {
                Ok(()) => self.renderer.notice("Logged out."),
                Err(err) => self.renderer.notice(&format!("logout failed: {err}")),
            },
            ReplCommand::Help => self.renderer.notice(HELP),
            ReplCommand::Quit => {
                self.controller.stop();
                return Flow::Quit;
            }
            ReplCommand::Unknown(line) => {
                self.renderer
                    .notice(&format!("Unknown command: {line} (try /help)"));
            }
        }
        Flow::Continue
    }

    fn send(&mut self, prompt: &str, options: StartOptions) {
        if self.controller.is_streaming() {
            self.renderer
                .notice("A reply is still streaming; wait or /stop it first.");
            return;
        }
        self.controller.start(prompt, options);
        self.renderer.render(self.controller.output());
    }
}

/// Runs the interactive loop until `/quit`, end of input, or Ctrl+C while
/// idle.
///
/// # Errors
/// Returns an error if stdin or the Ctrl+C handler fails.
pub async fn run_chat(
    client: Arc<AgentClient>,
    sessions: Box<dyn SessionStore>,
    workdir: Option<String>,
) -> Result<()> {
    let (controller, mut events) =
        StreamController::new(Arc::clone(&client) as Arc<dyn AgentTransport>, sessions);
    let mut chat = ChatSession {
        client,
        controller: controller.with_workdir(workdir),
        renderer: TranscriptRenderer::stdio(),
    };
    let mut visibility = VisibilitySignals::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let session_id = chat.controller.session_id();
    chat.renderer.notice(&format!(
        "Connected to {} (session {session_id}). Type /help for commands.",
        chat.client.base_url()
    ));
    chat.renderer.prompt();

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("read stdin")? {
                    Some(line) => {
                        if let Flow::Quit = chat.handle(ReplCommand::parse(&line)).await {
                            break;
                        }
                        if !chat.controller.is_streaming() {
                            chat.renderer.prompt();
                        }
                    }
                    None => stdin_open = false,
                }
            }
            Some(message) = events.recv() => {
                let was_streaming = chat.controller.is_streaming();
                chat.controller.apply(message);
                chat.renderer.render(chat.controller.output());
                if was_streaming && !chat.controller.is_streaming() {
                    chat.renderer
                        .turn_finished(chat.controller.status(), chat.controller.error());
                    if stdin_open {
                        chat.renderer.prompt();
                    }
                }
            }
            visible = visibility.recv() => {
                if VisibilityMonitor::observe(visible, &mut chat.controller) {
                    chat.renderer.notice("Connection error cleared.");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("listen for Ctrl+C")?;
                if chat.controller.is_streaming() {
                    chat.controller.stop();
                    chat.renderer.notice("^C Stopped.");
                    chat.renderer.prompt();
                } else {
                    break;
                }
            }
        }

        // End of input: let the current reply finish, then leave.
        if !stdin_open && !chat.controller.is_streaming() {
            break;
        }
    }

    chat.renderer.finish();
    Ok(())
}
