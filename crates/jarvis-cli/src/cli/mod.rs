//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use jarvis_core::{config, logging};

mod commands;

#[derive(Parser)]
#[command(name = "jarvis")]
#[command(version)]
#[command(about = "Terminal client for a streaming Jarvis agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Agent server base URL (overrides config and JARVIS_SERVER_URL)
    #[arg(long, value_name = "URL", global = true)]
    server: Option<String>,

    /// Project directory the agent should work in
    #[arg(long, value_name = "DIR", global = true)]
    workdir: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sends one prompt and streams the reply to stdout
    Exec {
        /// The prompt to send to the agent
        #[arg(short, long)]
        prompt: String,

        /// Ask the server to drop conversation state first
        #[arg(long)]
        reset: bool,
    },

    /// Manage the conversation session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Show who the server thinks you are
    Whoami,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum SessionCommands {
    /// Print the current session id
    Show,
    /// Forget the conversation and start a new session
    Reset,
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        command,
        server,
        workdir,
    } = cli;

    let settings = || -> Result<commands::Settings> {
        let config = config::Config::load().context("load config")?;
        commands::Settings::resolve(&config, server.as_deref(), workdir.as_deref())
    };

    // default to chat mode
    let Some(command) = command else {
        return commands::chat::run(&settings()?).await;
    };

    match command {
        Commands::Exec { prompt, reset } => {
            commands::exec::run(&settings()?, &prompt, reset).await
        }

        Commands::Session { command } => match command {
            SessionCommands::Show => {
                commands::session::show();
                Ok(())
            }
            SessionCommands::Reset => commands::session::reset(&settings()?).await,
        },

        Commands::Whoami => commands::auth::whoami(&settings()?).await,

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
