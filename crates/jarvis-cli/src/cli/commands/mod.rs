//! CLI command handlers.

pub mod auth;
pub mod chat;
pub mod config;
pub mod exec;
pub mod session;

use anyhow::Result;
use jarvis_core::config::{Config, Credentials};

/// Connection settings after flags, env and config are merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    pub workdir: Option<String>,
    pub credentials: Option<Credentials>,
}

impl Settings {
    /// Flags win over env, env over the config file.
    pub fn resolve(config: &Config, server: Option<&str>, workdir: Option<&str>) -> Result<Self> {
        let server_url = match server.map(str::trim).filter(|s| !s.is_empty()) {
            Some(server) => server.trim_end_matches('/').to_string(),
            None => config.effective_server_url()?,
        };
        let workdir = workdir
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .or_else(|| config.effective_workdir())
            .map(ToString::to_string);

        Ok(Self {
            server_url,
            workdir,
            credentials: config.credentials(),
        })
    }
}
