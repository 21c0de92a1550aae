//! Configuration management for Jarvis.
//!
//! Loads configuration from ${JARVIS_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for Jarvis configuration and data files.
    //!
    //! JARVIS_HOME resolution order:
    //! 1. JARVIS_HOME environment variable (if set)
    //! 2. ~/.config/jarvis (default)
    //! 3. ./.jarvis when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the Jarvis home directory.
    pub fn jarvis_home() -> PathBuf {
        if let Ok(home) = std::env::var("JARVIS_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".jarvis"),
            |h| h.join(".config").join("jarvis"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        jarvis_home().join("config.toml")
    }

    /// Returns the file holding the current conversation session id.
    pub fn session_path() -> PathBuf {
        jarvis_home().join("session_id")
    }

    /// Returns the directory log files are written to.
    pub fn logs_dir() -> PathBuf {
        jarvis_home().join("logs")
    }
}

/// Credentials for the bridge's cookie-based auth session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Resolved login credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the agent bridge server
    pub server_url: String,

    /// Optional project directory forwarded with each prompt
    pub workdir: Option<String>,

    /// Auth credentials
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: Self::DEFAULT_SERVER_URL.to_string(),
            workdir: None,
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    pub const DEFAULT_SERVER_URL: &str = "http://localhost:8787";

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Resolves the server URL with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the chosen URL does not parse.
    pub fn effective_server_url(&self) -> Result<String> {
        let env_url = std::env::var("JARVIS_SERVER_URL").ok();
        let chosen = [env_url.as_deref(), Some(self.server_url.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|url| !url.is_empty())
            .unwrap_or(Self::DEFAULT_SERVER_URL);

        url::Url::parse(chosen).with_context(|| format!("Invalid server URL: {chosen}"))?;
        Ok(chosen.trim_end_matches('/').to_string())
    }

    /// Returns the configured workdir, ignoring blank values.
    pub fn effective_workdir(&self) -> Option<&str> {
        self.workdir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
    }

    /// Resolves login credentials with precedence: env > config.
    ///
    /// Returns `None` unless both an email and a password are available.
    pub fn credentials(&self) -> Option<Credentials> {
        let env_email = std::env::var("JARVIS_AUTH_EMAIL").ok();
        let env_password = std::env::var("JARVIS_AUTH_PASSWORD").ok();
        self.resolve_credentials(env_email.as_deref(), env_password.as_deref())
    }

    fn resolve_credentials(
        &self,
        env_email: Option<&str>,
        env_password: Option<&str>,
    ) -> Option<Credentials> {
        fn pick(from_env: Option<&str>, configured: Option<&str>) -> Option<String> {
            [from_env, configured]
                .into_iter()
                .flatten()
                .find(|v| !v.trim().is_empty())
                .map(ToString::to_string)
        }

        let email = pick(env_email, self.auth.email.as_deref())?;
        let password = pick(env_password, self.auth.password.as_deref())?;
        Some(Credentials {
            email: email.trim().to_string(),
            password,
        })
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        write_atomic(path, default_config_template())
    }
}

/// Writes content to a file, creating parent directories as needed.
/// Uses atomic write (temp file + rename) to prevent corruption.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, content)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            tmp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
