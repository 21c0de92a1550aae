//! Auth command handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use jarvis_core::client::AgentClient;
use tracing::debug;

use super::Settings;

/// Builds a client for `settings`, logging in first when credentials are
/// configured.
pub async fn connect(settings: &Settings) -> Result<Arc<AgentClient>> {
    let client = AgentClient::new(&settings.server_url)?;

    if let Some(credentials) = &settings.credentials {
        client
            .login(credentials)
            .await
            .with_context(|| format!("log in to {} as {}", settings.server_url, credentials.email))?;
    } else {
        debug!("no credentials configured, skipping login");
    }

    Ok(Arc::new(client))
}

pub async fn whoami(settings: &Settings) -> Result<()> {
    let client = connect(settings).await?;
    let me = client
        .me()
        .await
        .with_context(|| format!("query {}", settings.server_url))?;

    match me.and_then(|auth| auth.email) {
        Some(email) => println!("{email}"),
        None => println!("Not signed in"),
    }
    Ok(())
}
