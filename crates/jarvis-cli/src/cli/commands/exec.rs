//! Exec command handler.

use anyhow::{Context, Result};
use jarvis_core::session::FileSessionStore;

use super::{Settings, auth};
use crate::modes;

pub async fn run(settings: &Settings, prompt: &str, reset: bool) -> Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("Prompt must not be empty");
    }

    let client = auth::connect(settings).await?;
    let options = modes::exec::ExecOptions {
        workdir: settings.workdir.clone(),
        reset,
    };

    modes::exec::run_exec(
        client,
        Box::new(FileSessionStore::open_default()),
        prompt,
        &options,
    )
    .await
    .context("execute prompt")
}
