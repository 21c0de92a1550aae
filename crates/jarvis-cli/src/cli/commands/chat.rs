//! Chat command handler.

use anyhow::Result;
use jarvis_core::session::FileSessionStore;

use super::{Settings, auth};
use crate::modes;

pub async fn run(settings: &Settings) -> Result<()> {
    let client = auth::connect(settings).await?;
    modes::chat::run_chat(
        client,
        Box::new(FileSessionStore::open_default()),
        settings.workdir.clone(),
    )
    .await
}
