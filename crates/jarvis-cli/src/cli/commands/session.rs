//! Session command handlers.

use std::sync::Arc;

use anyhow::Result;
use jarvis_core::controller::StreamController;
use jarvis_core::session::{FileSessionStore, SessionStore};
use jarvis_core::transport::AgentTransport;

use super::{Settings, auth};

pub fn show() {
    let mut store = FileSessionStore::open_default();
    println!("{}", store.get());
}

pub async fn reset(settings: &Settings) -> Result<()> {
    let client = auth::connect(settings).await?;
    let (mut controller, _events) = StreamController::new(
        client as Arc<dyn AgentTransport>,
        Box::new(FileSessionStore::open_default()),
    );

    let id = controller.reset_session().await;
    println!("{id}");
    Ok(())
}
