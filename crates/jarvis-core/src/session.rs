//! Session identity: the opaque id the server uses to correlate turns.
//!
//! Exactly one id is current at a time. It is created lazily, survives
//! restarts when backed by [`FileSessionStore`], and only changes through
//! [`SessionStore::rotate`].

use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{paths, write_atomic};

/// Opaque identifier of a logical conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates a fresh session id.
///
/// Prefers a random UUID v4. If the OS random source fails, falls back to the
/// current wall-clock time in milliseconds, which is less unique but never
/// fails.
pub fn generate_session_id() -> SessionId {
    let mut bytes = [0u8; 16];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => SessionId(
            uuid::Builder::from_random_bytes(bytes)
                .into_uuid()
                .to_string(),
        ),
        Err(err) => {
            warn!(error = %err, "random source unavailable, using timestamp session id");
            SessionId(chrono::Utc::now().timestamp_millis().to_string())
        }
    }
}

/// Owner of the current session id.
pub trait SessionStore: Send {
    /// Returns the current id, creating and persisting one if none exists.
    fn get(&mut self) -> SessionId;

    /// Replaces the current id with a freshly generated one and returns it.
    fn rotate(&mut self) -> SessionId;
}

/// Session store backed by a single file holding the id as text.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    current: Option<SessionId>,
}

impl FileSessionStore {
    /// Opens the store at `${JARVIS_HOME}/session_id`.
    pub fn open_default() -> Self {
        Self::open(paths::session_path())
    }

    /// Opens a store at `path`. Nothing is read or written until first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: None,
        }
    }

    fn read_persisted(&self) -> Option<SessionId> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                (!trimmed.is_empty()).then(|| SessionId::new(trimmed))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read session id");
                None
            }
        }
    }

    fn persist(&self, id: &SessionId) {
        // Keep the id in memory even if it cannot be written.
        if let Err(err) = write_atomic(&self.path, id.as_str()) {
            warn!(path = %self.path.display(), error = %format!("{err:#}"), "failed to persist session id");
        }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&mut self) -> SessionId {
        if let Some(id) = &self.current {
            return id.clone();
        }

        let id = if let Some(id) = self.read_persisted() {
            id
        } else {
            let id = generate_session_id();
            debug!(session_id = %id, "created session id");
            self.persist(&id);
            id
        };
        self.current = Some(id.clone());
        id
    }

    fn rotate(&mut self) -> SessionId {
        let id = generate_session_id();
        debug!(session_id = %id, "rotated session id");
        self.persist(&id);
        self.current = Some(id.clone());
        id
    }
}

/// In-memory session store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    current: Option<SessionId>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose current id is already `id`.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            current: Some(SessionId::new(id)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&mut self) -> SessionId {
        self.current.get_or_insert_with(generate_session_id).clone()
    }

    fn rotate(&mut self) -> SessionId {
        let id = generate_session_id();
        self.current = Some(id.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_generated_ids_are_uuids() {
        let id = generate_session_id();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn test_get_creates_and_persists_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session_id");
        let mut store = FileSessionStore::open(&path);

        let first = store.get();
        let second = store.get();

        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&path).unwrap(), first.as_str());
    }

    #[test]
    fn test_get_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session_id");

        let id = FileSessionStore::open(&path).get();
        let reopened = FileSessionStore::open(&path).get();

        assert_eq!(id, reopened);
    }

    #[test]
    fn test_get_reads_existing_trimmed_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session_id");
        fs::write(&path, "  abc-123\n").unwrap();

        let mut store = FileSessionStore::open(&path);

        assert_eq!(store.get(), SessionId::new("abc-123"));
    }

    #[test]
    fn test_blank_file_counts_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session_id");
        fs::write(&path, "\n").unwrap();

        let id = FileSessionStore::open(&path).get();

        assert!(!id.as_str().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), id.as_str());
    }

    #[test]
    fn test_rotate_replaces_persisted_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session_id");
        let mut store = FileSessionStore::open(&path);

        let old = store.get();
        let new = store.rotate();

        assert_ne!(old, new);
        assert_eq!(store.get(), new);
        assert_eq!(FileSessionStore::open(&path).get(), new);
    }

    #[test]
    fn test_unwritable_path_still_yields_stable_id() {
        let dir = tempdir().unwrap();
        // A directory in place of the file makes every write fail.
        let path = dir.path().join("session_id");
        fs::create_dir_all(path.join("blocker")).unwrap();
        let mut store = FileSessionStore::open(&path);

        let id = store.get();

        assert!(!id.as_str().is_empty());
        assert_eq!(store.get(), id);
    }

    #[test]
    fn test_memory_store_rotate() {
        let mut store = MemorySessionStore::with_id("fixed");
        assert_eq!(store.get(), SessionId::new("fixed"));

        let rotated = store.rotate();
        assert_ne!(rotated, SessionId::new("fixed"));
        assert_eq!(store.get(), rotated);
    }
}
