//! In-memory session store
//!
//! Sessions live for the lifetime of the process. Each entry serializes its
//! own mutations behind a mutex held only while the session is touched, and
//! carries a separate generation lock so at most one document write per
//! session is in flight.

use formfill_core::{FormFillError, Session};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

pub struct SessionEntry {
    session: Mutex<Session>,
    generation: Mutex<()>,
    /// Source document the session's schema was extracted from
    document: Arc<Vec<u8>>,
}

impl SessionEntry {
    /// Run `f` with shared access to the session
    pub async fn read<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        let session = self.session.lock().await;
        f(&session)
    }

    /// Run `f` with exclusive access to the session
    pub async fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.lock().await;
        f(&mut session)
    }

    pub fn document(&self) -> Arc<Vec<u8>> {
        self.document.clone()
    }

    /// Held for the whole fill-and-write of a generation request
    pub async fn generation_lock(&self) -> MutexGuard<'_, ()> {
        self.generation.lock().await
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionEntry>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session, document: Arc<Vec<u8>>) -> Arc<SessionEntry> {
        let id = session.session_id.clone();
        let entry = Arc::new(SessionEntry {
            session: Mutex::new(session),
            generation: Mutex::new(()),
            document,
        });
        self.sessions.write().await.insert(id.clone(), entry.clone());
        tracing::info!(session_id = %id, "Created form session");
        entry
    }

    pub async fn get(&self, id: &str) -> Result<Arc<SessionEntry>, FormFillError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| FormFillError::SessionNotFound(id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
