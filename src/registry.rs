//! C8 SessionRegistry: maps join codes and session ids to a running
//! session's inbox handle, so the WebSocket layer can route an inbound
//! connection to the right actor without taking a global lock (§5
//! Concurrency model: the registry is the only state shared across
//! sessions, and it holds only routing information, never session state).

use crate::session::coordinator::SessionHandle;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct SessionRegistry {
    by_id: DashMap<String, SessionHandle>,
    id_by_join_code: DashMap<String, String>,
}

pub type SharedRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.id_by_join_code
            .insert(handle.join_code.clone(), handle.session_id.clone());
        self.by_id.insert(handle.session_id.clone(), handle);
    }

    pub fn get_by_id(&self, session_id: &str) -> Option<SessionHandle> {
        self.by_id.get(session_id).map(|entry| entry.clone())
    }

    pub fn get_by_join_code(&self, join_code: &str) -> Option<SessionHandle> {
        let session_id = self.id_by_join_code.get(join_code)?.clone();
        self.get_by_id(&session_id)
    }

    /// Removes a session once it has fully ended and its actor has shut
    /// down. The durable record remains; only the live routing entry is
    /// dropped.
    pub fn remove(&self, session_id: &str, join_code: &str) {
        self.by_id.remove(session_id);
        self.id_by_join_code.remove(join_code);
    }

    pub fn join_code_in_use(&self, join_code: &str) -> bool {
        self.id_by_join_code.contains_key(join_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(session_id: &str, join_code: &str) -> SessionHandle {
        let (tx, _rx) = mpsc::channel(8);
        SessionHandle {
            session_id: session_id.to_owned(),
            join_code: join_code.to_owned(),
            inbox: tx,
        }
    }

    #[test]
    fn routes_by_id_and_join_code() {
        let registry = SessionRegistry::new();
        registry.insert(handle("s1", "ABC123"));
        assert!(registry.get_by_id("s1").is_some());
        assert!(registry.get_by_join_code("ABC123").is_some());
        assert!(registry.get_by_join_code("ZZZZZZ").is_none());
    }

    #[test]
    fn remove_clears_both_indices() {
        let registry = SessionRegistry::new();
        registry.insert(handle("s1", "ABC123"));
        registry.remove("s1", "ABC123");
        assert!(registry.get_by_id("s1").is_none());
        assert!(registry.get_by_join_code("ABC123").is_none());
    }

    #[test]
    fn join_code_in_use_reflects_registry_state() {
        let registry = SessionRegistry::new();
        assert!(!registry.join_code_in_use("ABC123"));
        registry.insert(handle("s1", "ABC123"));
        assert!(registry.join_code_in_use("ABC123"));
    }
}
