use dashmap::DashMap;
use std::sync::Arc;

use crate::models::SessionId;
use crate::session::SessionHandle;

/// Live sessions of one client
///
/// A session is inserted when it starts and removed when its read loop
/// exits. Thread-safe and designed for concurrent access across async tasks.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        tracing::debug!(session_id = %handle.id(), "Registering session");
        self.sessions.insert(handle.id(), handle);
    }

    pub fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn active_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Cancel every session; returns how many were cancelled
    pub fn cancel_all(&self) -> usize {
        self.cancel_matching(|_| true)
    }

    /// Cancel every session except `keep`
    pub fn cancel_except(&self, keep: &SessionId) -> usize {
        self.cancel_matching(|id| id != keep)
    }

    fn cancel_matching(&self, predicate: impl Fn(&SessionId) -> bool) -> usize {
        // Collect first: cancelling runs sink callbacks, which must not run
        // while a map shard is locked.
        let targets: Vec<SessionHandle> = self
            .sessions
            .iter()
            .filter(|entry| predicate(entry.key()) && !entry.value().is_terminal())
            .map(|entry| entry.value().clone())
            .collect();

        for handle in &targets {
            handle.cancel();
        }
        targets.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
