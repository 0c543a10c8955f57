//! Session memory.
//!
//! Turns are appended per session and numbered monotonically. The
//! [`SessionStore`] trait is the persistence seam; [`SessionMemory`] sits
//! on top of it and owns turn-number allocation.

pub mod file;
pub mod store;

use crate::error::MemoryError;
use crate::models::{SessionTurn, TurnDraft};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use file::JsonlSessionStore;
pub use store::InMemorySessionStore;

/// Persistence contract for session turns.
///
/// Implementations must reject a second turn with the same
/// `(session_id, turn_number)` instead of overwriting the first.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Up to `limit` turns of a session, newest first.
    async fn recent_turns(&self, session_id: &str, limit: usize)
        -> Result<Vec<SessionTurn>, MemoryError>;

    /// Highest turn number stored for a session, if any.
    async fn last_turn_number(&self, session_id: &str) -> Result<Option<u64>, MemoryError>;

    /// Append a turn.
    ///
    /// # Errors
    /// `MemoryError::DuplicateTurn` if the number is already taken.
    async fn insert(&self, turn: SessionTurn) -> Result<(), MemoryError>;
}

/// Turn history with serialized number allocation per session.
pub struct SessionMemory {
    store: Arc<dyn SessionStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionMemory {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Session memory backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySessionStore::new()))
    }

    /// Up to `limit` recent turns, newest first.
    pub async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<SessionTurn>, MemoryError> {
        self.store.recent_turns(session_id, limit).await
    }

    /// Number a draft and persist it. Returns the allocated turn number.
    ///
    /// Allocation is serialized per session inside this process. A collision
    /// with another writer on the same store is retried once with a fresh
    /// number.
    pub async fn append(&self, draft: TurnDraft) -> Result<u64, MemoryError> {
        let session_id = draft.session_id.clone();
        let lock = self.session_lock(&session_id).await;

        let result = {
            let _guard = lock.lock().await;
            self.allocate_and_insert(draft).await
        };

        self.release_session_lock(&session_id, lock).await;
        result
    }

    async fn allocate_and_insert(&self, draft: TurnDraft) -> Result<u64, MemoryError> {
        let number = self.next_number(&draft.session_id).await?;
        match self.store.insert(draft.clone().into_turn(number)).await {
            Ok(()) => {
                debug!("Persisted turn {} for session {}", number, draft.session_id);
                Ok(number)
            }
            Err(MemoryError::DuplicateTurn { turn_number, .. }) => {
                warn!(
                    "Turn {} already taken in session {}, retrying",
                    turn_number, draft.session_id
                );
                let retry = self.next_number(&draft.session_id).await?;
                let session_id = draft.session_id.clone();
                self.store.insert(draft.into_turn(retry)).await?;
                debug!("Persisted turn {} for session {}", retry, session_id);
                Ok(retry)
            }
            Err(e) => Err(e),
        }
    }

    async fn next_number(&self, session_id: &str) -> Result<u64, MemoryError> {
        Ok(self.store.last_turn_number(session_id).await?.map_or(1, |n| n + 1))
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no other caller holds or awaits it.
    async fn release_session_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map plus ours.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    async fn tracked_sessions(&self) -> usize {
        self.locks.lock().await.len()
    }
}
