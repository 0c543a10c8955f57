//! In-memory session store.

use super::SessionStore;
use crate::error::MemoryError;
use crate::models::SessionTurn;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Turns kept in process memory, keyed by session and turn number.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, BTreeMap<u64, SessionTurn>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionTurn>, MemoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|turns| turns.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn last_turn_number(&self, session_id: &str) -> Result<Option<u64>, MemoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .and_then(|turns| turns.keys().next_back().copied()))
    }

    async fn insert(&self, turn: SessionTurn) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().await;
        let turns = sessions.entry(turn.session_id.clone()).or_default();

        if turns.contains_key(&turn.turn_number) {
            return Err(MemoryError::DuplicateTurn {
                session_id: turn.session_id,
                turn_number: turn.turn_number,
            });
        }

        turns.insert(turn.turn_number, turn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::draft;

    #[tokio::test]
    async fn test_duplicate_turn_is_rejected() {
        let store = InMemorySessionStore::new();
        store.insert(draft("s", "first").into_turn(1)).await.unwrap();

        let err = store.insert(draft("s", "second").into_turn(1)).await.unwrap_err();
        assert!(matches!(err, MemoryError::DuplicateTurn { turn_number: 1, .. }));

        let turns = store.recent_turns("s", 5).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].query, "first");
    }

    #[tokio::test]
    async fn test_recent_turns_respects_limit() {
        let store = InMemorySessionStore::new();
        for n in 1..=7 {
            store.insert(draft("s", &format!("q{}", n)).into_turn(n)).await.unwrap();
        }

        let turns = store.recent_turns("s", 5).await.unwrap();
        let numbers: Vec<u64> = turns.iter().map(|t| t.turn_number).collect();
        assert_eq!(numbers, vec![7, 6, 5, 4, 3]);
        assert_eq!(store.last_turn_number("s").await.unwrap(), Some(7));
        assert_eq!(store.last_turn_number("unknown").await.unwrap(), None);
        assert!(store.recent_turns("unknown", 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = InMemorySessionStore::new();

        tokio_test::block_on(async {
            store.insert(draft("a", "qa").into_turn(1)).await.unwrap();
            store.insert(draft("b", "qb").into_turn(1)).await.unwrap();

            let a = store.recent_turns("a", 5).await.unwrap();
            assert_eq!(a.len(), 1);
            assert_eq!(a[0].query, "qa");
            assert_eq!(store.last_turn_number("b").await.unwrap(), Some(1));
        });
    }
}
