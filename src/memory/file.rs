//! Append-only JSON-lines session store.
//!
//! One serialized [`SessionTurn`] per line. Reads scan the whole file;
//! the store is meant for single-user CLI sessions, not large histories.
//! Inserts hold an exclusive lock on the file itself, so separate processes
//! sharing one path cannot persist the same turn number twice.

use super::SessionStore;
use crate::error::MemoryError;
use crate::models::SessionTurn;
use async_trait::async_trait;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

pub struct JsonlSessionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All turns of one session in file order.
    async fn load_session(&self, session_id: &str) -> Result<Vec<SessionTurn>, MemoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_session(&content, session_id, &self.path))
    }
}

/// Turns of `session_id` found in `content`. Unreadable lines are skipped.
fn parse_session(content: &str, session_id: &str, path: &Path) -> Vec<SessionTurn> {
    let mut turns = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<SessionTurn>(line) {
            Ok(turn) if turn.session_id == session_id => turns.push(turn),
            Ok(_) => {}
            Err(e) => warn!(
                "Skipping unreadable line {} in {}: {}",
                index + 1,
                path.display(),
                e
            ),
        }
    }
    turns
}

/// Check-and-append under an exclusive OS lock on the store file.
fn append_locked(path: &Path, turn: &SessionTurn) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let mut lock = fd_lock::RwLock::new(file);
    let mut guard = lock.write()?;

    let mut content = String::new();
    guard.read_to_string(&mut content)?;
    let taken = parse_session(&content, &turn.session_id, path)
        .iter()
        .any(|t| t.turn_number == turn.turn_number);
    if taken {
        return Err(MemoryError::DuplicateTurn {
            session_id: turn.session_id.clone(),
            turn_number: turn.turn_number,
        });
    }

    let mut line = serde_json::to_string(turn)?;
    line.push('\n');
    guard.write_all(line.as_bytes())?;
    guard.flush()?;
    Ok(())
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    async fn recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionTurn>, MemoryError> {
        let mut turns = self.load_session(session_id).await?;
        turns.sort_by(|a, b| b.turn_number.cmp(&a.turn_number));
        turns.truncate(limit);
        Ok(turns)
    }

    async fn last_turn_number(&self, session_id: &str) -> Result<Option<u64>, MemoryError> {
        let turns = self.load_session(session_id).await?;
        Ok(turns.iter().map(|t| t.turn_number).max())
    }

    async fn insert(&self, turn: SessionTurn) -> Result<(), MemoryError> {
        // In-process writers queue here before taking the file lock.
        let _guard = self.write_lock.lock().await;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_locked(&path, &turn))
            .await
            .map_err(|e| MemoryError::Io(std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::draft;
    use crate::memory::SessionMemory;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_turns_survive_reopening() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions").join("turns.jsonl");

        let store = JsonlSessionStore::new(&path);
        store.insert(draft("s", "q1").into_turn(1)).await.unwrap();
        store.insert(draft("other", "x").into_turn(1)).await.unwrap();
        store.insert(draft("s", "q2").into_turn(2)).await.unwrap();

        let reopened = JsonlSessionStore::new(&path);
        let turns = reopened.recent_turns("s", 5).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].query, "q2");
        assert_eq!(reopened.last_turn_number("s").await.unwrap(), Some(2));
        assert_eq!(reopened.last_turn_number("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_line_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonlSessionStore::new(dir.path().join("turns.jsonl"));

        store.insert(draft("s", "q1").into_turn(1)).await.unwrap();
        let err = store.insert(draft("s", "again").into_turn(1)).await.unwrap_err();
        assert!(matches!(err, MemoryError::DuplicateTurn { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("turns.jsonl");
        let store = JsonlSessionStore::new(&path);
        store.insert(draft("s", "q1").into_turn(1)).await.unwrap();

        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n");
        std::fs::write(&path, content).unwrap();

        assert_eq!(store.recent_turns("s", 5).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_independent_stores_on_one_path_never_share_a_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.jsonl");

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let path = path.clone();
                tokio::spawn(async move {
                    let memory = SessionMemory::new(Arc::new(JsonlSessionStore::new(path)));
                    memory.append(draft("s", &format!("q{}", n))).await
                })
            })
            .collect();

        let mut allocated = Vec::new();
        for handle in handles {
            if let Ok(number) = handle.await.unwrap() {
                allocated.push(number);
            }
        }
        assert!(!allocated.is_empty());

        let stored = JsonlSessionStore::new(&path).recent_turns("s", 100).await.unwrap();
        let mut numbers: Vec<u64> = stored.iter().map(|t| t.turn_number).collect();
        numbers.sort_unstable();
        let mut unique = numbers.clone();
        unique.dedup();
        assert_eq!(numbers, unique);
        assert_eq!(numbers.len(), allocated.len());
    }

    #[tokio::test]
    async fn test_session_memory_over_file_store() {
        let dir = TempDir::new().unwrap();
        let memory = SessionMemory::new(Arc::new(JsonlSessionStore::new(dir.path().join("t.jsonl"))));

        assert_eq!(memory.append(draft("s", "q1")).await.unwrap(), 1);
        assert_eq!(memory.append(draft("s", "q2")).await.unwrap(), 2);
    }
}
