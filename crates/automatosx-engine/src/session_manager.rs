//! Session lifecycle and debounced disk persistence: writes coalesce
//! in memory and flush to a JSON file on a debounce timer rather than
//! on every mutation.

use automatosx_types::{Error, Result, Session, SessionStatus, SharedData};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

pub const MAX_SESSIONS: usize = 100;
const PERSIST_DEBOUNCE: Duration = Duration::from_millis(100);

struct Inner {
    sessions: HashMap<String, Session>,
}

pub struct SessionManager {
    inner: Arc<Mutex<Inner>>,
    persist_path: Option<PathBuf>,
    persist_tx: Option<mpsc::UnboundedSender<()>>,
}

impl SessionManager {
    /// Loads existing sessions from `persist_path` if given (malformed
    /// entries are dropped with a warning, not fatal), then spawns the
    /// debounced writer task.
    pub async fn new(persist_path: Option<PathBuf>) -> Self {
        let sessions = match &persist_path {
            Some(path) => load_sessions(path).await,
            None => HashMap::new(),
        };
        let inner = Arc::new(Mutex::new(Inner { sessions }));

        let persist_tx = persist_path.as_ref().map(|path| {
            let (tx, mut rx) = mpsc::unbounded_channel::<()>();
            let inner = inner.clone();
            let path = path.clone();
            tokio::spawn(async move {
                while rx.recv().await.is_some() {
                    // Drain any additional pending signals so a burst of
                    // mutations collapses into a single debounced write.
                    tokio::time::sleep(PERSIST_DEBOUNCE).await;
                    while rx.try_recv().is_ok() {}
                    let snapshot: Vec<Session> = inner.lock().await.sessions.values().cloned().collect();
                    if let Err(err) = persist_sessions(&path, &snapshot).await {
                        warn!(error = %err, "failed to persist sessions; will retry on next mutation");
                    }
                }
            });
            tx
        });

        Self {
            inner,
            persist_path,
            persist_tx,
        }
    }

    pub async fn in_memory() -> Self {
        Self::new(None).await
    }

    fn schedule_persist(&self) {
        if let Some(tx) = &self.persist_tx {
            let _ = tx.send(());
        }
    }

    pub async fn create_session(&self, task: &str, initiator: &str) -> Session {
        let session = Session::new(initiator, task);
        let mut guard = self.inner.lock().await;
        guard.sessions.insert(session.id.clone(), session.clone());
        drop(guard);
        self.evict_if_over_capacity().await;
        self.schedule_persist();
        session
    }

    /// Idempotent append.
    pub async fn add_agent(&self, session_id: &str, name: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let session = guard
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::session_not_found(session_id))?;
        let added = session.add_agent(name);
        drop(guard);
        if added {
            self.schedule_persist();
        }
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Option<Session> {
        self.inner.lock().await.sessions.get(id).cloned()
    }

    pub async fn get_active_sessions(&self) -> Vec<Session> {
        self.inner
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    /// Reverse chronological by `updated_at`.
    pub async fn get_active_sessions_for_agent(&self, name: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .inner
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.is_active() && s.agents.iter().any(|a| a == name))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Idempotent terminal transition: a no-op with a warning if
    /// already terminal.
    pub async fn complete_session(&self, id: &str) -> Result<()> {
        self.terminate(id, SessionStatus::Completed, None).await
    }

    pub async fn fail_session(&self, id: &str, error_message: &str) -> Result<()> {
        self.terminate(id, SessionStatus::Failed, Some(error_message)).await
    }

    async fn terminate(&self, id: &str, status: SessionStatus, error_message: Option<&str>) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let Some(session) = guard.sessions.get_mut(id) else {
            warn!(session_id = id, "failSession/completeSession on unknown session");
            return Ok(());
        };
        if !session.is_active() {
            warn!(session_id = id, "terminal transition on already-terminal session is a no-op");
            return Ok(());
        }
        session.status = status;
        session.updated_at = chrono::Utc::now();
        if let Some(message) = error_message {
            session
                .metadata
                .insert("error".to_string(), serde_json::json!({ "message": message }));
        }
        drop(guard);
        self.schedule_persist();
        Ok(())
    }

    /// Shallow-merges `patch` into the session's metadata.
    pub async fn update_metadata(&self, id: &str, patch: &SharedData) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let session = guard
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::session_not_found(id))?;
        automatosx_types::shared::shallow_merge(&mut session.metadata, patch);
        session.updated_at = chrono::Utc::now();
        drop(guard);
        self.schedule_persist();
        Ok(())
    }

    /// Evicts the oldest sessions (by `updated_at`) once the in-memory
    /// count exceeds `MAX_SESSIONS`.
    async fn evict_if_over_capacity(&self) {
        let mut guard = self.inner.lock().await;
        if guard.sessions.len() <= MAX_SESSIONS {
            return;
        }
        let mut ids_by_age: Vec<(String, chrono::DateTime<chrono::Utc>)> = guard
            .sessions
            .iter()
            .map(|(id, s)| (id.clone(), s.updated_at))
            .collect();
        ids_by_age.sort_by_key(|(_, updated_at)| *updated_at);
        let overflow = guard.sessions.len() - MAX_SESSIONS;
        for (id, _) in ids_by_age.into_iter().take(overflow) {
            guard.sessions.remove(&id);
        }
    }

    pub async fn cleanup(&self) {
        self.evict_if_over_capacity().await;
    }

    /// Removes `completed`/`failed` sessions older than `days`; active
    /// sessions are never evicted by time.
    pub async fn cleanup_old_sessions(&self, days: f64) -> u64 {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds((days * 86_400.0) as i64);
        let mut guard = self.inner.lock().await;
        let before = guard.sessions.len();
        guard
            .sessions
            .retain(|_, s| s.is_active() || s.updated_at >= cutoff);
        let removed = before - guard.sessions.len();
        drop(guard);
        if removed > 0 {
            self.schedule_persist();
        }
        removed as u64
    }

    /// Flushes pending persistence synchronously; callers should await
    /// this on shutdown.
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let snapshot: Vec<Session> = self.inner.lock().await.sessions.values().cloned().collect();
        persist_sessions(path, &snapshot).await
    }
}

async fn load_sessions(path: &std::path::Path) -> HashMap<String, Session> {
    let Ok(contents) = tokio::fs::read_to_string(path).await else {
        return HashMap::new();
    };
    let parsed: Result<Vec<Session>, _> = serde_json::from_str(&contents);
    match parsed {
        Ok(sessions) => sessions.into_iter().map(|s| (s.id.clone(), s)).collect(),
        Err(err) => {
            warn!(error = %err, "failed to parse session persistence file; starting empty");
            HashMap::new()
        }
    }
}

async fn persist_sessions(path: &std::path::Path, sessions: &[Session]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(sessions)?;
    tokio::fs::write(&tmp_path, json).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_complete_session() {
        let manager = SessionManager::in_memory().await;
        let session = manager.create_session("ship it", "planner").await;
        manager.complete_session(&session.id).await.unwrap();
        let reloaded = manager.get_session(&session.id).await.unwrap();
        assert_eq!(reloaded.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn double_complete_is_idempotent_noop() {
        let manager = SessionManager::in_memory().await;
        let session = manager.create_session("ship it", "planner").await;
        manager.complete_session(&session.id).await.unwrap();
        manager.complete_session(&session.id).await.unwrap();
        let reloaded = manager.get_session(&session.id).await.unwrap();
        assert_eq!(reloaded.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn active_sessions_for_agent_reverse_chronological() {
        let manager = SessionManager::in_memory().await;
        let s1 = manager.create_session("task1", "writer").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let s2 = manager.create_session("task2", "writer").await;

        let sessions = manager.get_active_sessions_for_agent("writer").await;
        assert_eq!(sessions[0].id, s2.id);
        assert_eq!(sessions[1].id, s1.id);
    }

    #[tokio::test]
    async fn cleanup_old_sessions_spares_active() {
        let manager = SessionManager::in_memory().await;
        let active = manager.create_session("still going", "planner").await;
        let done = manager.create_session("finished", "planner").await;
        manager.complete_session(&done.id).await.unwrap();

        let removed = manager.cleanup_old_sessions(-1.0).await; // cutoff in the future
        assert_eq!(removed, 1);
        assert!(manager.get_session(&active.id).await.is_some());
        assert!(manager.get_session(&done.id).await.is_none());
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let manager = SessionManager::new(Some(path.clone())).await;
        let session = manager.create_session("persisted task", "planner").await;
        manager.flush().await.unwrap();

        let reloaded_manager = SessionManager::new(Some(path)).await;
        let reloaded = reloaded_manager.get_session(&session.id).await.unwrap();
        assert_eq!(reloaded.task, "persisted task");
    }
}
