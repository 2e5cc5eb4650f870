use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use artifact_writer::ArtifactWriter;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{Session, SessionInfo};

fn read_unpoisoned<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_unpoisoned<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of live sessions with TTL expiry and capacity eviction.
///
/// Sessions leaving the map (eviction, removal, purge, shutdown) are taken out
/// under the write lock and shut down after it is released, so a slow periodic
/// save never blocks lookups.
#[derive(Debug)]
pub struct SessionDirectory {
    config: SessionConfig,
    writer: ArtifactWriter,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionDirectory {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_writer(config, ArtifactWriter::new())
    }

    /// Sessions created by this directory save through `writer`.
    #[must_use]
    pub fn with_writer(config: SessionConfig, writer: ArtifactWriter) -> Self {
        Self {
            config,
            writer,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of sessions in the map, including ones marked expired but not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        read_unpoisoned(&self.sessions).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a session with a fresh UUID v4 id.
    pub async fn create(&self) -> Result<Arc<Session>, SessionError> {
        self.create_with_id(Uuid::new_v4().to_string()).await
    }

    /// Creates a session under `id`, resuming persisted history for it if present.
    ///
    /// At capacity the least recently accessed session is evicted first and
    /// fully shut down before this returns.
    pub async fn create_with_id(&self, id: impl Into<String>) -> Result<Arc<Session>, SessionError> {
        let id = id.into();
        if read_unpoisoned(&self.sessions).contains_key(&id) {
            return Err(SessionError::AlreadyExists { session_id: id });
        }
        let session = Arc::new(Session::new(id.clone(), &self.config, self.writer.clone())?);

        let evicted = {
            let mut sessions = write_unpoisoned(&self.sessions);
            if sessions.contains_key(&id) {
                return Err(SessionError::AlreadyExists { session_id: id });
            }
            let evicted = if sessions.len() >= self.config.directory.max_sessions {
                let victim = self.eviction_candidate(&sessions).ok_or(
                    SessionError::CapacityExhausted {
                        max_sessions: self.config.directory.max_sessions,
                    },
                )?;
                sessions.remove(&victim)
            } else {
                None
            };
            sessions.insert(id.clone(), Arc::clone(&session));
            evicted
        };

        if let Some(evicted) = evicted {
            tracing::info!(
                session_id = %evicted.id(),
                unflushed = evicted.has_unflushed_edits(),
                "session evicted at capacity"
            );
            evicted.shutdown().await;
        }
        tracing::info!(session_id = %id, "session created");
        Ok(session)
    }

    /// Least recently accessed session that capacity eviction may take.
    fn eviction_candidate(&self, sessions: &HashMap<String, Arc<Session>>) -> Option<String> {
        let protect = self.config.directory.protect_unflushed;
        sessions
            .values()
            .filter(|session| !(protect && session.has_unflushed_edits()))
            .min_by_key(|session| (session.last_accessed(), session.id().to_string()))
            .map(|session| session.id().to_string())
    }

    /// Looks up a live session and refreshes its access time.
    ///
    /// An expired session is marked for [`Self::purge_expired`] and reported
    /// as not found; it is not removed here.
    pub fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        let session = read_unpoisoned(&self.sessions).get(id).cloned();
        let not_found = || SessionError::NotFound {
            session_id: id.to_string(),
        };
        let session = session.ok_or_else(not_found)?;

        if session.is_marked_expired() || session.is_idle_past_ttl(Instant::now()) {
            if session.mark_expired() {
                tracing::debug!(session_id = %id, "session expired on access");
            }
            return Err(not_found());
        }
        session.touch();
        Ok(session)
    }

    /// Returns the live session under `id`, or a new session with a fresh id
    /// when `id` is `None`, unknown or expired.
    pub async fn get_or_create(&self, id: Option<&str>) -> Result<Arc<Session>, SessionError> {
        if let Some(id) = id {
            match self.get(id) {
                Ok(session) => return Ok(session),
                Err(SessionError::NotFound { .. }) => {}
                Err(error) => return Err(error),
            }
        }
        self.create().await
    }

    /// Removes `id`, stopping its periodic loop and releasing its state.
    ///
    /// Returns whether a session was removed; removing twice is not an error.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = write_unpoisoned(&self.sessions).remove(id);
        let Some(session) = removed else {
            return false;
        };
        session.shutdown().await;
        tracing::info!(session_id = %id, "session removed");
        true
    }

    /// Marks every session idle past its TTL and returns the newly marked ids.
    pub fn sweep(&self) -> Vec<String> {
        let now = Instant::now();
        let mut marked: Vec<String> = read_unpoisoned(&self.sessions)
            .values()
            .filter(|session| session.is_idle_past_ttl(now) && session.mark_expired())
            .map(|session| session.id().to_string())
            .collect();
        marked.sort();
        if !marked.is_empty() {
            tracing::debug!(count = marked.len(), "sessions marked expired");
        }
        marked
    }

    /// Removes every session marked expired and returns their ids.
    pub async fn purge_expired(&self) -> Vec<String> {
        let purged: Vec<Arc<Session>> = {
            let mut sessions = write_unpoisoned(&self.sessions);
            let expired: Vec<String> = sessions
                .values()
                .filter(|session| session.is_marked_expired())
                .map(|session| session.id().to_string())
                .collect();
            expired
                .iter()
                .filter_map(|id| sessions.remove(id))
                .collect()
        };

        let mut ids = Vec::with_capacity(purged.len());
        for session in purged {
            session.shutdown().await;
            ids.push(session.id().to_string());
        }
        ids.sort();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "expired sessions purged");
        }
        ids
    }

    /// Summaries of sessions not marked expired, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = read_unpoisoned(&self.sessions)
            .values()
            .filter(|session| !session.is_marked_expired())
            .map(|session| session.info())
            .collect();
        infos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        infos
    }

    /// Removes every session, stopping all periodic loops.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = write_unpoisoned(&self.sessions)
            .drain()
            .map(|(_, session)| session)
            .collect();
        let count = sessions.len();
        for session in sessions {
            session.shutdown().await;
        }
        tracing::info!(count, "session directory shut down");
    }
}
