//! Event Store
//!
//! Append-only, session-scoped log of integrity events; the durable source
//! of truth for everything the engine decides. Layout:
//!
//! ```text
//! EventStore
//! ├── sessions: RwLock<HashMap<SessionId, SessionLog>>
//! │   └── SessionLog { user_id, events: Vec<AuditEvent> }
//! └── registry seam: register_session() / session_exists()
//! ```
//!
//! Append is atomic per session: the log's write lock covers sequence-number
//! assignment and the push, so two appends can never interleave an
//! inconsistent sequence. Reads return clones in append order. The only
//! permitted mutations are append and whole-session removal (retention).
//!
//! The game-session registry is an external collaborator in the surrounding
//! system; `register_session` is the in-process stand-in for it. Appending
//! to an unregistered session is the caller's bug and fails with
//! `UnknownSession` rather than creating a log implicitly.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::event::{AuditEvent, EventKind, SessionId, UserId};

#[derive(Debug)]
struct SessionLog {
    user_id: UserId,
    /// Game metadata handed over by the registry (opaque to the engine)
    game_info: Option<serde_json::Value>,
    events: Vec<AuditEvent>,
}

/// Append-only event log, session-scoped
#[derive(Debug, Default)]
pub struct EventStore {
    sessions: RwLock<HashMap<SessionId, SessionLog>>,
}

impl EventStore {
    pub fn new() -> Self {
        EventStore {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session with the store's registry seam.
    ///
    /// Idempotent: re-registering an existing session keeps its log.
    pub fn register_session(&self, session_id: &str, user_id: &str) {
        let mut sessions = self.sessions.write();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionLog {
                user_id: user_id.to_string(),
                game_info: None,
                events: Vec::new(),
            });
    }

    /// Attach game metadata to a registered session (echoed in reports)
    pub fn set_game_info(
        &self,
        session_id: &str,
        info: serde_json::Value,
    ) -> EngineResult<()> {
        let mut sessions = self.sessions.write();
        let log = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;
        log.game_info = Some(info);
        Ok(())
    }

    /// Game metadata attached to a session, if any
    pub fn game_info(&self, session_id: &str) -> EngineResult<Option<serde_json::Value>> {
        let sessions = self.sessions.read();
        sessions
            .get(session_id)
            .map(|log| log.game_info.clone())
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))
    }

    /// Whether the registry knows this session
    pub fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Append one event; returns the assigned sequence number.
    ///
    /// Fails with `UnknownSession` when the session was never registered.
    pub fn append(
        &self,
        session_id: &str,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> EngineResult<u64> {
        let mut sessions = self.sessions.write();
        let log = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;

        let sequence = log.events.len() as u64 + 1;
        log.events.push(AuditEvent {
            session_id: session_id.to_string(),
            user_id: log.user_id.clone(),
            sequence,
            kind,
            timestamp: Utc::now(),
            payload,
        });
        debug!(session_id, %kind, sequence, "event appended");
        Ok(sequence)
    }

    /// Ordered event sequence for one session
    pub fn read(&self, session_id: &str) -> EngineResult<Vec<AuditEvent>> {
        let sessions = self.sessions.read();
        sessions
            .get(session_id)
            .map(|log| log.events.clone())
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))
    }

    /// User who owns a session
    pub fn session_user(&self, session_id: &str) -> EngineResult<UserId> {
        let sessions = self.sessions.read();
        sessions
            .get(session_id)
            .map(|log| log.user_id.clone())
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))
    }

    /// All of a user's events across sessions, optionally bounded by time.
    ///
    /// Ordered by timestamp then sequence; timestamps only order across
    /// sessions here, never within one (sequence remains authoritative
    /// within a session).
    pub fn read_by_user(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<AuditEvent> {
        let sessions = self.sessions.read();
        let mut events: Vec<AuditEvent> = sessions
            .values()
            .filter(|log| log.user_id == user_id)
            .flat_map(|log| log.events.iter())
            .filter(|e| from.map_or(true, |f| e.timestamp >= f))
            .filter(|e| to.map_or(true, |t| e.timestamp <= t))
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.session_id.cmp(&b.session_id))
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        events
    }

    /// Remove whole sessions whose newest event is older than `cutoff`.
    ///
    /// Retention Manager use only. Scoping deletion by the newest event
    /// keeps the "complete session or nothing" invariant: a session still
    /// receiving events is never half-deleted. Sessions registered but with
    /// no events yet are left alone. Returns removed session count.
    pub fn remove_sessions_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, log| match log.events.last() {
            Some(newest) => newest.timestamp >= cutoff,
            None => true,
        });
        before - sessions.len()
    }
}
