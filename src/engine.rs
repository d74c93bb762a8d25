//! Integrity Engine Facade
//!
//! Single entry point the game loop and admin collaborators talk to:
//!
//! ```text
//! IntegrityEngine
//! ├── EventStore (Arc)           append-only source of truth
//! ├── Scorer (Arc)               runtime-tunable thresholds
//! ├── actors: DashMap<SessionId, ActorHandle>
//! │   └── one tokio task per active session (escalation machine + timer)
//! └── retention policy
//! ```
//!
//! Every game-loop call appends its event first, then consults the
//! session's actor and returns the decision the loop must obey before
//! presenting the next question. Reporting and scoring are read-only over
//! the store and never touch actor state.
//!
//! If an actor is missing for a session the store still knows (process
//! restart mid-game), the engine rebuilds the machine by replaying the
//! session's event log — in-memory state is a cache, never the truth.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

use crate::actor::{ActorHandle, Command, SessionActor};
use crate::config::{Config, ScoringConfig};
use crate::error::{EngineError, EngineResult};
use crate::escalation::{Decision, Escalation, Phase};
use crate::event::{payload, EventKind, SessionId};
use crate::report::{build_report, SessionReport};
use crate::retention;
use crate::scorer::{Scorer, SuspicionVerdict};
use crate::store::EventStore;

/// Game integrity engine: event log, scorer, and per-session escalation
pub struct IntegrityEngine {
    store: Arc<EventStore>,
    scorer: Arc<Scorer>,
    config: Config,
    actors: Arc<DashMap<SessionId, ActorHandle>>,
}

impl IntegrityEngine {
    pub fn new(config: Config) -> Self {
        IntegrityEngine {
            store: Arc::new(EventStore::new()),
            scorer: Arc::new(Scorer::new(config.scoring.clone())),
            config,
            actors: Arc::new(DashMap::new()),
        }
    }

    /// Shared handle to the event store (retention scheduling, tooling)
    pub fn store(&self) -> Arc<EventStore> {
        Arc::clone(&self.store)
    }

    // ------------------------------------------------------------------
    // Game-loop surface
    // ------------------------------------------------------------------

    /// Register a new session and spawn its actor; returns the minted id
    pub fn start_session(&self, user_id: &str) -> SessionId {
        let session_id = Uuid::new_v4().to_string();
        self.start_session_with_id(&session_id, user_id);
        session_id
    }

    /// Register a session under a caller-chosen id (idempotent)
    pub fn start_session_with_id(&self, session_id: &str, user_id: &str) {
        self.store.register_session(session_id, user_id);
        self.actors.entry(session_id.to_string()).or_insert_with(|| {
            info!(session_id, user_id, "session started");
            SessionActor::spawn(
                session_id.to_string(),
                Arc::clone(&self.store),
                Arc::clone(&self.scorer),
                Escalation::new(self.config.escalation.clone()),
                0,
                Arc::clone(&self.actors),
            )
        });
    }

    /// Attach game metadata (tournament, round, ...) echoed in reports
    pub fn set_game_info(
        &self,
        session_id: &str,
        info: serde_json::Value,
    ) -> EngineResult<()> {
        self.store.set_game_info(session_id, info)
    }

    /// A question was presented to the player
    pub fn record_question(
        &self,
        session_id: &str,
        question_number: u32,
        question_text: Option<&str>,
    ) -> EngineResult<u64> {
        self.store.append(
            session_id,
            EventKind::QuestionAsked,
            payload::question_asked(question_number, question_text),
        )
    }

    /// An answer was submitted; returns the decision the game loop must
    /// obey before rendering the next question
    pub async fn submit_answer(
        &self,
        session_id: &str,
        question_number: u32,
        is_correct: bool,
        response_time_ms: u64,
    ) -> EngineResult<Decision> {
        self.store.append(
            session_id,
            EventKind::AnswerGiven,
            payload::answer_given(question_number, is_correct, response_time_ms),
        )?;
        self.request(session_id, move |reply| Command::Answer {
            is_correct,
            response_time_ms,
            reply,
        })
        .await
    }

    /// The player used a lifeline (forensic record only)
    pub fn use_lifeline(
        &self,
        session_id: &str,
        question_number: u32,
        lifeline: &str,
    ) -> EngineResult<u64> {
        self.store.append(
            session_id,
            EventKind::LifelineUsed,
            payload::lifeline_used(question_number, lifeline),
        )
    }

    /// The current question timed out with no answer
    pub async fn question_timeout(
        &self,
        session_id: &str,
        question_number: u32,
    ) -> EngineResult<Decision> {
        self.store
            .append(session_id, EventKind::Timeout, payload::timeout(question_number))?;
        self.request(session_id, |reply| Command::QuestionTimeout { reply })
            .await
    }

    /// The player answered the GO challenge
    pub async fn challenge_response(&self, session_id: &str) -> EngineResult<Decision> {
        self.request(session_id, |reply| Command::Go { reply }).await
    }

    /// Photo verification result from the verification collaborator
    pub async fn photo_result(&self, session_id: &str, passed: bool) -> EngineResult<Decision> {
        self.request(session_id, move |reply| Command::PhotoResult { passed, reply })
            .await
    }

    /// Append a collaborator-owned event by wire-form kind string.
    ///
    /// This is where `InvalidEventKind` surfaces: the string is validated
    /// against the closed set before anything reaches the store.
    pub fn append_raw(
        &self,
        session_id: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> EngineResult<u64> {
        let kind: EventKind = kind.parse()?;
        self.store.append(session_id, kind, payload)
    }

    /// End a session (normal completion or external cancellation).
    ///
    /// Stops the actor, cancelling any pending challenge timer exactly
    /// once. Events may still be appended afterwards for forensic
    /// completeness via `append_raw`; they no longer drive transitions.
    pub async fn end_session(&self, session_id: &str) {
        if let Some((_, handle)) = self.actors.remove(session_id) {
            let _ = handle.tx.send(Command::End).await;
            info!(session_id, "session ended");
        }
    }

    // ------------------------------------------------------------------
    // Reporting / admin surface
    // ------------------------------------------------------------------

    /// Forensic reconstruction of one session
    pub fn build_report(&self, session_id: &str) -> EngineResult<SessionReport> {
        build_report(&self.store, session_id)
    }

    /// Current suspicion verdict for one session
    pub fn score(&self, session_id: &str) -> EngineResult<SuspicionVerdict> {
        self.scorer.score_session(&self.store, session_id)
    }

    /// Cross-session verdict over a user's trailing history
    pub fn score_user(
        &self,
        user_id: &str,
        since: chrono::DateTime<chrono::Utc>,
    ) -> SuspicionVerdict {
        self.scorer.score_user(&self.store, user_id, since)
    }

    /// Escalation phase of one active session
    pub fn session_phase(&self, session_id: &str) -> Option<Phase> {
        self.actors.get(session_id).map(|h| h.current_phase())
    }

    /// Sessions currently escalated (any phase other than `Normal`)
    pub fn escalated_sessions(&self) -> Vec<(SessionId, Phase)> {
        let mut escalated: Vec<(SessionId, Phase)> = self
            .actors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().current_phase()))
            .filter(|(_, phase)| *phase != Phase::Normal)
            .collect();
        escalated.sort_by(|a, b| a.0.cmp(&b.0));
        escalated
    }

    /// Delete sessions older than the retention bound (the request is
    /// tightened by the configured `max_days` ceiling, then hard-clamped),
    /// and drop controllers for sessions the store no longer knows.
    pub fn cleanup(&self, retention_days: u32) -> usize {
        let days = retention::effective_retention_days(retention_days, &self.config.retention);
        let removed = retention::cleanup(&self.store, days);
        self.actors
            .retain(|session_id, _| self.store.session_exists(session_id));
        removed
    }

    /// Retune suspicion thresholds on the running engine
    pub fn update_scoring(&self, config: ScoringConfig) {
        info!(
            threshold_ms = config.max_response_threshold_ms,
            min_fast = config.min_fast_correct_answers,
            window = config.window,
            "scoring config updated"
        );
        self.scorer.update_config(config);
    }

    // ------------------------------------------------------------------

    /// Send one command to the session's actor and await its decision,
    /// reviving the actor from the event log if the process restarted.
    async fn request<F>(&self, session_id: &str, make: F) -> EngineResult<Decision>
    where
        F: FnOnce(oneshot::Sender<Decision>) -> Command,
    {
        let handle = self.actor_or_recover(session_id)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::SessionClosed(session_id.to_string()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::SessionClosed(session_id.to_string()))
    }

    fn actor_or_recover(&self, session_id: &str) -> EngineResult<ActorHandle> {
        if let Some(handle) = self.actors.get(session_id) {
            return Ok(handle.clone());
        }
        if !self.store.session_exists(session_id) {
            return Err(EngineError::UnknownSession(session_id.to_string()));
        }
        // Known to the store but no live actor: rebuild from the log. The
        // entry lock makes the rebuild single-winner when calls race, so
        // one actor ever replays a given session.
        let handle = self
            .actors
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let events = self.store.read(session_id).unwrap_or_default();
                info!(session_id, events = events.len(), "recovering session from event log");
                let machine = Escalation::replay(&events, &self.config.escalation);
                let score_floor = Escalation::score_floor(&events);
                SessionActor::spawn(
                    session_id.to_string(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.scorer),
                    machine,
                    score_floor,
                    Arc::clone(&self.actors),
                )
            })
            .value()
            .clone();
        Ok(handle)
    }
}
