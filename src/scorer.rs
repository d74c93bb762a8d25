//! Suspicion Scorer
//!
//! Stateless statistical judgment over answer-timing events. The policy is
//! deliberately simple: over a sliding window of the most recent correct
//! answers, count those faster than `max_response_threshold_ms`; when the
//! count reaches `min_fast_correct_answers`, the session is flagged.
//!
//! The scorer is the only component permitted to decide "flagged", and it
//! never acts on that decision — the escalation state machine does. It
//! performs no writes; verdicts are always recomputed from the event store.
//!
//! Thresholds live behind `ArcSwap` so operators can retune them on a
//! running engine without rebuilding anything.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ScoringConfig;
use crate::error::EngineResult;
use crate::event::{AuditEvent, EventKind, SessionId};
use crate::store::EventStore;

/// The scorer's flagged/not-flagged judgment plus supporting statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspicionVerdict {
    pub session_id: SessionId,
    /// Correct answers in the window faster than the threshold
    pub fast_correct_count: u32,
    /// Mean response time over correct answers in the window
    pub avg_response_ms: Option<f64>,
    /// Fastest correct answer in the window
    pub min_response_ms: Option<u64>,
    pub flagged: bool,
}

/// Sliding-window suspicion scorer
pub struct Scorer {
    config: ArcSwap<ScoringConfig>,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Scorer {
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Replace the thresholds on a running scorer
    pub fn update_config(&self, config: ScoringConfig) {
        self.config.store(Arc::new(config));
    }

    /// Current thresholds (snapshot)
    pub fn config(&self) -> Arc<ScoringConfig> {
        self.config.load_full()
    }

    /// Score a pre-read event sequence. Pure; tolerates any mix of kinds
    /// and considers only correct `ANSWER_GIVEN` events.
    pub fn score(&self, session_id: &str, events: &[AuditEvent]) -> SuspicionVerdict {
        let config = self.config.load();

        let correct_times: Vec<u64> = events
            .iter()
            .filter(|e| e.kind == EventKind::AnswerGiven)
            .filter(|e| e.payload_bool("is_correct") == Some(true))
            .filter_map(|e| e.payload_u64("response_time_ms"))
            .collect();

        // Trailing window of the most recent correct answers.
        let window = if config.window > 0 && correct_times.len() > config.window {
            &correct_times[correct_times.len() - config.window..]
        } else {
            &correct_times[..]
        };

        let fast_correct_count = window
            .iter()
            .filter(|&&ms| ms < config.max_response_threshold_ms)
            .count() as u32;

        let avg_response_ms = if window.is_empty() {
            None
        } else {
            Some(window.iter().sum::<u64>() as f64 / window.len() as f64)
        };

        SuspicionVerdict {
            session_id: session_id.to_string(),
            fast_correct_count,
            avg_response_ms,
            min_response_ms: window.iter().copied().min(),
            flagged: fast_correct_count >= config.min_fast_correct_answers,
        }
    }

    /// Score one session straight out of the store
    pub fn score_session(
        &self,
        store: &EventStore,
        session_id: &str,
    ) -> EngineResult<SuspicionVerdict> {
        let events = store.read(session_id)?;
        Ok(self.score(session_id, &events))
    }

    /// Cross-session detection: score a user's trailing history.
    ///
    /// Sequence numbers do not order across sessions, so the window here is
    /// a time bound rather than a count of a single session's answers.
    pub fn score_user(
        &self,
        store: &EventStore,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> SuspicionVerdict {
        let events = store.read_by_user(user_id, Some(since), None);
        self.score(user_id, &events)
    }
}
