//! Audit Event Model
//!
//! `AuditEvent` is one immutable fact in a session's append-only log. The
//! per-session `sequence` number is the sole ordering key; wall-clock
//! timestamps are advisory only, since client and server clocks may skew.
//!
//! `EventKind` is a closed set. Collaborators speak the SCREAMING_SNAKE wire
//! form; anything outside the set is rejected as `InvalidEventKind` before a
//! partial row can reach the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Unique session identifier
pub type SessionId = String;

/// Unique user identifier
pub type UserId = String;

/// Closed set of integrity event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    QuestionAsked,
    AnswerGiven,
    LifelineUsed,
    Timeout,
    TurboModeActivated,
    TurboModeGoReceived,
    TurboModeGoTimeout,
    TurboModeCompleted,
    PhotoVerificationRequested,
    PhotoVerificationPassed,
    PhotoVerificationFailed,
    PerfectGameFlagged,
    Q1TimeoutTracked,
    SessionTerminated,
}

impl EventKind {
    /// All members of the closed set, in declaration order
    pub const ALL: [EventKind; 14] = [
        EventKind::QuestionAsked,
        EventKind::AnswerGiven,
        EventKind::LifelineUsed,
        EventKind::Timeout,
        EventKind::TurboModeActivated,
        EventKind::TurboModeGoReceived,
        EventKind::TurboModeGoTimeout,
        EventKind::TurboModeCompleted,
        EventKind::PhotoVerificationRequested,
        EventKind::PhotoVerificationPassed,
        EventKind::PhotoVerificationFailed,
        EventKind::PerfectGameFlagged,
        EventKind::Q1TimeoutTracked,
        EventKind::SessionTerminated,
    ];

    /// Wire form used in payload exports and the event log
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::QuestionAsked => "QUESTION_ASKED",
            EventKind::AnswerGiven => "ANSWER_GIVEN",
            EventKind::LifelineUsed => "LIFELINE_USED",
            EventKind::Timeout => "TIMEOUT",
            EventKind::TurboModeActivated => "TURBO_MODE_ACTIVATED",
            EventKind::TurboModeGoReceived => "TURBO_MODE_GO_RECEIVED",
            EventKind::TurboModeGoTimeout => "TURBO_MODE_GO_TIMEOUT",
            EventKind::TurboModeCompleted => "TURBO_MODE_COMPLETED",
            EventKind::PhotoVerificationRequested => "PHOTO_VERIFICATION_REQUESTED",
            EventKind::PhotoVerificationPassed => "PHOTO_VERIFICATION_PASSED",
            EventKind::PhotoVerificationFailed => "PHOTO_VERIFICATION_FAILED",
            EventKind::PerfectGameFlagged => "PERFECT_GAME_FLAGGED",
            EventKind::Q1TimeoutTracked => "Q1_TIMEOUT_TRACKED",
            EventKind::SessionTerminated => "SESSION_TERMINATED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EngineError::InvalidEventKind(s.to_string()))
    }
}

/// One immutable fact appended to a session's event log.
///
/// Never mutated or reordered after append; the Retention Manager is the
/// only component permitted to delete, and only whole sessions at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Session this event belongs to
    pub session_id: SessionId,
    /// User playing the session
    pub user_id: UserId,
    /// Monotonically increasing position within the session, starting at 1
    pub sequence: u64,
    /// Which fact this is
    pub kind: EventKind,
    /// Advisory wall-clock time of append (ordering authority is `sequence`)
    pub timestamp: DateTime<Utc>,
    /// Schemaless key/value bag; shape depends on `kind`
    pub payload: serde_json::Value,
}

impl AuditEvent {
    /// Read a u64 field out of the payload bag, if present
    pub fn payload_u64(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(serde_json::Value::as_u64)
    }

    /// Read a bool field out of the payload bag, if present
    pub fn payload_bool(&self, key: &str) -> Option<bool> {
        self.payload.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Read a string field out of the payload bag, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Payload constructors for the events the engine and game loop append.
///
/// Collaborators are free to attach extra keys; these cover the fields the
/// reconstructor and scorer read back.
pub mod payload {
    use serde_json::{json, Value};

    /// `QUESTION_ASKED` payload
    pub fn question_asked(question_number: u32, question_text: Option<&str>) -> Value {
        match question_text {
            Some(text) => json!({ "question_number": question_number, "question_text": text }),
            None => json!({ "question_number": question_number }),
        }
    }

    /// `ANSWER_GIVEN` payload
    pub fn answer_given(question_number: u32, is_correct: bool, response_time_ms: u64) -> Value {
        json!({
            "question_number": question_number,
            "is_correct": is_correct,
            "response_time_ms": response_time_ms,
        })
    }

    /// `LIFELINE_USED` payload
    pub fn lifeline_used(question_number: u32, lifeline: &str) -> Value {
        json!({ "question_number": question_number, "lifeline": lifeline })
    }

    /// `TIMEOUT` payload
    pub fn timeout(question_number: u32) -> Value {
        json!({ "question_number": question_number })
    }

    /// `SESSION_TERMINATED` payload
    pub fn terminated(reason: &str) -> Value {
        json!({ "reason": reason })
    }
}
