//! # QuizGuard Game Integrity Engine
//!
//! Forensic reconstruction and live anti-automation for timed trivia
//! sessions. The engine ingests integrity events from the game loop,
//! reconstructs what happened for dispute resolution, scores answer
//! timings for automation suspicion, and drives the in-game
//! challenge/escalation protocol ("turbo mode").
//!
//! ## Architecture
//!
//! ```text
//! game loop (external)
//!     │ answers / lifelines / timeouts / session lifecycle
//!     ▼
//! [IntegrityEngine]
//!     ├──▶ EventStore          append-only per-session log (source of truth)
//!     │        ▲
//!     │        │ read-only folds
//!     │        ├── Timeline Reconstructor → SessionReport
//!     │        └── Suspicion Scorer       → SuspicionVerdict
//!     │
//!     ├──▶ per-session actor (tokio task)
//!     │        └── Escalation machine: NORMAL → CHALLENGE_PENDING →
//!     │            TURBO_ACTIVE / PHOTO_CHALLENGE → TERMINATED
//!     │            (challenge deadline timer lives here)
//!     │
//!     └──▶ Retention Manager   bounded log lifetime, whole sessions only
//!     │
//!     ▼ Decision {continue | issue_challenge | terminate}
//! game loop must obey before the next question
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quizguard::{Config, IntegrityEngine, Decision};
//!
//! let engine = IntegrityEngine::new(Config::load()?);
//! let session = engine.start_session("user-42");
//!
//! engine.record_question(&session, 1, Some("Capital of France?"))?;
//! match engine.submit_answer(&session, 1, true, 1_200).await? {
//!     Decision::Continue { .. } => { /* next question */ }
//!     Decision::IssueChallenge { kind, deadline_secs } => { /* prompt player */ }
//!     Decision::Terminate { reason } => { /* force-end, apply penalty */ }
//! }
//!
//! let report = engine.build_report(&session)?;
//! println!("{report}");
//! ```

// Event schema and append-only store
pub mod event;
pub mod store;

// Read side: forensic reconstruction and suspicion scoring
pub mod report;
pub mod scorer;

// Live side: escalation state machine and per-session actors
pub mod escalation;
mod actor;
pub mod engine;

// Log lifetime
pub mod retention;

// Ambient
pub mod config;
pub mod error;

// Re-export the public surface
pub use config::{ChallengeKind, Config, EscalationConfig, RetentionConfig, ScoringConfig};
pub use engine::IntegrityEngine;
pub use error::{EngineError, EngineResult};
pub use escalation::{Decision, Escalation, Phase};
pub use event::{AuditEvent, EventKind, SessionId, UserId};
pub use report::{QuestionOutcome, ReportSummary, SessionReport, TimelineEntry};
pub use retention::{MAX_RETENTION_DAYS, MIN_RETENTION_DAYS};
pub use scorer::{Scorer, SuspicionVerdict};
pub use store::EventStore;
