//! Escalation State Machine ("turbo mode")
//!
//! Explicit tagged state per session, replacing ad hoc "what phase are we
//! in" queries over the raw log:
//!
//! ```text
//!                    flagged                GO before deadline
//!   NORMAL ────────────────▶ CHALLENGE_PENDING ────────────▶ TURBO_ACTIVE
//!     ▲                           │                              │    │
//!     │  PASSED                   │ deadline                     │    │ N clean
//!     │                           ▼                   re-flagged │    │ questions
//!   PHOTO_CHALLENGE ────────▶ TERMINATED ◀───────────────────────┘    │
//!     (alternate path)        (terminal)                              ▼
//!                                                                  NORMAL
//! ```
//!
//! This module is the pure core: transitions take an input and return the
//! decision for the game loop plus the events to append. No clocks, no
//! channels, no I/O — the per-session actor owns those. Keeping the machine
//! pure is what makes crash recovery a fold: `Escalation::replay` rebuilds
//! the phase from the event log, so in-memory state is only ever a cache.
//!
//! Duplicate suspicion triggers collapse idempotently: flagging a session
//! already in `ChallengePending` produces no new decision, no new events,
//! and (in the actor) no second timer.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ChallengeKind, EscalationConfig};
use crate::event::{AuditEvent, EventKind};

/// Termination reason for the GO-challenge deadline expiring
pub const REASON_GO_TIMEOUT: &str = "turbo_go_timeout";
/// Termination reason for suspicion re-triggering during turbo mode
pub const REASON_TURBO_REFLAG: &str = "turbo_reflagged";
/// Termination reason for a failed photo verification
pub const REASON_PHOTO_FAILED: &str = "photo_verification_failed";
/// Termination reason for the photo challenge deadline expiring
pub const REASON_PHOTO_TIMEOUT: &str = "photo_challenge_timeout";

/// Escalation phase of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Normal,
    ChallengePending,
    TurboActive,
    PhotoChallenge,
    Terminated,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Normal => write!(f, "normal"),
            Phase::ChallengePending => write!(f, "challenge_pending"),
            Phase::TurboActive => write!(f, "turbo_active"),
            Phase::PhotoChallenge => write!(f, "photo_challenge"),
            Phase::Terminated => write!(f, "terminated"),
        }
    }
}

/// What the game loop must do before presenting the next question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Ordinary play continues; `answer_deadline_ms` is `Some` while turbo
    /// mode reduces the per-question timer
    Continue { answer_deadline_ms: Option<u64> },
    /// Present the challenge and wait for the player's response
    IssueChallenge { kind: ChallengeKind, deadline_secs: u64 },
    /// Force-end the session
    Terminate { reason: String },
}

/// A transition's outputs: the caller-facing decision plus the events the
/// engine must append to the log
#[derive(Debug, Clone)]
pub struct Effects {
    pub decision: Decision,
    pub emit: Vec<(EventKind, serde_json::Value)>,
}

impl Effects {
    fn contin(deadline: Option<u64>) -> Self {
        Effects {
            decision: Decision::Continue {
                answer_deadline_ms: deadline,
            },
            emit: Vec::new(),
        }
    }
}

/// Per-session escalation controller (pure core)
#[derive(Debug, Clone)]
pub struct Escalation {
    phase: Phase,
    /// Questions left to clear while turbo is active
    turbo_remaining: u32,
    /// Reason recorded at termination, echoed on later inputs
    terminated_reason: Option<String>,
    config: EscalationConfig,
}

impl Escalation {
    pub fn new(config: EscalationConfig) -> Self {
        Escalation {
            phase: Phase::Normal,
            turbo_remaining: 0,
            terminated_reason: None,
            config,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// An answer arrived and was scored. Drives every answer-triggered
    /// transition; duplicate flags collapse idempotently.
    pub fn on_answer(&mut self, flagged: bool) -> Effects {
        match self.phase {
            Phase::Normal => {
                if flagged {
                    self.enter_challenge()
                } else {
                    Effects::contin(None)
                }
            }
            // Challenge already outstanding: a racing second flag (or any
            // answer sneaking in) changes nothing and arms no new timer.
            Phase::ChallengePending | Phase::PhotoChallenge => Effects::contin(None),
            Phase::TurboActive => {
                if flagged {
                    self.terminate(REASON_TURBO_REFLAG, Vec::new())
                } else {
                    self.turbo_question_cleared()
                }
            }
            Phase::Terminated => self.already_terminated(),
        }
    }

    /// A question timed out. In turbo mode a timeout still consumes one of
    /// the N challenge questions (the player was not suspiciously fast).
    pub fn on_question_timeout(&mut self) -> Effects {
        match self.phase {
            Phase::TurboActive => self.turbo_question_cleared(),
            Phase::Terminated => self.already_terminated(),
            _ => Effects::contin(None),
        }
    }

    /// The player typed GO in time
    pub fn on_go_received(&mut self) -> Effects {
        match self.phase {
            Phase::ChallengePending => {
                self.phase = Phase::TurboActive;
                self.turbo_remaining = self.config.turbo_question_count;
                Effects {
                    decision: Decision::Continue {
                        answer_deadline_ms: Some(self.config.turbo_deadline_ms()),
                    },
                    emit: vec![(
                        EventKind::TurboModeGoReceived,
                        json!({ "turbo_questions": self.config.turbo_question_count }),
                    )],
                }
            }
            Phase::Terminated => self.already_terminated(),
            // Stale GO (e.g. sent after turbo already started): ignore.
            _ => Effects::contin(self.current_deadline()),
        }
    }

    /// Photo verification result arrived
    pub fn on_photo_result(&mut self, passed: bool) -> Effects {
        match self.phase {
            Phase::PhotoChallenge => {
                if passed {
                    self.phase = Phase::Normal;
                    Effects {
                        decision: Decision::Continue {
                            answer_deadline_ms: None,
                        },
                        emit: vec![(EventKind::PhotoVerificationPassed, json!({}))],
                    }
                } else {
                    self.terminate(
                        REASON_PHOTO_FAILED,
                        vec![(EventKind::PhotoVerificationFailed, json!({}))],
                    )
                }
            }
            Phase::Terminated => self.already_terminated(),
            _ => Effects::contin(self.current_deadline()),
        }
    }

    /// The challenge deadline expired with no response. The actor
    /// guarantees this fires at most once per armed challenge.
    pub fn on_deadline_expired(&mut self) -> Effects {
        match self.phase {
            Phase::ChallengePending => self.terminate(
                REASON_GO_TIMEOUT,
                vec![(EventKind::TurboModeGoTimeout, json!({}))],
            ),
            Phase::PhotoChallenge => self.terminate(
                REASON_PHOTO_TIMEOUT,
                vec![(EventKind::PhotoVerificationFailed, json!({ "reason": "timeout" }))],
            ),
            Phase::Terminated => self.already_terminated(),
            // Canceled-but-raced timer observed after the phase moved on.
            _ => Effects::contin(self.current_deadline()),
        }
    }

    fn enter_challenge(&mut self) -> Effects {
        let deadline_secs = self.config.challenge_deadline_secs;
        match self.config.challenge_kind {
            ChallengeKind::Go => {
                self.phase = Phase::ChallengePending;
                Effects {
                    decision: Decision::IssueChallenge {
                        kind: ChallengeKind::Go,
                        deadline_secs,
                    },
                    emit: vec![(
                        EventKind::TurboModeActivated,
                        json!({ "deadline_secs": deadline_secs }),
                    )],
                }
            }
            ChallengeKind::Photo => {
                self.phase = Phase::PhotoChallenge;
                Effects {
                    decision: Decision::IssueChallenge {
                        kind: ChallengeKind::Photo,
                        deadline_secs,
                    },
                    emit: vec![(
                        EventKind::PhotoVerificationRequested,
                        json!({ "deadline_secs": deadline_secs }),
                    )],
                }
            }
        }
    }

    fn turbo_question_cleared(&mut self) -> Effects {
        self.turbo_remaining = self.turbo_remaining.saturating_sub(1);
        if self.turbo_remaining == 0 {
            self.phase = Phase::Normal;
            Effects {
                decision: Decision::Continue {
                    answer_deadline_ms: None,
                },
                emit: vec![(EventKind::TurboModeCompleted, json!({}))],
            }
        } else {
            Effects::contin(Some(self.config.turbo_deadline_ms()))
        }
    }

    fn terminate(
        &mut self,
        reason: &str,
        mut emit: Vec<(EventKind, serde_json::Value)>,
    ) -> Effects {
        self.phase = Phase::Terminated;
        self.terminated_reason = Some(reason.to_string());
        emit.push((EventKind::SessionTerminated, json!({ "reason": reason })));
        Effects {
            decision: Decision::Terminate {
                reason: reason.to_string(),
            },
            emit,
        }
    }

    /// Terminal finality: inputs after termination never change phase and
    /// never append machine events; they only repeat the verdict.
    fn already_terminated(&self) -> Effects {
        Effects {
            decision: Decision::Terminate {
                reason: self
                    .terminated_reason
                    .clone()
                    .unwrap_or_else(|| "session_terminated".to_string()),
            },
            emit: Vec::new(),
        }
    }

    fn current_deadline(&self) -> Option<u64> {
        (self.phase == Phase::TurboActive).then(|| self.config.turbo_deadline_ms())
    }

    /// Sequence number after which answers count toward a fresh verdict.
    ///
    /// Clearing a challenge (GO received, photo passed, turbo completed)
    /// forgives the answers that triggered it; without this floor the
    /// flagged answers would still sit in the scoring window and re-flag
    /// the session the moment turbo began. Returns 0 when no challenge was
    /// ever cleared.
    pub fn score_floor(events: &[AuditEvent]) -> u64 {
        events
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    EventKind::TurboModeGoReceived
                        | EventKind::TurboModeCompleted
                        | EventKind::PhotoVerificationPassed
                )
            })
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0)
    }

    /// Rebuild the machine from a session's event log.
    ///
    /// Crash recovery path: the log is the source of truth, the machine a
    /// cache. A recovered `ChallengePending`/`PhotoChallenge` gets a fresh
    /// full deadline when the actor re-arms its timer — conservative, so a
    /// crash on our side never shortens the player's window.
    pub fn replay(events: &[AuditEvent], config: &EscalationConfig) -> Self {
        let mut machine = Escalation::new(config.clone());
        for event in events {
            match event.kind {
                EventKind::TurboModeActivated => {
                    if machine.phase == Phase::Normal {
                        machine.phase = Phase::ChallengePending;
                    }
                }
                EventKind::PhotoVerificationRequested => {
                    if machine.phase == Phase::Normal {
                        machine.phase = Phase::PhotoChallenge;
                    }
                }
                EventKind::TurboModeGoReceived => {
                    if machine.phase == Phase::ChallengePending {
                        machine.phase = Phase::TurboActive;
                        machine.turbo_remaining = event
                            .payload_u64("turbo_questions")
                            .map_or(config.turbo_question_count, |n| n as u32);
                    }
                }
                EventKind::AnswerGiven | EventKind::Timeout => {
                    if machine.phase == Phase::TurboActive {
                        machine.turbo_remaining = machine.turbo_remaining.saturating_sub(1);
                        if machine.turbo_remaining == 0 {
                            machine.phase = Phase::Normal;
                        }
                    }
                }
                EventKind::TurboModeCompleted | EventKind::PhotoVerificationPassed => {
                    if machine.phase != Phase::Terminated {
                        machine.phase = Phase::Normal;
                        machine.turbo_remaining = 0;
                    }
                }
                EventKind::TurboModeGoTimeout | EventKind::PhotoVerificationFailed => {
                    machine.phase = Phase::Terminated;
                }
                EventKind::SessionTerminated => {
                    machine.phase = Phase::Terminated;
                    machine.terminated_reason =
                        event.payload_str("reason").map(str::to_string);
                }
                EventKind::QuestionAsked
                | EventKind::LifelineUsed
                | EventKind::PerfectGameFlagged
                | EventKind::Q1TimeoutTracked => {}
            }
        }
        machine
    }
}
