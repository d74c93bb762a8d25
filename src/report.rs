//! Timeline Reconstructor
//!
//! Pure read side: folds one session's ordered event sequence into a
//! `SessionReport` — a per-question timeline plus aggregate summary — for
//! dispute resolution. The fold is left-to-right over sequence numbers:
//!
//! - `QUESTION_ASKED` opens a timeline entry
//! - the next `ANSWER_GIVEN` or `TIMEOUT` closes it
//! - `LIFELINE_USED` annotates the open entry
//! - a question still open when the next one is asked (or when the log
//!   ends, e.g. an abandoned session) is marked `Incomplete`, never an error
//!
//! The report is a projection, never persisted as authoritative; rebuilding
//! it twice from the same sequence yields identical output. No writes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineResult;
use crate::event::{AuditEvent, EventKind, SessionId, UserId};
use crate::store::EventStore;

/// How a question ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionOutcome {
    Correct,
    Wrong,
    Timeout,
    /// Asked but never resolved (abandoned session, missing answer)
    Incomplete,
}

impl fmt::Display for QuestionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionOutcome::Correct => write!(f, "correct"),
            QuestionOutcome::Wrong => write!(f, "wrong"),
            QuestionOutcome::Timeout => write!(f, "timeout"),
            QuestionOutcome::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// One question's reconstructed record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub question_number: u32,
    pub question_text: Option<String>,
    pub outcome: QuestionOutcome,
    pub response_time_ms: Option<u64>,
    /// Lifelines, photo verification steps, turbo markers observed while
    /// this question was open
    pub annotations: Vec<String>,
}

/// Aggregate counters over the whole session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_questions: u32,
    pub correct: u32,
    pub wrong: u32,
    pub timeouts: u32,
    pub lifelines_used: Vec<String>,
    pub avg_response_ms: Option<f64>,
    /// Whether the session ended by integrity termination
    pub terminated: bool,
    pub termination_reason: Option<String>,
}

/// Reconstructed, human/machine-readable summary of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub user_id: UserId,
    /// Opaque game metadata attached at registration (tournament, round, ...)
    pub game_info: Option<serde_json::Value>,
    pub summary: ReportSummary,
    pub timeline: Vec<TimelineEntry>,
}

/// Build the report for one session. Read-only and deterministic.
pub fn build_report(store: &EventStore, session_id: &str) -> EngineResult<SessionReport> {
    let events = store.read(session_id)?;
    let user_id = store.session_user(session_id)?;
    let mut report = fold_events(session_id, &user_id, &events);
    report.game_info = store.game_info(session_id)?;
    Ok(report)
}

/// Fold an ordered event sequence into a report.
///
/// Exposed for replay-style callers that already hold the events.
pub fn fold_events(session_id: &str, user_id: &str, events: &[AuditEvent]) -> SessionReport {
    let mut timeline: Vec<TimelineEntry> = Vec::new();
    let mut summary = ReportSummary::default();
    let mut open: Option<TimelineEntry> = None;
    let mut response_sum: u64 = 0;
    let mut response_count: u32 = 0;

    for event in events {
        match event.kind {
            EventKind::QuestionAsked => {
                if let Some(entry) = open.take() {
                    timeline.push(entry);
                }
                summary.total_questions += 1;
                open = Some(TimelineEntry {
                    question_number: event
                        .payload_u64("question_number")
                        .unwrap_or(u64::from(summary.total_questions))
                        as u32,
                    question_text: event.payload_str("question_text").map(str::to_string),
                    outcome: QuestionOutcome::Incomplete,
                    response_time_ms: None,
                    annotations: Vec::new(),
                });
            }
            EventKind::AnswerGiven => {
                if let Some(mut entry) = open.take() {
                    let correct = event.payload_bool("is_correct").unwrap_or(false);
                    entry.outcome = if correct {
                        summary.correct += 1;
                        QuestionOutcome::Correct
                    } else {
                        summary.wrong += 1;
                        QuestionOutcome::Wrong
                    };
                    entry.response_time_ms = event.payload_u64("response_time_ms");
                    if let Some(ms) = entry.response_time_ms {
                        response_sum += ms;
                        response_count += 1;
                    }
                    timeline.push(entry);
                }
            }
            EventKind::Timeout => {
                if let Some(mut entry) = open.take() {
                    entry.outcome = QuestionOutcome::Timeout;
                    timeline.push(entry);
                }
                summary.timeouts += 1;
            }
            EventKind::LifelineUsed => {
                let name = event
                    .payload_str("lifeline")
                    .unwrap_or("unknown")
                    .to_string();
                summary.lifelines_used.push(name.clone());
                if let Some(entry) = open.as_mut() {
                    entry.annotations.push(format!("lifeline: {name}"));
                }
            }
            EventKind::SessionTerminated => {
                summary.terminated = true;
                summary.termination_reason =
                    event.payload_str("reason").map(str::to_string);
            }
            // Turbo, photo, and tracking markers annotate the open
            // question when there is one; otherwise they remain visible
            // only in the raw log.
            EventKind::TurboModeActivated
            | EventKind::TurboModeGoReceived
            | EventKind::TurboModeGoTimeout
            | EventKind::TurboModeCompleted
            | EventKind::PhotoVerificationRequested
            | EventKind::PhotoVerificationPassed
            | EventKind::PhotoVerificationFailed
            | EventKind::PerfectGameFlagged
            | EventKind::Q1TimeoutTracked => {
                if let Some(entry) = open.as_mut() {
                    entry.annotations.push(event.kind.as_str().to_string());
                }
            }
        }
    }
    if let Some(entry) = open.take() {
        timeline.push(entry);
    }

    if response_count > 0 {
        summary.avg_response_ms = Some(response_sum as f64 / f64::from(response_count));
    }

    SessionReport {
        session_id: session_id.to_string(),
        user_id: user_id.to_string(),
        game_info: None,
        summary,
        timeline,
    }
}

impl fmt::Display for SessionReport {
    /// Dispute-resolution document; the serde form is the machine export.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session report: {}", self.session_id)?;
        writeln!(f, "Player:         {}", self.user_id)?;
        if let Some(info) = &self.game_info {
            writeln!(f, "Game:           {info}")?;
        }
        writeln!(
            f,
            "Questions:      {} ({} correct, {} wrong, {} timed out)",
            self.summary.total_questions,
            self.summary.correct,
            self.summary.wrong,
            self.summary.timeouts
        )?;
        match self.summary.avg_response_ms {
            Some(avg) => writeln!(f, "Avg response:   {avg:.0} ms")?,
            None => writeln!(f, "Avg response:   n/a")?,
        }
        if !self.summary.lifelines_used.is_empty() {
            writeln!(f, "Lifelines:      {}", self.summary.lifelines_used.join(", "))?;
        }
        if self.summary.terminated {
            writeln!(
                f,
                "TERMINATED:     {}",
                self.summary.termination_reason.as_deref().unwrap_or("unspecified")
            )?;
        }
        writeln!(f)?;
        for entry in &self.timeline {
            write!(f, "  Q{:<3} {}", entry.question_number, entry.outcome)?;
            if let Some(ms) = entry.response_time_ms {
                write!(f, " in {ms} ms")?;
            }
            writeln!(f)?;
            for note in &entry.annotations {
                writeln!(f, "       - {note}")?;
            }
        }
        Ok(())
    }
}
