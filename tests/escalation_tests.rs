//! Escalation Protocol Tests
//!
//! End-to-end scenarios through the engine facade:
//! - Challenge issue on the fast-correct threshold
//! - GO response before the deadline -> turbo mode
//! - Deadline expiry -> termination with TURBO_MODE_GO_TIMEOUT exactly once
//! - Turbo completion -> back to normal play
//! - Turbo re-trigger -> termination
//! - Photo challenge path
//! - Terminal finality and idempotent triggers
//!
//! Timer tests run on a paused tokio clock, so the 30-second challenge
//! deadline elapses instantly and deterministically.

use quizguard::{ChallengeKind, Config, Decision, EventKind, IntegrityEngine, Phase};
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

fn engine() -> IntegrityEngine {
    IntegrityEngine::new(Config::default())
}

fn photo_engine() -> IntegrityEngine {
    let mut config = Config::default();
    config.escalation.challenge_kind = ChallengeKind::Photo;
    IntegrityEngine::new(config)
}

/// Drive enough fast correct answers to flag the session
async fn flag_session(engine: &IntegrityEngine, session: &str) -> Decision {
    let mut last = Decision::Continue {
        answer_deadline_ms: None,
    };
    for q in 1..=5 {
        engine.record_question(session, q, None).unwrap();
        last = engine.submit_answer(session, q, true, 800).await.unwrap();
    }
    last
}

fn count_kind(engine: &IntegrityEngine, session: &str, kind: EventKind) -> usize {
    engine
        .store()
        .read(session)
        .unwrap()
        .iter()
        .filter(|e| e.kind == kind)
        .count()
}

// ============================================================================
// Challenge Entry
// ============================================================================

#[tokio::test]
async fn test_fifth_fast_answer_issues_go_challenge() {
    let engine = engine();
    let session = engine.start_session("u1");

    let decision = flag_session(&engine, &session).await;
    assert_eq!(
        decision,
        Decision::IssueChallenge {
            kind: ChallengeKind::Go,
            deadline_secs: 30
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::ChallengePending));
    assert_eq!(count_kind(&engine, &session, EventKind::TurboModeActivated), 1);
}

#[tokio::test]
async fn test_slow_answers_never_escalate() {
    let engine = engine();
    let session = engine.start_session("u1");
    for q in 1..=10 {
        engine.record_question(&session, q, None).unwrap();
        let decision = engine.submit_answer(&session, q, true, 5_000).await.unwrap();
        assert_eq!(
            decision,
            Decision::Continue {
                answer_deadline_ms: None
            }
        );
    }
    assert_eq!(engine.session_phase(&session), Some(Phase::Normal));
    assert!(engine.escalated_sessions().is_empty());
}

#[tokio::test]
async fn test_duplicate_trigger_is_idempotent() {
    let engine = engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;

    // A sixth fast answer arrives while the challenge is outstanding:
    // no second challenge, no second TURBO_MODE_ACTIVATED.
    engine.record_question(&session, 6, None).unwrap();
    let decision = engine.submit_answer(&session, 6, true, 500).await.unwrap();
    assert_eq!(
        decision,
        Decision::Continue {
            answer_deadline_ms: None
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::ChallengePending));
    assert_eq!(count_kind(&engine, &session, EventKind::TurboModeActivated), 1);
}

// ============================================================================
// Challenge Timeout (paused clock)
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_go_deadline_expiry_terminates_exactly_once() {
    let engine = engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;

    // No GO arrives; the paused clock sweeps past the 30s deadline.
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(engine.session_phase(&session), Some(Phase::Terminated));
    assert_eq!(count_kind(&engine, &session, EventKind::TurboModeGoTimeout), 1);
    assert_eq!(count_kind(&engine, &session, EventKind::SessionTerminated), 1);

    // A late GO changes nothing and appends nothing.
    let decision = engine.challenge_response(&session).await.unwrap();
    assert_eq!(
        decision,
        Decision::Terminate {
            reason: "turbo_go_timeout".to_string()
        }
    );
    assert_eq!(count_kind(&engine, &session, EventKind::TurboModeGoTimeout), 1);
    assert_eq!(count_kind(&engine, &session, EventKind::SessionTerminated), 1);
}

#[tokio::test(start_paused = true)]
async fn test_go_before_deadline_enters_turbo() {
    let engine = engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    let decision = engine.challenge_response(&session).await.unwrap();
    assert_eq!(
        decision,
        Decision::Continue {
            answer_deadline_ms: Some(5_000)
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::TurboActive));
    assert_eq!(count_kind(&engine, &session, EventKind::TurboModeGoReceived), 1);

    // The canceled challenge timer must never fire later.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(engine.session_phase(&session), Some(Phase::TurboActive));
    assert_eq!(count_kind(&engine, &session, EventKind::TurboModeGoTimeout), 0);
}

// ============================================================================
// Turbo Mode
// ============================================================================

#[tokio::test]
async fn test_turbo_completion_returns_to_normal() {
    let engine = engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;
    engine.challenge_response(&session).await.unwrap();

    // Three answers above the threshold, none re-triggering.
    for q in 6..=7 {
        engine.record_question(&session, q, None).unwrap();
        let decision = engine.submit_answer(&session, q, true, 6_000).await.unwrap();
        assert_eq!(
            decision,
            Decision::Continue {
                answer_deadline_ms: Some(5_000)
            }
        );
    }
    engine.record_question(&session, 8, None).unwrap();
    let decision = engine.submit_answer(&session, 8, true, 6_000).await.unwrap();
    assert_eq!(
        decision,
        Decision::Continue {
            answer_deadline_ms: None
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::Normal));
    assert_eq!(count_kind(&engine, &session, EventKind::TurboModeCompleted), 1);
}

#[tokio::test]
async fn test_turbo_fast_answer_terminates() {
    let engine = engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;
    engine.challenge_response(&session).await.unwrap();

    engine.record_question(&session, 6, None).unwrap();
    let decision = engine.submit_answer(&session, 6, true, 400).await.unwrap();
    assert_eq!(
        decision,
        Decision::Terminate {
            reason: "turbo_reflagged".to_string()
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::Terminated));
    assert_eq!(count_kind(&engine, &session, EventKind::SessionTerminated), 1);
}

#[tokio::test]
async fn test_turbo_timeout_counts_as_cleared_question() {
    let engine = engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;
    engine.challenge_response(&session).await.unwrap();

    for q in 6..=8 {
        engine.record_question(&session, q, None).unwrap();
        engine.question_timeout(&session, q).await.unwrap();
    }
    assert_eq!(engine.session_phase(&session), Some(Phase::Normal));
    assert_eq!(count_kind(&engine, &session, EventKind::TurboModeCompleted), 1);
}

#[tokio::test]
async fn test_cleared_challenge_forgives_old_fast_answers() {
    let engine = engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;
    engine.challenge_response(&session).await.unwrap();
    for q in 6..=8 {
        engine.record_question(&session, q, None).unwrap();
        engine.submit_answer(&session, q, true, 6_000).await.unwrap();
    }
    assert_eq!(engine.session_phase(&session), Some(Phase::Normal));

    // Back to normal: the five pre-challenge fast answers must not
    // immediately re-flag the session on the next ordinary answer.
    engine.record_question(&session, 9, None).unwrap();
    let decision = engine.submit_answer(&session, 9, true, 6_000).await.unwrap();
    assert_eq!(
        decision,
        Decision::Continue {
            answer_deadline_ms: None
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::Normal));
}

// ============================================================================
// Photo Challenge Path
// ============================================================================

#[tokio::test]
async fn test_photo_challenge_pass_returns_to_normal() {
    let engine = photo_engine();
    let session = engine.start_session("u1");

    let decision = flag_session(&engine, &session).await;
    assert_eq!(
        decision,
        Decision::IssueChallenge {
            kind: ChallengeKind::Photo,
            deadline_secs: 30
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::PhotoChallenge));
    assert_eq!(
        count_kind(&engine, &session, EventKind::PhotoVerificationRequested),
        1
    );

    let decision = engine.photo_result(&session, true).await.unwrap();
    assert_eq!(
        decision,
        Decision::Continue {
            answer_deadline_ms: None
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::Normal));
    assert_eq!(
        count_kind(&engine, &session, EventKind::PhotoVerificationPassed),
        1
    );
}

#[tokio::test]
async fn test_photo_challenge_failure_terminates() {
    let engine = photo_engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;

    let decision = engine.photo_result(&session, false).await.unwrap();
    assert_eq!(
        decision,
        Decision::Terminate {
            reason: "photo_verification_failed".to_string()
        }
    );
    assert_eq!(engine.session_phase(&session), Some(Phase::Terminated));
}

#[tokio::test(start_paused = true)]
async fn test_photo_challenge_timeout_terminates() {
    let engine = photo_engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(engine.session_phase(&session), Some(Phase::Terminated));
    assert_eq!(
        count_kind(&engine, &session, EventKind::PhotoVerificationFailed),
        1
    );
}

// ============================================================================
// Terminal Finality
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_terminated_session_phase_never_changes() {
    let engine = engine();
    let session = engine.start_session("u1");
    flag_session(&engine, &session).await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(engine.session_phase(&session), Some(Phase::Terminated));

    // Further inputs keep returning Terminate and never move the phase.
    engine.record_question(&session, 6, None).unwrap();
    let decision = engine.submit_answer(&session, 6, true, 6_000).await.unwrap();
    assert!(matches!(decision, Decision::Terminate { .. }));
    let decision = engine.question_timeout(&session, 6).await.unwrap();
    assert!(matches!(decision, Decision::Terminate { .. }));
    assert_eq!(engine.session_phase(&session), Some(Phase::Terminated));

    // Forensic appends still land in the log.
    engine
        .append_raw(&session, "PERFECT_GAME_FLAGGED", serde_json::json!({}))
        .unwrap();
    assert_eq!(count_kind(&engine, &session, EventKind::PerfectGameFlagged), 1);
}

#[tokio::test]
async fn test_escalated_listing_tracks_phases() {
    let engine = engine();
    let calm = engine.start_session("u1");
    let flagged = engine.start_session("u2");
    engine.record_question(&calm, 1, None).unwrap();
    engine.submit_answer(&calm, 1, true, 6_000).await.unwrap();
    flag_session(&engine, &flagged).await;

    let escalated = engine.escalated_sessions();
    assert_eq!(escalated.len(), 1);
    assert_eq!(escalated[0], (flagged.clone(), Phase::ChallengePending));
}
