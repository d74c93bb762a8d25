//! Per-Session Actor
//!
//! One lightweight tokio task per active session owns that session's
//! escalation machine. The game loop talks to it by message passing
//! (`mpsc` commands, `oneshot` replies); nothing else may touch the
//! machine, which is what serializes scoring and transitions within a
//! session while keeping sessions fully independent of each other.
//!
//! The only timed wait in the engine lives here: while a challenge is
//! outstanding the select loop races the command channel against
//! `sleep_until(deadline)`. Whichever the actor observes first wins, so a
//! near-simultaneous GO and expiry resolve deterministically, and the
//! timeout action fires at most once — a response or session end disarms
//! the timer before it can fire, and a terminated machine absorbs a raced
//! leftover expiry without re-emitting anything.
//!
//! The machine's emitted events are appended here, so the log stays the
//! source of truth even for transitions nobody called in (deadline expiry).
//!
//! Actors do not live forever: a session with no game-loop input for the
//! configured idle window is reaped — the task exits and removes its own
//! registry entry. The log outlives the actor; a later call revives the
//! session by replay.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::escalation::{Decision, Effects, Escalation, Phase};
use crate::event::EventKind;
use crate::event::SessionId;
use crate::scorer::Scorer;
use crate::store::EventStore;

/// Command channel depth per session; the game loop is strictly
/// request/response so this never fills in practice.
const COMMAND_BUFFER: usize = 32;

pub(crate) enum Command {
    /// An `ANSWER_GIVEN` event was appended; score and transition
    Answer {
        is_correct: bool,
        response_time_ms: u64,
        reply: oneshot::Sender<Decision>,
    },
    /// The current question timed out
    QuestionTimeout { reply: oneshot::Sender<Decision> },
    /// The player answered the GO challenge
    Go { reply: oneshot::Sender<Decision> },
    /// Photo verification result arrived
    PhotoResult {
        passed: bool,
        reply: oneshot::Sender<Decision>,
    },
    /// Session is over; stop the actor and cancel any pending timer
    End,
}

/// Engine-side handle to one session's actor
#[derive(Clone)]
pub(crate) struct ActorHandle {
    pub tx: mpsc::Sender<Command>,
    pub phase: watch::Receiver<Phase>,
}

impl ActorHandle {
    pub fn current_phase(&self) -> Phase {
        *self.phase.borrow()
    }
}

pub(crate) struct SessionActor {
    session_id: SessionId,
    store: Arc<EventStore>,
    scorer: Arc<Scorer>,
    machine: Escalation,
    rx: mpsc::Receiver<Command>,
    /// Weak identity of this actor's own channel, used to remove exactly
    /// our registry entry on idle reap (never a replacement's)
    self_tx: mpsc::WeakSender<Command>,
    phase_tx: watch::Sender<Phase>,
    registry: Arc<DashMap<SessionId, ActorHandle>>,
    deadline: Option<Instant>,
    idle_deadline: Instant,
    idle_timeout: Duration,
    /// Answers at or below this sequence no longer count toward a verdict
    /// (they belong to an already-cleared challenge)
    score_floor: u64,
}

impl SessionActor {
    /// Spawn the actor task for one session.
    ///
    /// `machine` is either fresh (`Escalation::new`) or rebuilt from the
    /// log (`Escalation::replay`) when recovering a crashed session; a
    /// recovered outstanding challenge re-arms a fresh full deadline.
    pub fn spawn(
        session_id: SessionId,
        store: Arc<EventStore>,
        scorer: Arc<Scorer>,
        machine: Escalation,
        score_floor: u64,
        registry: Arc<DashMap<SessionId, ActorHandle>>,
    ) -> ActorHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (phase_tx, phase_rx) = watch::channel(machine.phase());

        let deadline = match machine.phase() {
            Phase::ChallengePending | Phase::PhotoChallenge => Some(
                Instant::now()
                    + Duration::from_secs(machine.config().challenge_deadline_secs),
            ),
            _ => None,
        };
        let idle_timeout = Duration::from_secs(machine.config().idle_timeout_secs);

        let actor = SessionActor {
            session_id,
            store,
            scorer,
            machine,
            rx,
            self_tx: tx.downgrade(),
            phase_tx,
            registry,
            deadline,
            idle_deadline: Instant::now() + idle_timeout,
            idle_timeout,
            score_floor,
        };
        tokio::spawn(actor.run());

        ActorHandle {
            tx,
            phase: phase_rx,
        }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            let idle_deadline = self.idle_deadline;
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(Command::End) | None => {
                            // Cancellation point: dropping the loop drops the
                            // armed deadline with it, so a canceled timer can
                            // never fire a transition later.
                            debug!(session_id = %self.session_id, "session actor stopping");
                            break;
                        }
                        Some(cmd) => {
                            self.idle_deadline = Instant::now() + self.idle_timeout;
                            self.handle_command(cmd);
                        }
                    }
                }
                () = async {
                    match deadline {
                        Some(d) => tokio::time::sleep_until(d).await,
                        None => std::future::pending().await,
                    }
                }, if deadline.is_some() => {
                    self.deadline = None;
                    self.idle_deadline = Instant::now() + self.idle_timeout;
                    info!(session_id = %self.session_id, "challenge deadline expired");
                    let effects = self.machine.on_deadline_expired();
                    self.apply(effects);
                }
                // Idle reap: no game-loop input for the whole window and no
                // challenge outstanding (a challenge wait is bounded by its
                // own timer above). The log survives; a later call revives
                // the session by replay.
                () = tokio::time::sleep_until(idle_deadline), if deadline.is_none() => {
                    info!(session_id = %self.session_id, "idle session reaped");
                    self.unregister();
                    break;
                }
            }
        }
    }

    /// Remove this actor's own registry entry, if it is still ours.
    fn unregister(&self) {
        if let Some(tx) = self.self_tx.upgrade() {
            self.registry
                .remove_if(&self.session_id, |_, handle| handle.tx.same_channel(&tx));
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Answer {
                is_correct,
                response_time_ms,
                reply,
            } => {
                // In turbo mode each answer is judged on its own: the
                // windowed count that opened the challenge cannot reach
                // its threshold again within N questions, so re-trigger
                // means "this answer was itself suspiciously fast".
                let flagged = if self.machine.phase() == Phase::TurboActive {
                    is_correct
                        && response_time_ms < self.scorer.config().max_response_threshold_ms
                } else {
                    self.score_session()
                };
                let effects = self.machine.on_answer(flagged);
                let decision = self.apply(effects);
                let _ = reply.send(decision);
            }
            Command::QuestionTimeout { reply } => {
                let effects = self.machine.on_question_timeout();
                let decision = self.apply(effects);
                let _ = reply.send(decision);
            }
            Command::Go { reply } => {
                let effects = self.machine.on_go_received();
                let decision = self.apply(effects);
                let _ = reply.send(decision);
            }
            Command::PhotoResult { passed, reply } => {
                let effects = self.machine.on_photo_result(passed);
                let decision = self.apply(effects);
                let _ = reply.send(decision);
            }
            Command::End => unreachable!("End is handled by the run loop"),
        }
    }

    fn score_session(&self) -> bool {
        let events = match self.store.read(&self.session_id) {
            Ok(events) => events,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "scoring read failed");
                return false;
            }
        };
        let floor = self.score_floor;
        let scorable: Vec<_> = events
            .into_iter()
            .filter(|e| e.sequence > floor)
            .collect();
        let verdict = self.scorer.score(&self.session_id, &scorable);
        if verdict.flagged {
            info!(
                session_id = %self.session_id,
                fast_correct = verdict.fast_correct_count,
                min_response_ms = ?verdict.min_response_ms,
                "suspicion flagged"
            );
        }
        verdict.flagged
    }

    /// Append the machine's emitted events, publish the phase, and manage
    /// the challenge timer.
    fn apply(&mut self, effects: Effects) -> Decision {
        for (kind, payload) in effects.emit {
            match self.store.append(&self.session_id, kind, payload) {
                Ok(seq) => {
                    // Clearing a challenge forgives the answers behind it.
                    if matches!(
                        kind,
                        EventKind::TurboModeGoReceived
                            | EventKind::TurboModeCompleted
                            | EventKind::PhotoVerificationPassed
                    ) {
                        self.score_floor = seq;
                    }
                }
                Err(e) => {
                    warn!(session_id = %self.session_id, %kind, error = %e, "append failed");
                }
            }
        }

        let phase = self.machine.phase();
        self.phase_tx.send_replace(phase);

        match &effects.decision {
            Decision::IssueChallenge { deadline_secs, kind } => {
                info!(
                    session_id = %self.session_id,
                    challenge = %kind,
                    deadline_secs,
                    "challenge issued"
                );
                self.deadline = Some(Instant::now() + Duration::from_secs(*deadline_secs));
            }
            Decision::Terminate { reason } => {
                info!(session_id = %self.session_id, reason = %reason, "session terminated");
                self.deadline = None;
            }
            Decision::Continue { .. } => {
                // A resolved challenge (GO received, photo passed) leaves
                // the waiting phases; disarm so the old timer cannot fire.
                if !matches!(phase, Phase::ChallengePending | Phase::PhotoChallenge) {
                    self.deadline = None;
                }
            }
        }

        effects.decision
    }
}
