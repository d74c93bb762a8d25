//! # QuizGuard Operator Console
//!
//! A small Read-Eval-Print Loop over an in-process integrity engine, for
//! exercising the escalation protocol and inspecting reports.
//!
//! ## Usage
//!
//! ```bash
//! cargo run
//! ```
//!
//! Then drive a session:
//! - `.start <user>` - Start a session, prints its id
//! - `.answer <session> <q> <correct|wrong> <ms>` - Submit an answer
//! - `.go <session>` - Answer the GO challenge
//! - `.report <session>` - Print the forensic report
//! - `.quit` - Exit

use anyhow::Result;
use quizguard::config::LoggingConfig;
use quizguard::{Config, Decision, IntegrityEngine};
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|_| {
        println!("Using default configuration");
        Config::default()
    });
    init_tracing(&config.logging);

    println!("QuizGuard Integrity Engine Console");
    println!("==================================\n");
    print_help();

    let engine = IntegrityEngine::new(config);

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input.starts_with(".quit") || input.starts_with(".exit") {
            println!("Goodbye!");
            break;
        }
        if input.starts_with(".help") {
            print_help();
            continue;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        match parts.as_slice() {
            [".start", user] => {
                let session = engine.start_session(user);
                println!("Session started: {session}");
            }
            [".question", session, q] => match q.parse::<u32>() {
                Ok(q) => match engine.record_question(session, q, None) {
                    Ok(seq) => println!("Recorded (seq {seq})"),
                    Err(e) => println!("Error: {e}"),
                },
                Err(_) => println!("Usage: .question <session> <number>"),
            },
            [".answer", session, q, verdict, ms] => {
                let (Ok(q), Ok(ms)) = (q.parse::<u32>(), ms.parse::<u64>()) else {
                    println!("Usage: .answer <session> <q> <correct|wrong> <ms>");
                    continue;
                };
                let correct = *verdict == "correct";
                match engine.submit_answer(session, q, correct, ms).await {
                    Ok(decision) => print_decision(&decision),
                    Err(e) => println!("Error: {e}"),
                }
            }
            [".timeout", session, q] => match q.parse::<u32>() {
                Ok(q) => match engine.question_timeout(session, q).await {
                    Ok(decision) => print_decision(&decision),
                    Err(e) => println!("Error: {e}"),
                },
                Err(_) => println!("Usage: .timeout <session> <number>"),
            },
            [".go", session] => match engine.challenge_response(session).await {
                Ok(decision) => print_decision(&decision),
                Err(e) => println!("Error: {e}"),
            },
            [".photo", session, result] => {
                match engine.photo_result(session, *result == "pass").await {
                    Ok(decision) => print_decision(&decision),
                    Err(e) => println!("Error: {e}"),
                }
            }
            [".report", session] => match engine.build_report(session) {
                Ok(report) => println!("{report}"),
                Err(e) => println!("Error: {e}"),
            },
            [".score", session] => match engine.score(session) {
                Ok(verdict) => match serde_json::to_string_pretty(&verdict) {
                    Ok(json) => println!("{json}"),
                    Err(e) => println!("Error: {e}"),
                },
                Err(e) => println!("Error: {e}"),
            },
            [".escalated"] => {
                let escalated = engine.escalated_sessions();
                if escalated.is_empty() {
                    println!("No escalated sessions");
                }
                for (session, phase) in escalated {
                    println!("  {session}  {phase}");
                }
            }
            [".end", session] => {
                engine.end_session(session).await;
                println!("Session ended");
            }
            [".cleanup", days] => match days.parse::<u32>() {
                Ok(days) => {
                    let removed = engine.cleanup(days);
                    println!("Removed {removed} session(s)");
                }
                Err(_) => println!("Usage: .cleanup <days>"),
            },
            _ => {
                println!("Unknown command: {input}");
                println!("Type .help for available commands");
            }
        }
    }
    Ok(())
}

fn print_decision(decision: &Decision) {
    match decision {
        Decision::Continue { answer_deadline_ms } => match answer_deadline_ms {
            Some(ms) => println!("continue (turbo: answer within {ms} ms)"),
            None => println!("continue"),
        },
        Decision::IssueChallenge { kind, deadline_secs } => {
            println!("CHALLENGE [{kind}] - respond within {deadline_secs}s");
        }
        Decision::Terminate { reason } => println!("TERMINATE ({reason})"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  .start <user>                          - Start a session");
    println!("  .question <session> <q>                - Record a question");
    println!("  .answer <session> <q> <correct|wrong> <ms>");
    println!("  .timeout <session> <q>                 - Question timed out");
    println!("  .go <session>                          - Answer the GO challenge");
    println!("  .photo <session> <pass|fail>           - Photo verification result");
    println!("  .report <session>                      - Forensic report");
    println!("  .score <session>                       - Suspicion verdict (JSON)");
    println!("  .escalated                             - Sessions under escalation");
    println!("  .end <session>                         - End a session");
    println!("  .cleanup <days>                        - Retention cleanup");
    println!("  .quit                                  - Exit\n");
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));
    if logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
