//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - quizguard.toml (default configuration)
//! - quizguard.local.toml (git-ignored local overrides)
//! - Environment variables (QUIZGUARD_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # quizguard.toml
//! [scoring]
//! max_response_threshold_ms = 2000
//! min_fast_correct_answers = 5
//!
//! [escalation]
//! challenge_deadline_secs = 30
//! challenge_kind = "go"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! QUIZGUARD_SCORING__MIN_FAST_CORRECT_ANSWERS=7
//! QUIZGUARD_RETENTION__DEFAULT_DAYS=14
//! ```
//!
//! Scoring and escalation thresholds are runtime-tunable: the engine holds
//! them behind `arc_swap` and accepts replacements without reconstruction.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Suspicion scorer thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// A correct answer faster than this counts as suspiciously fast
    #[serde(default = "default_max_response_threshold_ms")]
    pub max_response_threshold_ms: u64,

    /// Fast correct answers within the window before a session is flagged
    #[serde(default = "default_min_fast_correct_answers")]
    pub min_fast_correct_answers: u32,

    /// Sliding window: how many trailing correct answers are considered
    #[serde(default = "default_window")]
    pub window: usize,
}

/// Which challenge a freshly flagged session is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    /// Countdown challenge: the player must type GO before the deadline
    #[default]
    Go,
    /// Photo/liveness verification challenge
    Photo,
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeKind::Go => write!(f, "go"),
            ChallengeKind::Photo => write!(f, "photo"),
        }
    }
}

/// Escalation state machine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Seconds the player has to answer a challenge before termination
    #[serde(default = "default_challenge_deadline_secs")]
    pub challenge_deadline_secs: u64,

    /// Questions the player must clear under reduced timers in turbo mode
    #[serde(default = "default_turbo_question_count")]
    pub turbo_question_count: u32,

    /// Per-question deadline multiplier while turbo is active (0.5 = halved)
    #[serde(default = "default_turbo_deadline_fraction")]
    pub turbo_deadline_fraction: f64,

    /// Baseline per-question deadline the turbo fraction is applied to
    #[serde(default = "default_question_deadline_ms")]
    pub question_deadline_ms: u64,

    /// Which challenge path a flagged session enters
    #[serde(default)]
    pub challenge_kind: ChallengeKind,

    /// Seconds without any game-loop input before an idle session's
    /// controller is reaped (the event log is kept)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

/// Retention manager bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days of events kept when cleanup runs without an explicit argument
    #[serde(default = "default_retention_days")]
    pub default_days: u32,

    /// Operator ceiling on any cleanup request; itself clamped into the
    /// hard [1, 30] bound, so retention can be tightened but never widened
    #[serde(default = "default_retention_max_days")]
    pub max_days: u32,

    /// Hours between scheduled cleanup passes (0 = on-demand only)
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_response_threshold_ms() -> u64 {
    2_000
}
fn default_min_fast_correct_answers() -> u32 {
    5
}
fn default_window() -> usize {
    10
}
fn default_challenge_deadline_secs() -> u64 {
    30
}
fn default_turbo_question_count() -> u32 {
    3
}
fn default_turbo_deadline_fraction() -> f64 {
    0.5
}
fn default_question_deadline_ms() -> u64 {
    10_000
}
fn default_idle_timeout_secs() -> u64 {
    3_600
}
fn default_retention_days() -> u32 {
    30
}
fn default_retention_max_days() -> u32 {
    30
}
fn default_sweep_interval_hours() -> u64 {
    24
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. quizguard.toml (base configuration)
    /// 2. quizguard.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (QUIZGUARD_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("quizguard.toml"))
            .merge(Toml::file("quizguard.local.toml"))
            .merge(Env::prefixed("QUIZGUARD_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("QUIZGUARD_").split("__"))
            .extract()
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            max_response_threshold_ms: default_max_response_threshold_ms(),
            min_fast_correct_answers: default_min_fast_correct_answers(),
            window: default_window(),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        EscalationConfig {
            challenge_deadline_secs: default_challenge_deadline_secs(),
            turbo_question_count: default_turbo_question_count(),
            turbo_deadline_fraction: default_turbo_deadline_fraction(),
            question_deadline_ms: default_question_deadline_ms(),
            challenge_kind: ChallengeKind::default(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            default_days: default_retention_days(),
            max_days: default_retention_max_days(),
            sweep_interval_hours: default_sweep_interval_hours(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl EscalationConfig {
    /// Reduced per-question deadline while turbo mode is active
    pub fn turbo_deadline_ms(&self) -> u64 {
        (self.question_deadline_ms as f64 * self.turbo_deadline_fraction) as u64
    }
}
