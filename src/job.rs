//! Per-job lifecycle state machine.
//!
//! ```text
//! Idle ─▶ Allocating ─▶ Running ─┬─▶ Succeeded    ─┐
//!              │                 ├─▶ TimedOut     ─┤
//!              │                 ├─▶ EngineFailed ─┤
//!              │                 ├─▶ NoOutput     ─┼─▶ Cleaned
//!              │                 ├─▶ Cancelled    ─┤
//!              └─────────────────┴─▶ Faulted      ─┘
//! ```
//!
//! Transitions only move forward. [`JobTracker`] keeps the history so tests
//! and logs can show exactly which path a job took.

use crate::error::OcrJobError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Allocating,
    Running,
    Succeeded,
    TimedOut,
    EngineFailed,
    NoOutput,
    Cancelled,
    /// Unexpected fault outside the engine: allocation or result read failed.
    Faulted,
    Cleaned,
}

impl JobState {
    /// Whether the conversion itself is over (cleanup may still be pending).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded
                | JobState::TimedOut
                | JobState::EngineFailed
                | JobState::NoOutput
                | JobState::Cancelled
                | JobState::Faulted
        )
    }

    /// Whether `self → next` is a legal forward transition.
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Idle, Allocating) => true,
            (Allocating, Running) | (Allocating, Faulted) => true,
            (Running, s) => s.is_terminal(),
            (s, Cleaned) => s.is_terminal(),
            _ => false,
        }
    }

    /// The terminal state a failed job lands in.
    pub fn for_error(err: &OcrJobError) -> JobState {
        match err {
            OcrJobError::Timeout { .. } => JobState::TimedOut,
            OcrJobError::EngineFailure { .. } | OcrJobError::EngineSpawnFailed { .. } => {
                JobState::EngineFailed
            }
            OcrJobError::NoOutputProduced { .. } => JobState::NoOutput,
            OcrJobError::Cancelled => JobState::Cancelled,
            _ => JobState::Faulted,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Allocating => "allocating",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::TimedOut => "timed_out",
            JobState::EngineFailed => "engine_failed",
            JobState::NoOutput => "no_output",
            JobState::Cancelled => "cancelled",
            JobState::Faulted => "faulted",
            JobState::Cleaned => "cleaned",
        };
        f.write_str(s)
    }
}

/// Tracks one job's forward-only progression through [`JobState`].
#[derive(Debug, Clone)]
pub struct JobTracker {
    history: Vec<JobState>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            history: vec![JobState::Idle],
        }
    }

    pub fn state(&self) -> JobState {
        *self.history.last().unwrap_or(&JobState::Idle)
    }

    /// Every state visited so far, starting at `Idle`.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    /// Move to `next`. An illegal transition is logged and ignored, so the
    /// tracker never moves backwards or re-enters a state.
    pub fn advance(&mut self, next: JobState) -> bool {
        let current = self.state();
        if !current.can_advance_to(next) {
            error!("Illegal job transition {} -> {} ignored", current, next);
            return false;
        }
        debug!("Job state: {} -> {}", current, next);
        self.history.push(next);
        true
    }
}
