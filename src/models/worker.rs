//! Worker identity and outcome models
//!
//! Defines the per-worker environment discriminator, exit status and results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code recorded when a worker process could not be started
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// Per-worker identity exposed to the spawned process.
///
/// The first worker keeps the "primary" identity (an empty value) so a
/// single-worker run looks exactly like an unparallelized one; every other
/// worker is numbered from 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvDiscriminator {
    Primary,
    Numbered(usize),
}

impl EnvDiscriminator {
    pub fn from_ordinal(ordinal: usize) -> Self {
        if ordinal == 0 {
            EnvDiscriminator::Primary
        } else {
            EnvDiscriminator::Numbered(ordinal + 1)
        }
    }

    /// Value placed in the worker's environment
    pub fn as_env_value(&self) -> String {
        match self {
            EnvDiscriminator::Primary => String::new(),
            EnvDiscriminator::Numbered(n) => n.to_string(),
        }
    }
}

impl fmt::Display for EnvDiscriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvDiscriminator::Primary => write!(f, "\"\""),
            EnvDiscriminator::Numbered(n) => write!(f, "{n}"),
        }
    }
}

/// How a worker ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum WorkerStatus {
    /// Process exited with a code
    Exited(i32),
    /// Process was killed by a signal or otherwise ended without a code
    Terminated,
    /// Process could not be started
    SpawnFailed(String),
    /// Nothing to run for this worker
    Skipped,
}

impl WorkerStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerStatus::Exited(0) | WorkerStatus::Skipped)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            WorkerStatus::Exited(code) => Some(*code),
            WorkerStatus::SpawnFailed(_) => Some(SPAWN_FAILURE_CODE),
            WorkerStatus::Skipped => Some(0),
            WorkerStatus::Terminated => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            WorkerStatus::Exited(0) => "✓",
            WorkerStatus::Skipped => "○",
            _ => "✗",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Exited(code) => write!(f, "exit {code}"),
            WorkerStatus::Terminated => write!(f, "terminated"),
            WorkerStatus::SpawnFailed(reason) => write!(f, "spawn failed: {reason}"),
            WorkerStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one worker
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerResult {
    pub ordinal: usize,
    pub discriminator: EnvDiscriminator,
    pub items: Vec<String>,
    pub status: WorkerStatus,
    pub duration_ms: u64,
    /// Combined stdout and stderr, in arrival order
    pub output: String,
}

impl WorkerResult {
    pub fn new(
        ordinal: usize,
        items: Vec<String>,
        status: WorkerStatus,
        output: impl Into<String>,
    ) -> Self {
        Self {
            ordinal,
            discriminator: EnvDiscriminator::from_ordinal(ordinal),
            items,
            status,
            duration_ms: 0,
            output: output.into(),
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn skipped(ordinal: usize) -> Self {
        Self::new(ordinal, Vec::new(), WorkerStatus::Skipped, "")
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl fmt::Display for WorkerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} worker {} ({} items, {}) [{}ms]",
            self.status.symbol(),
            self.ordinal + 1,
            self.items.len(),
            self.status,
            self.duration_ms
        )
    }
}
