// src/queue/mod.rs
//! Delayed task execution: a process-scoped delay queue feeding a worker pool,
//! with a fixed retry bound and explicit flushing on shutdown.

pub mod runner;

pub use runner::{QueueHandle, TaskQueue};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "sid", rename_all = "snake_case")]
pub enum Task {
    FetchSource(String),
    DeriveFeed(String),
}

impl Task {
    pub fn fetch(sid: impl Into<String>) -> Self {
        Self::FetchSource(sid.into())
    }

    pub fn derive(sid: impl Into<String>) -> Self {
        Self::DeriveFeed(sid.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::FetchSource(_) => "fetch_source",
            Self::DeriveFeed(_) => "derive_feed",
        }
    }

    pub fn sid(&self) -> &str {
        match self {
            Self::FetchSource(sid) | Self::DeriveFeed(sid) => sid,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.sid())
    }
}

/// Attempt bookkeeping handed to every run. `attempt` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RunContext {
    /// A run that will not be retried.
    pub fn single() -> Self {
        Self {
            attempt: 1,
            max_attempts: 1,
        }
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, task: Task, delay: Duration);
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// An `Err` is retried until the attempt bound is used up.
    async fn run(&self, task: &Task, ctx: RunContext) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub task: Task,
    pub attempt: u32,
    pub ok: bool,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledTask {
    pub task: Task,
    pub attempt: u32,
    /// Delay requested when the task was scheduled.
    pub delay: Duration,
    pub due_in_ms: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushStats {
    pub pending: usize,
    pub scheduled: usize,
    pub results: usize,
}
