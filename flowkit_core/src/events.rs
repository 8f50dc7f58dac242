//! Run events and the sinks that receive them.
//!
//! The executor and flows emit a [`RunEvent`] for every attempt and every
//! terminal outcome. Events are delivered to zero or more
//! [`RunEventSink`] collaborators registered on the executor. Nothing here
//! is persisted; sinks decide what to do with the events.
//!
//! # Events
//!
//! - `AttemptSucceeded` / `AttemptFailed`: one per attempt
//! - `RetryScheduled`: a failed attempt will be followed by another
//! - `TaskSucceeded` / `TaskRetriesExhausted`: one per invocation
//! - `FlowStarted` / `FlowCompleted` / `FlowFailed`: one pair per flow run

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Event emitted while running tasks and flows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// An attempt returned a value
    AttemptSucceeded {
        timestamp: DateTime<Utc>,
        invocation_id: Uuid,
        task_name: String,
        attempt: u32,
        max_attempts: u32,
    },
    /// An attempt returned an error
    AttemptFailed {
        timestamp: DateTime<Utc>,
        invocation_id: Uuid,
        task_name: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    /// Another attempt will run after the delay
    RetryScheduled {
        timestamp: DateTime<Utc>,
        invocation_id: Uuid,
        task_name: String,
        next_attempt: u32,
        delay_ms: u64,
    },
    /// Invocation finished with a value
    TaskSucceeded {
        timestamp: DateTime<Utc>,
        invocation_id: Uuid,
        task_name: String,
        attempts: u32,
    },
    /// Invocation gave up after the last allowed attempt
    TaskRetriesExhausted {
        timestamp: DateTime<Utc>,
        invocation_id: Uuid,
        task_name: String,
        attempts: u32,
        error: String,
    },
    /// Flow run started
    FlowStarted {
        timestamp: DateTime<Utc>,
        flow_run_id: Uuid,
        flow_name: String,
    },
    /// Flow run finished successfully
    FlowCompleted {
        timestamp: DateTime<Utc>,
        flow_run_id: Uuid,
        flow_name: String,
        task_runs: usize,
    },
    /// Flow run stopped on an error
    FlowFailed {
        timestamp: DateTime<Utc>,
        flow_run_id: Uuid,
        flow_name: String,
        error: String,
    },
}

impl RunEvent {
    /// Returns the event timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RunEvent::AttemptSucceeded { timestamp, .. }
            | RunEvent::AttemptFailed { timestamp, .. }
            | RunEvent::RetryScheduled { timestamp, .. }
            | RunEvent::TaskSucceeded { timestamp, .. }
            | RunEvent::TaskRetriesExhausted { timestamp, .. }
            | RunEvent::FlowStarted { timestamp, .. }
            | RunEvent::FlowCompleted { timestamp, .. }
            | RunEvent::FlowFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Returns true for per-attempt events.
    pub fn is_attempt(&self) -> bool {
        matches!(
            self,
            RunEvent::AttemptSucceeded { .. } | RunEvent::AttemptFailed { .. }
        )
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.timestamp().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        match self {
            RunEvent::AttemptSucceeded {
                task_name,
                attempt,
                max_attempts,
                ..
            } => write!(f, "{} {} attempt {}/{} succeeded", ts, task_name, attempt, max_attempts),
            RunEvent::AttemptFailed {
                task_name,
                attempt,
                max_attempts,
                error,
                ..
            } => write!(
                f,
                "{} {} attempt {}/{} failed: {}",
                ts, task_name, attempt, max_attempts, error
            ),
            RunEvent::RetryScheduled {
                task_name,
                next_attempt,
                delay_ms,
                ..
            } => write!(
                f,
                "{} {} attempt {} in {}ms",
                ts, task_name, next_attempt, delay_ms
            ),
            RunEvent::TaskSucceeded {
                task_name, attempts, ..
            } => write!(f, "{} {} succeeded after {} attempt(s)", ts, task_name, attempts),
            RunEvent::TaskRetriesExhausted {
                task_name,
                attempts,
                error,
                ..
            } => write!(
                f,
                "{} {} gave up after {} attempt(s): {}",
                ts, task_name, attempts, error
            ),
            RunEvent::FlowStarted { flow_name, .. } => write!(f, "{} flow '{}' started", ts, flow_name),
            RunEvent::FlowCompleted {
                flow_name, task_runs, ..
            } => write!(
                f,
                "{} flow '{}' completed ({} task run(s))",
                ts, flow_name, task_runs
            ),
            RunEvent::FlowFailed {
                flow_name, error, ..
            } => write!(f, "{} flow '{}' failed: {}", ts, flow_name, error),
        }
    }
}

/// Receiver for run events.
///
/// Implementations must not fail the run; delivery problems are theirs to
/// log and swallow.
#[async_trait]
pub trait RunEventSink: Send + Sync {
    /// Records one event.
    async fn record(&self, event: RunEvent);
}

/// In-memory sink that keeps every event it receives.
///
/// Clones share the same buffer, so a test can keep one handle and give
/// another to the executor.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events.
    pub fn events(&self) -> Vec<RunEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RunEvent>> {
        // A poisoned buffer still holds valid events.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RunEventSink for MemorySink {
    async fn record(&self, event: RunEvent) {
        self.lock().push(event);
    }
}

/// Sink writing one JSON object per line to a writer.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> RunEventSink for JsonLinesSink<W> {
    async fn record(&self, event: RunEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to serialize run event: {}", e);
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            tracing::warn!("Failed to write run event: {}", e);
        }
    }
}

/// Sink writing one human-readable line per event to a writer.
pub struct TextSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl TextSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> RunEventSink for TextSink<W> {
    async fn record(&self, event: RunEvent) {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(writer, "{}", event).and_then(|_| writer.flush()) {
            tracing::warn!("Failed to write run event: {}", e);
        }
    }
}
