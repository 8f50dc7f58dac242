//! Attempt records for a single task invocation.
//!
//! Each call into a task body yields one [`AttemptRecord`]. Records are kept
//! in an [`AttemptLog`] owned by the invocation; the log is handed back to
//! the caller inside the invocation result and is not retained anywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Task body returned a value
    Succeeded,
    /// Task body returned an error
    Failed {
        /// Display text of the error
        error: String,
    },
}

/// One execution attempt of a task body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt ordinal
    pub attempt: u32,
    /// What happened
    pub outcome: AttemptOutcome,
    /// When the body was invoked
    pub started_at: DateTime<Utc>,
    /// When the body returned
    pub finished_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Creates a success record.
    pub fn succeeded(attempt: u32, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            attempt,
            outcome: AttemptOutcome::Succeeded,
            started_at,
            finished_at,
        }
    }

    /// Creates a failure record.
    pub fn failed(
        attempt: u32,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt,
            outcome: AttemptOutcome::Failed {
                error: error.into(),
            },
            started_at,
            finished_at,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded)
    }

    /// Error text if this attempt failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Failed { error } => Some(error),
            AttemptOutcome::Succeeded => None,
        }
    }
}

/// Ordered, append-only log of attempts for one invocation.
///
/// Ordinals are always `1..=len` with no gaps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptLog {
    records: Vec<AttemptRecord>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordinal the next appended record must carry.
    pub fn next_attempt(&self) -> u32 {
        self.records.len() as u32 + 1
    }

    /// Appends a record.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the record's ordinal is not
    /// [`next_attempt`](Self::next_attempt).
    ///
    /// Timestamps come from the wall clock and are not checked, so a clock
    /// step between attempts does not reject the record.
    pub fn push(&mut self, record: AttemptRecord) {
        debug_assert_eq!(record.attempt, self.next_attempt(), "attempt ordinals must be contiguous");
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&AttemptRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttemptRecord> {
        self.records.iter()
    }

    /// Number of failed attempts.
    pub fn failure_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_success()).count()
    }
}

impl<'a> IntoIterator for &'a AttemptLog {
    type Item = &'a AttemptRecord;
    type IntoIter = std::slice::Iter<'a, AttemptRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
