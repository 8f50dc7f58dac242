//! Retrying task executor.
//!
//! Runs a [`Task`] body, retrying failed attempts with a fixed delay until
//! the task's [`RetryPolicy`](crate::retry::RetryPolicy) is exhausted.
//!
//! # Execution Model
//!
//! One invocation is a single linear loop on the caller's task:
//! 1. Invoke the body with a clone of the arguments
//! 2. Record the attempt and emit one log line for it
//! 3. On success, return the value
//! 4. On failure, sleep `retry_delay` and go to 1 while attempts remain
//! 5. Otherwise stop with [`ExecutorError::RetriesExhausted`]
//!
//! Intermediate failures never reach the caller. No state survives an
//! invocation: each call to [`TaskExecutor::run`] starts a fresh attempt log.

use crate::attempt::{AttemptLog, AttemptRecord};
use crate::events::{RunEvent, RunEventSink};
use crate::task::{AttemptContext, Task, TaskError};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Error surfaced to the caller of an invocation.
#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    /// Every allowed attempt failed
    #[error("Task '{task}' failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        task: String,
        attempts: u32,
        #[source]
        source: TaskError,
    },
}

impl ExecutorError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutorError::RetriesExhausted { attempts, .. } => *attempts,
        }
    }

    /// The error returned by the last attempt.
    pub fn last_error(&self) -> &TaskError {
        match self {
            ExecutorError::RetriesExhausted { source, .. } => source,
        }
    }
}

/// Result of one invocation: the outcome plus its attempt log.
pub struct Invocation<T> {
    /// Unique identifier of this invocation
    pub invocation_id: Uuid,
    /// Name of the task that was invoked
    pub task_name: String,
    /// Attempts in execution order
    pub attempts: AttemptLog,
    /// Final value or terminal failure
    pub outcome: Result<T, ExecutorError>,
}

impl<T> Invocation<T> {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Drops the attempt log and returns the outcome.
    pub fn into_result(self) -> Result<T, ExecutorError> {
        self.outcome
    }
}

impl<T: fmt::Debug> fmt::Debug for Invocation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("invocation_id", &self.invocation_id)
            .field("task_name", &self.task_name)
            .field("attempts", &self.attempts)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Executor running tasks with their retry policy.
///
/// The executor holds no per-invocation state, so one instance can be
/// shared and reused freely. Registered sinks receive every event.
///
/// # Example
///
/// ```
/// use flowkit_core::{Task, TaskError, TaskExecutor};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let task: Task<(), &str> = Task::builder("hello")
///     .retries(2)
///     .build(|_ctx, ()| async { Ok::<_, TaskError>("hi") });
///
/// let invocation = TaskExecutor::new().run(&task, ()).await;
/// assert_eq!(invocation.attempt_count(), 1);
/// assert_eq!(invocation.into_result().unwrap(), "hi");
/// # }
/// ```
#[derive(Clone, Default)]
pub struct TaskExecutor {
    sinks: Vec<Arc<dyn RunEventSink>>,
}

impl TaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event sink.
    pub fn with_sink(mut self, sink: impl RunEventSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Runs one invocation of `task` with `args`.
    ///
    /// Every attempt receives its own clone of `args`.
    pub async fn run<A, T>(&self, task: &Task<A, T>, args: A) -> Invocation<T>
    where
        A: Clone,
    {
        let invocation_id = Uuid::new_v4();
        let policy = task.policy();
        let max_attempts = policy.max_attempts();
        let mut attempts = AttemptLog::new();

        loop {
            let attempt = attempts.next_attempt();
            let context = AttemptContext {
                task_id: task.id().clone(),
                task_name: task.name().to_string(),
                invocation_id,
                attempt,
                max_attempts,
            };

            let started_at = Utc::now();
            let result = task.call(context, args.clone()).await;
            let finished_at = Utc::now();

            match result {
                Ok(value) => {
                    tracing::info!(
                        task = task.name(),
                        attempt,
                        max_attempts,
                        "Task attempt {}/{} succeeded",
                        attempt,
                        max_attempts
                    );
                    attempts.push(AttemptRecord::succeeded(attempt, started_at, finished_at));
                    self.emit(RunEvent::AttemptSucceeded {
                        timestamp: finished_at,
                        invocation_id,
                        task_name: task.name().to_string(),
                        attempt,
                        max_attempts,
                    })
                    .await;
                    self.emit(RunEvent::TaskSucceeded {
                        timestamp: Utc::now(),
                        invocation_id,
                        task_name: task.name().to_string(),
                        attempts: attempt,
                    })
                    .await;

                    return Invocation {
                        invocation_id,
                        task_name: task.name().to_string(),
                        attempts,
                        outcome: Ok(value),
                    };
                }
                Err(error) => {
                    let message = error.to_string();
                    tracing::warn!(
                        task = task.name(),
                        attempt,
                        max_attempts,
                        error = %message,
                        "Task attempt {}/{} failed: {}",
                        attempt,
                        max_attempts,
                        message
                    );
                    attempts.push(AttemptRecord::failed(
                        attempt,
                        message.clone(),
                        started_at,
                        finished_at,
                    ));
                    self.emit(RunEvent::AttemptFailed {
                        timestamp: finished_at,
                        invocation_id,
                        task_name: task.name().to_string(),
                        attempt,
                        max_attempts,
                        error: message.clone(),
                    })
                    .await;

                    if !policy.allows_retry_after(attempt) {
                        self.emit(RunEvent::TaskRetriesExhausted {
                            timestamp: Utc::now(),
                            invocation_id,
                            task_name: task.name().to_string(),
                            attempts: attempt,
                            error: message,
                        })
                        .await;

                        return Invocation {
                            invocation_id,
                            task_name: task.name().to_string(),
                            attempts,
                            outcome: Err(ExecutorError::RetriesExhausted {
                                task: task.name().to_string(),
                                attempts: attempt,
                                source: error,
                            }),
                        };
                    }

                    self.emit(RunEvent::RetryScheduled {
                        timestamp: Utc::now(),
                        invocation_id,
                        task_name: task.name().to_string(),
                        next_attempt: attempt + 1,
                        delay_ms: policy.retry_delay_ms(),
                    })
                    .await;

                    if !policy.retry_delay.is_zero() {
                        tracing::debug!(
                            task = task.name(),
                            "Retrying in {:?}",
                            policy.retry_delay
                        );
                        tokio::time::sleep(policy.retry_delay).await;
                    }
                }
            }
        }
    }

    /// Runs one invocation and discards the attempt log.
    pub async fn run_to_result<A, T>(&self, task: &Task<A, T>, args: A) -> Result<T, ExecutorError>
    where
        A: Clone,
    {
        self.run(task, args).await.into_result()
    }

    pub(crate) async fn emit(&self, event: RunEvent) {
        for sink in &self.sinks {
            sink.record(event.clone()).await;
        }
    }
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
