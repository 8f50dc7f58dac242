//! Sequential flows composed of task invocations.
//!
//! A [`Flow`] is a named pipeline body. Inside the body, tasks are run
//! through a [`FlowRun`] handle, which forwards them to the executor and
//! keeps a summary of each invocation. The first task that exhausts its
//! retries ends the flow when the body propagates the error with `?`.
//!
//! # Example
//!
//! ```
//! use flowkit_core::{Flow, Task, TaskError, TaskExecutor};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let fetch: Task<(), u32> = Task::new("fetch", |_ctx, ()| async { Ok::<_, TaskError>(21) });
//! let double: Task<u32, u32> = Task::new("double", |_ctx, n| async move { Ok::<_, TaskError>(n * 2) });
//!
//! let report = Flow::new("pipeline")
//!     .run(&TaskExecutor::new(), (), |run, ()| async move {
//!         let n = run.task(&fetch, ()).await?;
//!         run.task(&double, n).await
//!     })
//!     .await;
//!
//! assert!(report.is_completed());
//! assert_eq!(report.task_runs.len(), 2);
//! assert_eq!(report.into_result().unwrap(), 42);
//! # }
//! ```

use crate::events::RunEvent;
use crate::executor::{ExecutorError, Invocation, TaskExecutor};
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Final state of a flow run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    /// Body returned a value
    Completed,
    /// Body returned an error
    Failed { error: String },
}

/// Summary of one task invocation inside a flow run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunSummary {
    pub invocation_id: Uuid,
    pub task_name: String,
    pub attempts: u32,
    pub succeeded: bool,
    /// Error of the last failed attempt, if any
    pub last_error: Option<String>,
}

impl TaskRunSummary {
    fn from_invocation<T>(invocation: &Invocation<T>) -> Self {
        Self {
            invocation_id: invocation.invocation_id,
            task_name: invocation.task_name.clone(),
            attempts: invocation.attempt_count() as u32,
            succeeded: invocation.succeeded(),
            last_error: invocation
                .attempts
                .iter()
                .rev()
                .find_map(|r| r.error().map(str::to_string)),
        }
    }
}

/// Named flow definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flow {
    name: String,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the flow body once with `params`.
    ///
    /// The body receives a [`FlowRun`] handle for invoking tasks. Flow runs
    /// do not retry; only the tasks inside them do.
    pub async fn run<P, R, F, Fut>(&self, executor: &TaskExecutor, params: P, body: F) -> FlowReport<R>
    where
        F: FnOnce(FlowRun, P) -> Fut,
        Fut: Future<Output = Result<R, ExecutorError>>,
    {
        let flow_run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let task_runs = Arc::new(Mutex::new(Vec::new()));

        tracing::info!(flow = %self.name, %flow_run_id, "Flow run started");
        executor
            .emit(RunEvent::FlowStarted {
                timestamp: started_at,
                flow_run_id,
                flow_name: self.name.clone(),
            })
            .await;

        let handle = FlowRun {
            flow_run_id,
            flow_name: self.name.clone(),
            executor: executor.clone(),
            task_runs: Arc::clone(&task_runs),
        };
        let outcome = body(handle, params).await;

        let finished_at = Utc::now();
        let task_runs = std::mem::take(&mut *task_runs.lock().unwrap_or_else(|e| e.into_inner()));

        match &outcome {
            Ok(_) => {
                tracing::info!(
                    flow = %self.name,
                    %flow_run_id,
                    task_runs = task_runs.len(),
                    "Flow run completed"
                );
                executor
                    .emit(RunEvent::FlowCompleted {
                        timestamp: finished_at,
                        flow_run_id,
                        flow_name: self.name.clone(),
                        task_runs: task_runs.len(),
                    })
                    .await;
            }
            Err(e) => {
                tracing::error!(flow = %self.name, %flow_run_id, "Flow run failed: {}", e);
                executor
                    .emit(RunEvent::FlowFailed {
                        timestamp: finished_at,
                        flow_run_id,
                        flow_name: self.name.clone(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        FlowReport {
            flow_run_id,
            flow_name: self.name.clone(),
            task_runs,
            started_at,
            finished_at,
            outcome,
        }
    }
}

/// Handle passed to a flow body for running tasks.
#[derive(Clone)]
pub struct FlowRun {
    flow_run_id: Uuid,
    flow_name: String,
    executor: TaskExecutor,
    task_runs: Arc<Mutex<Vec<TaskRunSummary>>>,
}

impl FlowRun {
    pub fn flow_run_id(&self) -> Uuid {
        self.flow_run_id
    }

    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    /// Runs a task through the executor and records its summary.
    pub async fn task<A, T>(&self, task: &Task<A, T>, args: A) -> Result<T, ExecutorError>
    where
        A: Clone,
    {
        let invocation = self.executor.run(task, args).await;
        self.task_runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(TaskRunSummary::from_invocation(&invocation));
        invocation.into_result()
    }
}

/// Result of a flow run.
#[derive(Debug)]
pub struct FlowReport<R> {
    pub flow_run_id: Uuid,
    pub flow_name: String,
    /// Task invocations in the order they finished
    pub task_runs: Vec<TaskRunSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: Result<R, ExecutorError>,
}

impl<R> FlowReport<R> {
    pub fn state(&self) -> FlowState {
        match &self.outcome {
            Ok(_) => FlowState::Completed,
            Err(e) => FlowState::Failed {
                error: e.to_string(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Total attempts across all task runs.
    pub fn total_attempts(&self) -> u32 {
        self.task_runs.iter().map(|t| t.attempts).sum()
    }

    pub fn into_result(self) -> Result<R, ExecutorError> {
        self.outcome
    }
}
