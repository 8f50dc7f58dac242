//! FlowKit core layer - Retrying task execution.
//!
//! This crate runs units of work with a bounded, fixed-delay retry policy:
//!
//! - Tasks: named bodies with `retries` and `retry_delay` ([`task`])
//! - Executor: the attempt loop that retries failures ([`executor`])
//! - Attempts: per-invocation attempt records ([`attempt`])
//! - Flows: sequential pipelines of task invocations ([`flow`])
//! - Events: run events delivered to pluggable sinks ([`events`])
//! - Config: YAML run specs ([`config`])
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use flowkit_core::{Task, TaskError, TaskExecutor};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let task: Task<(), u32> = Task::builder("Call unreliable API")
//!         .retries(4)
//!         .retry_delay(Duration::from_secs(2))
//!         .build(|_ctx, ()| async { Ok::<_, TaskError>(42) });
//!
//!     let value = TaskExecutor::new().run_to_result(&task, ()).await?;
//!     println!("Got {}", value);
//!
//!     Ok(())
//! }
//! ```

pub mod attempt;
pub mod config;
pub mod events;
pub mod executor;
pub mod flow;
pub mod retry;
pub mod task;

pub use attempt::{AttemptLog, AttemptOutcome, AttemptRecord};
pub use config::{ConfigError, RunSpec};
pub use events::{JsonLinesSink, MemorySink, RunEvent, RunEventSink, TextSink};
pub use executor::{ExecutorError, Invocation, TaskExecutor};
pub use flow::{Flow, FlowReport, FlowRun, FlowState, TaskRunSummary};
pub use retry::RetryPolicy;
pub use task::{AttemptContext, Task, TaskBuilder, TaskError, TaskFuture, TaskId};

/// Version of the flowkit core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
