//! The unreliable ETL pipeline.
//!
//! Three tasks run in sequence inside one flow:
//! 1. `Call unreliable API`: returns `{"data": 42}` or fails at random
//! 2. `Augment data`: adds a `message` field
//! 3. `Write results to database`: logs the record and returns `"Success!"`
//!
//! Only the API call carries a retry policy.

use flowkit_core::{Flow, FlowReport, RetryPolicy, Task, TaskError, TaskExecutor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Flow name used by run specs to select this pipeline.
pub const FLOW_NAME: &str = "Previously unreliable pipeline";

pub const DEFAULT_MESSAGE: &str = "Hello from my first flow!";

/// Retry policy of the API call when nothing overrides it.
pub fn default_policy() -> RetryPolicy {
    RetryPolicy::new(4, Duration::from_secs(2))
}

/// Settings for one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Message attached to the record
    pub msg: String,
    /// Retry policy of the API call
    pub policy: RetryPolicy,
    /// Probability in `[0, 1]` that one API call fails
    pub failure_rate: f64,
    /// Seed for reproducible failures
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            msg: DEFAULT_MESSAGE.to_string(),
            policy: default_policy(),
            failure_rate: 0.5,
            seed: None,
        }
    }
}

/// Task simulating a flaky upstream service.
pub fn unreliable_api_task(policy: RetryPolicy, failure_rate: f64, seed: Option<u64>) -> Task<(), Value> {
    let rng = Arc::new(Mutex::new(match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }));
    let failure_rate = failure_rate.clamp(0.0, 1.0);

    Task::builder("Call unreliable API")
        .description("Returns a record or fails at random")
        .tag("ETL")
        .policy(policy)
        .build(move |_ctx, ()| {
            let failed = rng
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .gen_bool(failure_rate);
            async move {
                if failed {
                    Err(TaskError::failed("Our unreliable service failed"))
                } else {
                    Ok(json!({ "data": 42 }))
                }
            }
        })
}

/// Task adding `message` to a JSON object.
pub fn augment_data_task() -> Task<(Value, String), Value> {
    Task::builder("Augment data")
        .tag("ETL")
        .build(|_ctx, (mut data, msg): (Value, String)| async move {
            if !data.is_object() {
                return Err(TaskError::failed(format!("Expected a JSON object, got {}", data)));
            }
            if let Some(object) = data.as_object_mut() {
                object.insert("message".to_string(), Value::String(msg));
            }
            Ok(data)
        })
}

/// Task pretending to persist a record.
pub fn write_results_task() -> Task<Value, String> {
    Task::builder("Write results to database")
        .tag("ETL")
        .build(|_ctx, data: Value| async move {
            tracing::info!("Wrote {} to database successfully!", data);
            Ok("Success!".to_string())
        })
}

/// Runs the full pipeline as one flow.
pub async fn run_pipeline(executor: &TaskExecutor, config: &PipelineConfig) -> FlowReport<String> {
    let api = unreliable_api_task(config.policy, config.failure_rate, config.seed);
    let augment = augment_data_task();
    let write = write_results_task();

    Flow::new(FLOW_NAME)
        .run(executor, config.msg.clone(), |run, msg| async move {
            let api_result = run.task(&api, ()).await?;
            let augmented = run.task(&augment, (api_result, msg)).await?;
            run.task(&write, augmented).await
        })
        .await
}
