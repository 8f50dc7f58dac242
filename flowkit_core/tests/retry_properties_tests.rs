//! Integration tests for retry behavior through the public API.
//!
//! All tests run with paused tokio time, so retry delays advance the
//! virtual clock instead of sleeping.

use flowkit_core::{
    AttemptOutcome, ExecutorError, MemorySink, RunEvent, Task, TaskError, TaskExecutor,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// Helper Functions
// =============================================================================

/// Task that fails its first `failures` calls, then succeeds with `"ok"`.
fn fails_then_succeeds(failures: u32, retries: u32, delay: Duration) -> Task<(), String> {
    let calls = Arc::new(AtomicU32::new(0));
    Task::builder("Call unreliable API")
        .retries(retries)
        .retry_delay(delay)
        .build(move |ctx, ()| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= failures {
                    Err(TaskError::failed("Our unreliable service failed"))
                } else {
                    Ok(format!("ok on attempt {}", ctx.attempt))
                }
            }
        })
}

fn assert_elapsed_about(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(elapsed >= expected, "elapsed {:?} < {:?}", elapsed, expected);
    assert!(
        elapsed < expected + Duration::from_millis(50),
        "elapsed {:?} too far past {:?}",
        elapsed,
        expected
    );
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_always_failing_makes_n_plus_one_attempts() {
    for n in 0..=5 {
        let task = fails_then_succeeds(u32::MAX, n, Duration::from_millis(10));
        let invocation = TaskExecutor::new().run(&task, ()).await;

        assert_eq!(invocation.attempt_count() as u32, n + 1);
        assert!(invocation
            .attempts
            .iter()
            .all(|r| matches!(r.outcome, AttemptOutcome::Failed { .. })));
        assert!(matches!(
            invocation.outcome,
            Err(ExecutorError::RetriesExhausted { attempts, .. }) if attempts == n + 1
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_call_success_incurs_no_delay() {
    for n in 0..=5 {
        let task = fails_then_succeeds(0, n, Duration::from_secs(30));
        let start = Instant::now();

        let invocation = TaskExecutor::new().run(&task, ()).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(invocation.attempt_count(), 1);
        assert_eq!(invocation.into_result().unwrap(), "ok on attempt 1");
    }
}

#[tokio::test(start_paused = true)]
async fn test_k_failures_then_success() {
    let n = 4;
    for k in 0..=n {
        let task = fails_then_succeeds(k, n, Duration::ZERO);
        let invocation = TaskExecutor::new().run(&task, ()).await;

        assert_eq!(invocation.attempt_count() as u32, k + 1);
        assert_eq!(invocation.attempts.failure_count() as u32, k);
        assert!(invocation.attempts.last().unwrap().is_success());
        assert_eq!(
            invocation.into_result().unwrap(),
            format!("ok on attempt {}", k + 1)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_unreliable_api_scenario() {
    // retries=4, delay=2s, fails on attempts 1-3, succeeds on 4
    let task = fails_then_succeeds(3, 4, Duration::from_secs(2));
    let sink = MemorySink::new();
    let executor = TaskExecutor::new().with_sink(sink.clone());
    let start = Instant::now();

    let invocation = executor.run(&task, ()).await;

    assert_elapsed_about(start, Duration::from_secs(6));
    assert_eq!(invocation.attempt_count(), 4);
    assert_eq!(
        sink.events().iter().filter(|e| e.is_attempt()).count(),
        4,
        "one attempt event per attempt"
    );
    assert_eq!(invocation.into_result().unwrap(), "ok on attempt 4");
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_always_failing() {
    let task = fails_then_succeeds(u32::MAX, 0, Duration::from_secs(2));
    let start = Instant::now();

    let invocation = TaskExecutor::new().run(&task, ()).await;

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(invocation.attempt_count(), 1);
    assert_eq!(
        invocation.attempts.last().unwrap().error(),
        Some("Our unreliable service failed")
    );

    let err = invocation.into_result().unwrap_err();
    assert_eq!(err.last_error().to_string(), "Our unreliable service failed");
}

#[tokio::test(start_paused = true)]
async fn test_rerun_after_terminal_outcome_is_fresh() {
    let task = fails_then_succeeds(u32::MAX, 1, Duration::ZERO);
    let executor = TaskExecutor::new();

    let first = executor.run(&task, ()).await;
    let second = executor.run(&task, ()).await;

    assert_eq!(first.attempt_count(), 2);
    assert_eq!(second.attempt_count(), 2);
    assert_ne!(first.invocation_id, second.invocation_id);
    let ordinals: Vec<u32> = second.attempts.iter().map(|r| r.attempt).collect();
    assert_eq!(ordinals, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_are_chronological() {
    let task = fails_then_succeeds(2, 2, Duration::from_millis(100));
    let invocation = TaskExecutor::new().run(&task, ()).await;

    let records: Vec<_> = invocation.attempts.iter().collect();
    for pair in records.windows(2) {
        assert!(pair[0].attempt < pair[1].attempt);
        assert!(pair[0].started_at <= pair[1].started_at);
    }
}

#[tokio::test(start_paused = true)]
async fn test_io_errors_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let task: Task<(), ()> = Task::builder("read file")
        .retries(2)
        .build(move |_ctx, ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TaskError::from(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "missing",
                )))
            }
        });

    let sink = MemorySink::new();
    let result = TaskExecutor::new()
        .with_sink(sink.clone())
        .run_to_result(&task, ())
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(
        sink.events().last(),
        Some(RunEvent::TaskRetriesExhausted { attempts: 3, .. })
    ));
}
