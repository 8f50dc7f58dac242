//! Command-line interface for FlowKit.
//!
//! # Examples
//!
//! Run the pipeline with the default policy (4 retries, 2 second delay):
//!
//! ```bash
//! $ flowkit run --msg "Hello from my first flow!"
//! ```
//!
//! Run it from a YAML run spec and stream events as JSON lines. The run
//! summary then goes to stderr so stdout stays machine-readable:
//!
//! ```bash
//! $ flowkit run --spec deployment.yaml --events json > events.jsonl
//! ```
//!
//! Check a run spec:
//!
//! ```bash
//! $ flowkit validate-spec deployment.yaml
//! ```

use crate::pipeline::{self, PipelineConfig};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use flowkit_core::{
    FlowReport, FlowState, JsonLinesSink, RetryPolicy, RunSpec, TaskExecutor, TextSink,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "flowkit", version, about = "Run tasks with fixed-delay retries")]
pub struct Cli {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Run the unreliable ETL pipeline
    Run(RunArgs),

    /// Load a run spec and print what it would run
    ValidateSpec {
        /// Path to the YAML run spec
        path: PathBuf,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Message attached to the record
    #[arg(long)]
    msg: Option<String>,

    /// Retries of the API call after its first attempt
    #[arg(long)]
    retries: Option<u32>,

    /// Seconds to wait between API call attempts
    #[arg(long, value_name = "SECS", value_parser = parse_delay)]
    retry_delay: Option<Duration>,

    /// Probability that one API call fails
    #[arg(long, default_value_t = 0.5, value_parser = parse_probability)]
    failure_rate: f64,

    /// Seed for reproducible failures
    #[arg(long)]
    seed: Option<u64>,

    /// YAML run spec providing parameters and retry policy
    #[arg(long)]
    spec: Option<PathBuf>,

    /// Stream run events to stdout; the summary moves to stderr
    #[arg(long, value_enum)]
    events: Option<EventFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EventFormat {
    /// One readable line per event
    Text,
    /// One JSON object per line
    Json,
}

/// Adds the stdout sink for the requested event format.
fn with_event_sink(executor: TaskExecutor, events: Option<EventFormat>) -> TaskExecutor {
    match events {
        Some(EventFormat::Text) => executor.with_sink(TextSink::stdout()),
        Some(EventFormat::Json) => executor.with_sink(JsonLinesSink::stdout()),
        None => executor,
    }
}

/// Where the run summary is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SummaryStream {
    Stdout,
    Stderr,
}

/// Streamed events own stdout, and failures go to stderr.
fn summary_stream(events: Option<EventFormat>, completed: bool) -> SummaryStream {
    if events.is_some() || !completed {
        SummaryStream::Stderr
    } else {
        SummaryStream::Stdout
    }
}

/// Writes the per-task summary and the final flow line.
fn write_summary<R>(out: &mut impl Write, report: &FlowReport<R>) -> io::Result<()> {
    for task_run in &report.task_runs {
        writeln!(
            out,
            "   {} - {} attempt(s), {}",
            task_run.task_name,
            task_run.attempts,
            if task_run.succeeded { "succeeded" } else { "failed" }
        )?;
    }

    match report.state() {
        FlowState::Completed => writeln!(out, "✅ Flow '{}' completed", report.flow_name),
        FlowState::Failed { error } => {
            writeln!(out, "❌ Flow '{}' failed: {}", report.flow_name, error)
        }
    }
}

fn parse_delay(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{}", e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid delay {}: {}", s, e))
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{} is not in [0, 1]", p))
    }
}

/// Builds the pipeline settings from flags and an optional spec.
///
/// Flags win over the spec, the spec wins over defaults.
fn pipeline_config(args: &RunArgs, spec: Option<&RunSpec>) -> anyhow::Result<PipelineConfig> {
    if let Some(spec) = spec {
        if spec.flow_name != pipeline::FLOW_NAME {
            bail!(
                "Run spec '{}' targets unknown flow '{}' (expected '{}')",
                spec.name,
                spec.flow_name,
                pipeline::FLOW_NAME
            );
        }
    }

    let defaults = PipelineConfig::default();

    let base_policy = spec.and_then(|s| s.retry).unwrap_or(defaults.policy);
    let policy = RetryPolicy::new(
        args.retries.unwrap_or(base_policy.max_retries),
        args.retry_delay.unwrap_or(base_policy.retry_delay),
    );

    let msg = args
        .msg
        .clone()
        .or_else(|| spec.and_then(|s| s.parameter_str("msg")).map(str::to_string))
        .unwrap_or(defaults.msg);

    Ok(PipelineConfig {
        msg,
        policy,
        failure_rate: args.failure_rate,
        seed: args.seed.or(defaults.seed),
    })
}

/// Entry point for the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.action {
        Action::Run(args) => {
            let spec = match &args.spec {
                Some(path) => Some(
                    RunSpec::load(path)
                        .await
                        .with_context(|| format!("Failed to load run spec {}", path.display()))?,
                ),
                None => None,
            };
            let config = pipeline_config(&args, spec.as_ref())?;

            let executor = with_event_sink(TaskExecutor::new(), args.events);

            tracing::info!(
                retries = config.policy.max_retries,
                retry_delay = ?config.policy.retry_delay,
                failure_rate = config.failure_rate,
                "Running '{}'",
                pipeline::FLOW_NAME
            );
            let report = pipeline::run_pipeline(&executor, &config).await;

            match summary_stream(args.events, report.is_completed()) {
                SummaryStream::Stdout => write_summary(&mut io::stdout().lock(), &report)?,
                SummaryStream::Stderr => write_summary(&mut io::stderr().lock(), &report)?,
            }

            if !report.is_completed() {
                std::process::exit(1);
            }
            Ok(())
        }

        Action::ValidateSpec { path } => {
            let spec = RunSpec::load(&path)
                .await
                .with_context(|| format!("Failed to load run spec {}", path.display()))?;

            println!("📋 Run spec '{}'", spec.name);
            println!("   Flow: {}", spec.flow_name);
            if !spec.tags.is_empty() {
                println!("   Tags: {}", spec.tags.join(", "));
            }
            for (key, value) in &spec.parameters {
                println!("   Parameter {} = {}", key, value);
            }
            if let Some(retry) = spec.retry {
                println!(
                    "   Retry: {} retries, {:?} delay",
                    retry.max_retries, retry.retry_delay
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(yaml: &str) -> RunSpec {
        RunSpec::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults_without_spec() {
        let config = pipeline_config(&RunArgs::default(), None).unwrap();

        assert_eq!(config.msg, pipeline::DEFAULT_MESSAGE);
        assert_eq!(config.policy, pipeline::default_policy());
    }

    #[test]
    fn test_spec_overrides_defaults() {
        let spec = spec(
            "name: d\nflow_name: Previously unreliable pipeline\nparameters:\n  msg: from spec\nretry:\n  retries: 1\n  retry_delay_seconds: 0.5\n",
        );

        let config = pipeline_config(&RunArgs::default(), Some(&spec)).unwrap();

        assert_eq!(config.msg, "from spec");
        assert_eq!(config.policy, RetryPolicy::new(1, Duration::from_millis(500)));
    }

    #[test]
    fn test_flags_override_spec() {
        let spec = spec(
            "name: d\nflow_name: Previously unreliable pipeline\nparameters:\n  msg: from spec\nretry:\n  retries: 1\n  retry_delay_seconds: 0.5\n",
        );
        let args = RunArgs {
            msg: Some("from flag".to_string()),
            retries: Some(7),
            ..RunArgs::default()
        };

        let config = pipeline_config(&args, Some(&spec)).unwrap();

        assert_eq!(config.msg, "from flag");
        assert_eq!(config.policy, RetryPolicy::new(7, Duration::from_millis(500)));
    }

    #[test]
    fn test_demo_spec_matches_pipeline() {
        let spec = spec(include_str!("../../demos/deployment.yaml"));
        let config = pipeline_config(&RunArgs::default(), Some(&spec)).unwrap();

        assert_eq!(config.msg, "Hello from my first deployment!");
        assert_eq!(config.policy, pipeline::default_policy());
    }

    #[test]
    fn test_unknown_flow_rejected() {
        let spec = spec("name: d\nflow_name: Other flow\n");
        assert!(pipeline_config(&RunArgs::default(), Some(&spec)).is_err());
    }

    #[test]
    fn test_parse_probability() {
        assert_eq!(parse_probability("0.25"), Ok(0.25));
        assert!(parse_probability("1.5").is_err());
        assert!(parse_probability("abc").is_err());
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("2"), Ok(Duration::from_secs(2)));
        assert!(parse_delay("-1").is_err());
    }

    async fn report(failing: bool) -> FlowReport<String> {
        use flowkit_core::{Flow, Task, TaskError};

        let task: Task<(), String> = Task::builder("Call unreliable API").build(move |_ctx, ()| async move {
            if failing {
                Err(TaskError::failed("Our unreliable service failed"))
            } else {
                Ok("Success!".to_string())
            }
        });

        Flow::new(pipeline::FLOW_NAME)
            .run(&TaskExecutor::new(), (), |run, ()| async move { run.task(&task, ()).await })
            .await
    }

    /// Writer handing its bytes back after the sink owning it is dropped.
    #[derive(Clone, Default)]
    struct SharedBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_summary_lines() {
        let mut out = Vec::new();
        write_summary(&mut out, &report(false).await).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "   Call unreliable API - 1 attempt(s), succeeded\n\
             ✅ Flow 'Previously unreliable pipeline' completed\n"
        );

        let mut out = Vec::new();
        write_summary(&mut out, &report(true).await).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1 attempt(s), failed"));
        assert!(text.contains("❌ Flow 'Previously unreliable pipeline' failed"));
    }

    #[test]
    fn test_event_sink_selection() {
        let debug = |events| format!("{:?}", with_event_sink(TaskExecutor::new(), events));

        assert!(debug(None).contains("sinks: 0"));
        assert!(debug(Some(EventFormat::Text)).contains("sinks: 1"));
        assert!(debug(Some(EventFormat::Json)).contains("sinks: 1"));
    }

    #[test]
    fn test_summary_leaves_stdout_to_events() {
        assert_eq!(summary_stream(None, true), SummaryStream::Stdout);
        assert_eq!(summary_stream(None, false), SummaryStream::Stderr);
        assert_eq!(summary_stream(Some(EventFormat::Json), true), SummaryStream::Stderr);
        assert_eq!(summary_stream(Some(EventFormat::Text), true), SummaryStream::Stderr);
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_event_stream_is_valid_json_lines() {
        let stdout = SharedBuf::default();
        let executor = TaskExecutor::new().with_sink(JsonLinesSink::new(stdout.clone()));
        let config = PipelineConfig {
            failure_rate: 0.0,
            ..PipelineConfig::default()
        };

        let report = pipeline::run_pipeline(&executor, &config).await;
        assert_eq!(
            summary_stream(Some(EventFormat::Json), report.is_completed()),
            SummaryStream::Stderr
        );

        let output = String::from_utf8(stdout.0.lock().unwrap().clone()).unwrap();
        // flow start, two events per task, flow completion
        assert_eq!(output.lines().count(), 8);
        for line in output.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_event_stream() {
        let stdout = SharedBuf::default();
        let executor = TaskExecutor::new().with_sink(TextSink::new(stdout.clone()));
        let config = PipelineConfig {
            policy: RetryPolicy::new(1, Duration::from_secs(2)),
            failure_rate: 1.0,
            ..PipelineConfig::default()
        };

        let report = pipeline::run_pipeline(&executor, &config).await;
        assert!(!report.is_completed());

        let output = String::from_utf8(stdout.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Call unreliable API attempt 1/2 failed: Our unreliable service failed"));
        assert!(output.contains("Call unreliable API attempt 2 in 2000ms"));
        assert!(output.contains("gave up after 2 attempt(s)"));
        assert!(output.lines().last().unwrap().contains("flow 'Previously unreliable pipeline' failed"));
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "flowkit",
            "run",
            "--retries",
            "3",
            "--retry-delay",
            "0.1",
            "--failure-rate",
            "1",
            "--events",
            "json",
        ])
        .unwrap();

        match cli.action {
            Action::Run(args) => {
                assert_eq!(args.retries, Some(3));
                assert_eq!(args.retry_delay, Some(Duration::from_millis(100)));
                assert_eq!(args.failure_rate, 1.0);
                assert_eq!(args.events, Some(EventFormat::Json));
            }
            other => panic!("Unexpected action: {:?}", other),
        }
    }
}
