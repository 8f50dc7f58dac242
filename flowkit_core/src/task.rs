//! Task descriptors and the body signature run by the executor.
//!
//! A [`Task`] is an explicit value holding a callable body plus its retry
//! configuration. It is built once with [`Task::builder`] and never mutated
//! afterwards; every invocation reads the same name, policy and body.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a task descriptor.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random TaskId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the underlying string identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Error raised by a task body during a single attempt.
///
/// Every variant is treated as transient: the executor records it and
/// retries until the policy is exhausted.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    /// Task body reported a failure
    #[error("{0}")]
    Failed(String),

    /// I/O error inside the task body
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    /// Shorthand for [`TaskError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

/// Per-attempt information handed to a task body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptContext {
    /// Identifier of the task being run
    pub task_id: TaskId,
    /// Human-readable task name
    pub task_name: String,
    /// Identifier of the invocation this attempt belongs to
    pub invocation_id: Uuid,
    /// 1-based attempt ordinal
    pub attempt: u32,
    /// Maximum attempts allowed for this invocation
    pub max_attempts: u32,
}

impl AttemptContext {
    /// Returns true if no further attempt will follow a failure of this one.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Boxed future returned by a task body.
pub type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T, TaskError>> + Send>>;

type TaskBody<A, T> = Arc<dyn Fn(AttemptContext, A) -> TaskFuture<T> + Send + Sync>;

/// A named unit of work with a fixed retry policy.
///
/// `A` is the argument type passed to the body on every attempt and `T` is
/// the value it produces on success. Arguments are handed over as a fresh
/// clone per attempt, so a failed attempt cannot leak state into the next.
///
/// # Example
///
/// ```
/// use flowkit_core::{Task, TaskError};
/// use std::time::Duration;
///
/// let task: Task<u32, u32> = Task::builder("double")
///     .retries(3)
///     .retry_delay(Duration::from_millis(10))
///     .build(|_ctx, n: u32| async move { Ok::<_, TaskError>(n * 2) });
///
/// assert_eq!(task.name(), "double");
/// assert_eq!(task.policy().max_attempts(), 4);
/// ```
pub struct Task<A, T> {
    id: TaskId,
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    policy: RetryPolicy,
    body: TaskBody<A, T>,
}

impl<A, T> Task<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    /// Creates a task with no retries from a name and body.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(AttemptContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        TaskBuilder::new(name).build(f)
    }
}

impl Task<(), ()> {
    /// Starts building a task with the given name.
    ///
    /// Argument and output types are fixed later by [`TaskBuilder::build`].
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }
}

impl<A, T> Task<A, T> {
    /// Returns the task identifier.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Returns the human-readable task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the task tags.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.policy.max_retries
    }

    /// Delay between attempts.
    pub fn retry_delay(&self) -> Duration {
        self.policy.retry_delay
    }

    pub(crate) fn call(&self, context: AttemptContext, args: A) -> TaskFuture<T> {
        (self.body)(context, args)
    }
}

impl<A, T> Clone for Task<A, T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            policy: self.policy,
            body: Arc::clone(&self.body),
        }
    }
}

impl<A, T> fmt::Debug for Task<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for [`Task`].
///
/// The body is supplied last, in [`build`](Self::build), which fixes the
/// argument and output types.
#[derive(Clone, Debug)]
pub struct TaskBuilder {
    id: Option<TaskId>,
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    policy: RetryPolicy,
}

impl TaskBuilder {
    /// Creates a builder for a task with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            tags: Vec::new(),
            policy: RetryPolicy::default(),
        }
    }

    /// Sets an explicit task identifier instead of a generated one.
    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Sets the fixed delay between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.policy.retry_delay = delay;
        self
    }

    /// Replaces the whole retry policy.
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Finishes the task with its body.
    pub fn build<A, T, F, Fut>(self, f: F) -> Task<A, T>
    where
        A: Send + 'static,
        T: Send + 'static,
        F: Fn(AttemptContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        Task {
            id: self.id.unwrap_or_else(TaskId::generate),
            name: self.name,
            description: self.description,
            tags: self.tags,
            policy: self.policy,
            body: Arc::new(move |ctx, args| Box::pin(f(ctx, args)) as TaskFuture<T>),
        }
    }
}
