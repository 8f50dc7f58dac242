//! YAML run specifications.
//!
//! A run spec names a flow, the parameters to call it with, a set of tags
//! and an optional retry policy override for the flow's tasks:
//!
//! ```yaml
//! name: my-first-deployment
//! flow_name: Previously unreliable pipeline
//! parameters:
//!   msg: Hello from my first deployment!
//! tags: [ETL]
//! retry:
//!   retries: 4
//!   retry_delay_seconds: 2
//! ```

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a run spec.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error reading the spec file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Spec parsed but is not usable
    #[error("Invalid run spec: {0}")]
    Invalid(String),
}

/// Which flow to run and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Name of this run spec
    pub name: String,
    /// Name of the flow to run
    pub flow_name: String,
    /// Flow parameters
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Retry policy applied to the flow's tasks instead of their defaults
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl RunSpec {
    /// Parses and validates a spec from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let spec: RunSpec = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Reads, parses and validates a spec file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml_str(&contents)
    }

    /// Serializes the spec back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        if self.flow_name.trim().is_empty() {
            return Err(ConfigError::Invalid("flow_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns a string parameter, if present and a string.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
