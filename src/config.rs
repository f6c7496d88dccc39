//! Buffer configuration.
use crate::{
    constants::{DEFAULT_CAPACITY, DEFAULT_INTERVAL},
    error::ConfigError,
};
use eyre::Context;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// What happens to buffered submissions when the buffer is cancelled.
///
/// Submissions still waiting in the queue are rejected with
/// [`BufferError::Cancelled`](crate::error::BufferError::Cancelled) under both policies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CancelPolicy {
    /// Dispatch one final cycle over the submissions already buffered.
    #[default]
    Flush,
    /// Reject the submissions already buffered.
    Discard,
}

/// Buffer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferConfig {
    /// Number of submissions that closes a cycle. Also bounds the submission queue.
    pub capacity: usize,
    /// Time a cycle stays open before it is dispatched, counted from the end of the previous
    /// dispatch.
    #[serde(with = "crate::serde::duration")]
    pub interval: Duration,
    /// Cancellation behavior for buffered submissions.
    #[serde(default)]
    pub on_cancel: CancelPolicy,
    /// Name used to label the buffer's metrics and logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            interval: DEFAULT_INTERVAL,
            on_cancel: CancelPolicy::default(),
            name: None,
        }
    }
}

impl BufferConfig {
    /// Creates a configuration with the given capacity and interval.
    pub fn new(capacity: usize, interval: Duration) -> Self {
        Self { capacity, interval, ..Default::default() }
    }

    /// Sets the number of submissions that closes a cycle.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the cycle interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the cancellation policy.
    pub fn with_cancel_policy(mut self, on_cancel: CancelPolicy) -> Self {
        self.on_cancel = on_cancel;
        self
    }

    /// Sets the name of the buffer.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Checks that the configuration can drive a buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    /// Load from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_reader(&file)
            .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate().wrap_err_with(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save to a YAML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
