//! Mesh Configuration
//!
//! Capacities and timings for the bus, workspace, notification dispatch and
//! agent runtimes. Every field has a serde default so partial JSON documents
//! are accepted.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{MeshError, MeshResult};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Message bus settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Subscriber notification settings (shared by bus and workspace)
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Agent runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl MeshConfig {
    /// Parse a configuration from a JSON string and validate it
    pub fn from_json_str(json: &str) -> MeshResult<Self> {
        let config: MeshConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> MeshResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Loading mesh config");
        Self::from_json_str(&raw)
    }

    /// Set the bus section
    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    /// Set the workspace section
    pub fn with_workspace(mut self, workspace: WorkspaceConfig) -> Self {
        self.workspace = workspace;
        self
    }

    /// Set the dispatch section
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Set the runtime section
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Reject zero capacities and zero worker counts
    pub fn validate(&self) -> MeshResult<()> {
        let checks = [
            ("bus.queue_capacity", self.bus.queue_capacity),
            ("bus.history_capacity", self.bus.history_capacity),
            ("workspace.history_capacity", self.workspace.history_capacity),
            ("dispatch.workers", self.dispatch.workers),
            ("dispatch.capacity", self.dispatch.capacity),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(MeshError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }
}

/// Message bus capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Maximum queued messages per recipient; the oldest is evicted on overflow
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum messages kept in the global send history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl BusConfig {
    /// Set the per-recipient queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the send history capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            history_capacity: default_history_capacity(),
        }
    }
}

/// Workspace capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Maximum change records kept; the oldest is truncated on overflow
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl WorkspaceConfig {
    /// Set the change history capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
        }
    }
}

/// Bounded fan-out for subscriber notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of worker tasks invoking callbacks
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum queued notifications; further notifications are dropped
    #[serde(default = "default_dispatch_capacity")]
    pub capacity: usize,
}

impl DispatchConfig {
    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the queued notification cap
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacity: default_dispatch_capacity(),
        }
    }
}

/// Agent runtime timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Pause between bus drains, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after an infrastructure error before listening again, in milliseconds
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl RuntimeConfig {
    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the error back-off
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Error back-off as a duration
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_history_capacity() -> usize {
    10_000
}

fn default_workers() -> usize {
    4
}

fn default_dispatch_capacity() -> usize {
    1024
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_error_backoff_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.bus.queue_capacity, 1000);
        assert_eq!(config.bus.history_capacity, 10_000);
        assert_eq!(config.workspace.history_capacity, 10_000);
        assert_eq!(config.dispatch.workers, 4);
        assert_eq!(config.runtime.poll_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MeshConfig::from_json_str(r#"{"bus": {"queue_capacity": 5}}"#).unwrap();
        assert_eq!(config.bus.queue_capacity, 5);
        assert_eq!(config.bus.history_capacity, 10_000);
        assert_eq!(config.dispatch, DispatchConfig::default());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = MeshConfig::from_json_str(r#"{"dispatch": {"workers": 0}}"#).unwrap_err();
        assert!(matches!(err, MeshError::InvalidConfig(msg) if msg.contains("dispatch.workers")));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"runtime": {{"poll_interval_ms": 5}}}}"#).unwrap();

        let config = MeshConfig::load(file.path()).unwrap();
        assert_eq!(config.runtime.poll_interval(), Duration::from_millis(5));
        assert_eq!(config.runtime.error_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn test_builders() {
        let config = MeshConfig::default()
            .with_bus(BusConfig::default().with_queue_capacity(3))
            .with_runtime(RuntimeConfig::default().with_poll_interval(Duration::from_millis(10)));
        assert_eq!(config.bus.queue_capacity, 3);
        assert_eq!(config.runtime.poll_interval_ms, 10);
    }
}
