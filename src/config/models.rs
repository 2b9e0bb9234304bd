//! Configuration data structures for Ward.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files.
//! Durations are written as humantime strings ("60s", "15m") and parsed on
//! access so that validation can report them with their field names.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::core::{
    failover::{FailoverError, FailoverStrategyKind},
    work_queue::WorkQueue,
};

fn default_log_level() -> String {
    "info".to_string()
}

fn default_keep_alive() -> String {
    "60s".to_string()
}

fn default_shutdown_timeout() -> String {
    "30s".to_string()
}

/// Logging output configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "ward=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of pretty console output
    #[serde(default)]
    pub json: bool,
    /// Attach the current span and span list to each JSON event
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

/// Settings shared by every work queue executor
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExecutorConfig {
    /// Idle time after which a worker thread exits
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    /// How long `run` waits for queues to drain on exit
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            keep_alive: default_keep_alive(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ExecutorConfig {
    pub fn keep_alive(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.keep_alive)
    }

    pub fn shutdown_timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.shutdown_timeout)
    }
}

/// A named pool of servers with the strategy used to pick among them
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FailoverGroupConfig {
    /// Strategy name, matched case-insensitively ("sticky", "robin", "random", "ordered")
    pub strategy: String,
    pub servers: Vec<String>,
    /// Overrides the strategy's default probe interval
    #[serde(default)]
    pub probe_interval: Option<String>,
}

impl FailoverGroupConfig {
    pub fn kind(&self) -> Result<FailoverStrategyKind, FailoverError> {
        self.strategy.parse()
    }

    pub fn probe_interval(&self) -> Result<Option<Duration>, humantime::DurationError> {
        self.probe_interval
            .as_deref()
            .map(humantime::parse_duration)
            .transpose()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WardConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub work_queues: Vec<WorkQueue>,
    #[serde(default)]
    pub failover: HashMap<String, FailoverGroupConfig>,
}

impl WardConfig {
    /// Create a new configuration builder
    pub fn builder() -> WardConfigBuilder {
        WardConfigBuilder::default()
    }
}

/// Builder for WardConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct WardConfigBuilder {
    config: WardConfig,
}

impl WardConfigBuilder {
    pub fn logging(mut self, level: impl Into<String>, json: bool) -> Self {
        self.config.logging = LoggingConfig {
            level: level.into(),
            json,
            spans: false,
        };
        self
    }

    pub fn log_spans(mut self, spans: bool) -> Self {
        self.config.logging.spans = spans;
        self
    }

    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.config.executor.keep_alive = keep_alive.into();
        self
    }

    pub fn work_queue(mut self, work_queue: WorkQueue) -> Self {
        self.config.work_queues.push(work_queue);
        self
    }

    pub fn failover_group(
        mut self,
        name: impl Into<String>,
        strategy: impl Into<String>,
        servers: Vec<String>,
    ) -> Self {
        self.config.failover.insert(
            name.into(),
            FailoverGroupConfig {
                strategy: strategy.into(),
                servers,
                probe_interval: None,
            },
        );
        self
    }

    pub fn build(self) -> WardConfig {
        self.config
    }
}
