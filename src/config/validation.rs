use std::{collections::HashSet, sync::LazyLock, time::Duration};

use regex::Regex;

use crate::{
    config::models::{ExecutorConfig, FailoverGroupConfig, LoggingConfig, WardConfig},
    core::work_queue::WorkQueue,
};

/// Upper bound on threads a single work queue may request.
pub const MAX_THREAD_POOL_SIZE: u32 = 10_000;

/// Longest accepted failover probe interval.
pub const MAX_PROBE_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Longest accepted executor keep-alive and shutdown timeout.
pub const MAX_EXECUTOR_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

static WORK_QUEUE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _.\-]{0,127}$").expect("work queue name pattern is valid")
});

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Duplicate work queue {what} '{value}'")]
    Duplicate { what: &'static str, value: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Ward configuration validator
pub struct WardConfigValidator;

impl WardConfigValidator {
    /// Validate the entire configuration, collecting every problem found
    pub fn validate(config: &WardConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_logging(&config.logging) {
            errors.push(e);
        }

        errors.extend(Self::validate_executor(&config.executor));

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for work_queue in &config.work_queues {
            if !ids.insert(work_queue.id) {
                errors.push(ValidationError::Duplicate {
                    what: "id",
                    value: work_queue.id.to_string(),
                });
            }
            if !names.insert(work_queue.name.as_str()) {
                errors.push(ValidationError::Duplicate {
                    what: "name",
                    value: work_queue.name.clone(),
                });
            }
            errors.extend(Self::validate_work_queue(work_queue));
        }

        for (name, group) in &config.failover {
            errors.extend(Self::validate_failover_group(name, group));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_logging(logging: &LoggingConfig) -> ValidationResult<()> {
        tracing_subscriber::EnvFilter::try_new(&logging.level)
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            })
    }

    fn validate_executor(executor: &ExecutorConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        match executor.keep_alive() {
            Ok(d) if d.is_zero() => errors.push(ValidationError::InvalidField {
                field: "executor.keep_alive".to_string(),
                message: "Keep-alive must be greater than zero".to_string(),
            }),
            Ok(d) if d > MAX_EXECUTOR_DURATION => errors.push(too_long(
                "executor.keep_alive",
                d,
                MAX_EXECUTOR_DURATION,
            )),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidField {
                field: "executor.keep_alive".to_string(),
                message: format!("Invalid duration '{}': {e}", executor.keep_alive),
            }),
        }
        match executor.shutdown_timeout() {
            Ok(d) if d > MAX_EXECUTOR_DURATION => errors.push(too_long(
                "executor.shutdown_timeout",
                d,
                MAX_EXECUTOR_DURATION,
            )),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidField {
                field: "executor.shutdown_timeout".to_string(),
                message: format!("Invalid duration '{}': {e}", executor.shutdown_timeout),
            }),
        }
        errors
    }

    fn validate_work_queue(work_queue: &WorkQueue) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let field = |name: &str| format!("work queue '{}' {name}", work_queue.name);

        if work_queue.name.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("work queue {} name", work_queue.id),
            });
        } else if !WORK_QUEUE_NAME.is_match(&work_queue.name) {
            errors.push(ValidationError::InvalidField {
                field: field("name"),
                message: "Names start with a letter or digit and may contain letters, digits, spaces, '_', '.', '-' (max 128)".to_string(),
            });
        }

        if work_queue.thread_pool_max == 0 || work_queue.thread_pool_max > MAX_THREAD_POOL_SIZE {
            errors.push(ValidationError::InvalidField {
                field: field("thread_pool_max"),
                message: format!("Must be between 1 and {MAX_THREAD_POOL_SIZE}"),
            });
        }

        if work_queue.max_queue_size == 0 {
            errors.push(ValidationError::InvalidField {
                field: field("max_queue_size"),
                message: "Queue size must be greater than 0".to_string(),
            });
        }

        errors
    }

    fn validate_failover_group(name: &str, group: &FailoverGroupConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = group.kind() {
            errors.push(ValidationError::InvalidField {
                field: format!("failover group '{name}' strategy"),
                message: e.to_string(),
            });
        }

        if group.servers.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("failover group '{name}' servers"),
                message: "A failover group must list at least one server".to_string(),
            });
        } else if group.servers.iter().any(|s| s.trim().is_empty()) {
            errors.push(ValidationError::InvalidField {
                field: format!("failover group '{name}' servers"),
                message: "Server entries must not be blank".to_string(),
            });
        }

        match group.probe_interval() {
            Ok(Some(d)) if d > MAX_PROBE_INTERVAL => errors.push(too_long(
                &format!("failover group '{name}' probe_interval"),
                d,
                MAX_PROBE_INTERVAL,
            )),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidField {
                field: format!("failover group '{name}' probe_interval"),
                message: e.to_string(),
            }),
        }

        errors
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

fn too_long(field: &str, value: Duration, max: Duration) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        message: format!(
            "{} exceeds the maximum of {}",
            humantime::format_duration(value),
            humantime::format_duration(max)
        ),
    }
}
