use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::WardConfig;

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<WardConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<WardConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let ward_config: WardConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(ward_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::core::work_queue::RejectPolicy;

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
[logging]
level = "debug"
json = true
spans = false

[executor]
keep_alive = "10s"

[[work_queues]]
id = 1
name = "audit"
thread_pool_max = 20
max_queue_size = 100
reject_policy = "WAIT_FOR_ROOM"

[[work_queues]]
id = 2
name = "mail"
thread_pool_max = 2
max_queue_size = 5

[failover.backends]
strategy = "ordered"
servers = ["10.0.0.1:8443", "10.0.0.2:8443"]
probe_interval = "15m"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert!(!config.logging.spans);
        assert_eq!(config.work_queues.len(), 2);
        assert_eq!(config.work_queues[0].reject_policy, RejectPolicy::CallerBlocks);
        assert_eq!(
            config.work_queues[1].reject_policy,
            RejectPolicy::FailImmediately
        );
        assert_eq!(config.failover["backends"].servers.len(), 2);
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
work_queues:
  - id: 7
    name: "indexer"
    thread_pool_max: 4
    max_queue_size: 50
    reject_policy: "fail_immediately"
failover:
  search:
    strategy: "ROBIN"
    servers: ["search-1", "search-2"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.work_queues[0].name, "indexer");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.spans);
        assert!(config.failover["search"].kind().is_ok());
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "work_queues": [
    { "id": 3, "name": "json", "thread_pool_max": 1, "max_queue_size": 1 }
  ]
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.work_queues[0].id.0, 3);
        assert!(config.failover.is_empty());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config_sync("/nonexistent/ward.toml").is_err());
    }
}
