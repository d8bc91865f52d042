use crate::host::Pattern;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LeakyConfig {
    pub worker: WorkerConfig,
    pub host: HostConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Sleep quantum between cancellation checks, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Prefix of every worker label ("<prefix> #<id> (<status>)")
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HostConfig {
    /// Pattern selected when the host has no saved state
    #[serde(default = "default_pattern")]
    pub default_pattern: Pattern,

    /// Pause between simulated recreations, in milliseconds
    #[serde(default = "default_recreate_delay_ms")]
    pub recreate_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// How long to wait for a stopped worker to wind down, in milliseconds
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl HostConfig {
    pub fn recreate_delay(&self) -> Duration {
        Duration::from_millis(self.recreate_delay_ms)
    }
}

impl SystemConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl LeakyConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("leaky-threads.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("worker.poll_interval_ms", default_poll_interval_ms())?
            .set_default("worker.label_prefix", default_label_prefix())?
            .set_default("host.default_pattern", default_pattern().to_string())?
            .set_default("host.recreate_delay_ms", default_recreate_delay_ms())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.stop_timeout_ms", default_stop_timeout_ms())?
            .add_source(File::with_name(&path_str).required(false))
            // LEAKY_WORKER__POLL_INTERVAL_MS=100
            .add_source(
                Environment::with_prefix("LEAKY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: LeakyConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Worker poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.worker.label_prefix.trim().is_empty() {
            return Err(ConfigError::Message(
                "Worker label_prefix must not be empty".to_string(),
            ));
        }

        // '#' separates prefix from id in the label
        if self.worker.label_prefix.contains('#') {
            return Err(ConfigError::Message(
                "Worker label_prefix must not contain '#'".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.stop_timeout_ms < self.worker.poll_interval_ms {
            return Err(ConfigError::Message(
                "System stop_timeout_ms must be at least one poll interval".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for LeakyConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            host: HostConfig {
                default_pattern: default_pattern(),
                recreate_delay_ms: default_recreate_delay_ms(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                stop_timeout_ms: default_stop_timeout_ms(),
            },
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            label_prefix: default_label_prefix(),
        }
    }
}

// Default value functions
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_label_prefix() -> String {
    "Background Thread".to_string()
}

fn default_pattern() -> Pattern {
    Pattern::Captured
}
fn default_recreate_delay_ms() -> u64 {
    500
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_stop_timeout_ms() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = LeakyConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.worker.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.worker.label_prefix, "Background Thread");
        assert_eq!(config.host.default_pattern, Pattern::Captured);
        assert_eq!(config.system.stop_timeout(), Duration::from_millis(300));
    }

    #[test]
    fn test_config_validation() {
        let mut config = LeakyConfig::default();

        config.worker.poll_interval_ms = 0;
        assert!(config.validate().is_err());
        config.worker.poll_interval_ms = 250;

        config.worker.label_prefix = "Bad # Prefix".to_string();
        assert!(config.validate().is_err());
        config.worker.label_prefix = "   ".to_string();
        assert!(config.validate().is_err());
        config.worker.label_prefix = "Thread".to_string();

        config.system.stop_timeout_ms = 100;
        assert!(config.validate().is_err());
        config.system.stop_timeout_ms = 300;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[worker]
poll_interval_ms = 100
label_prefix = "Thread"

[host]
default_pattern = "cancelable"
"#
        )
        .unwrap();

        let config = LeakyConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.worker.poll_interval_ms, 100);
        assert_eq!(config.worker.label_prefix, "Thread");
        assert_eq!(config.host.default_pattern, Pattern::Cancelable);
        // Untouched sections keep their defaults
        assert_eq!(config.host.recreate_delay_ms, 500);
        assert_eq!(config.system.event_bus_capacity, 100);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = LeakyConfig::load_from_file(&path).unwrap();
        assert_eq!(config, LeakyConfig::default());
    }

    #[test]
    fn test_toml_output_parses_back() {
        let config = LeakyConfig::default();
        let rendered = config.to_toml_string().unwrap();

        assert!(rendered.contains("label_prefix = \"Background Thread\""));
        assert!(rendered.contains("default_pattern = \"captured\""));

        let parsed: LeakyConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
