//! Configuration management module
//!
//! Handles loading, saving, and validation of the benchmark configuration.
//! The controller loads it once and hands a snapshot to every load driver.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::util::logging::parse_level;
use crate::util::units::{duration_str, format_duration};
use crate::{DlBenchError, Result, APP_NAME, CONFIG_FILE};

pub mod persistence;

/// Benchmark configuration structure containing all run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Number of load drivers the controller admits
    pub load_drivers: usize,
    /// Length of the warm-up phase
    #[serde(with = "duration_str")]
    pub warmup_time: Duration,
    /// Length of the measured phase
    #[serde(with = "duration_str")]
    pub benchmark_time: Duration,
    /// Length of the cool-down phase
    #[serde(with = "duration_str")]
    pub cooldown_time: Duration,
    /// Pause between two transactions of a load driver
    #[serde(with = "duration_str")]
    pub think_time: Duration,
    /// Log level name (error, warn, info, debug, trace)
    pub log_level: String,
    /// Where the controller is published
    pub registry: RegistryConfig,
    /// Database under test
    pub database: DatabaseConfig,
    /// Transaction mix, in selection order
    pub transactions: Vec<TransactionWeight>,
}

/// Directory service location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
}

/// Database collaborator selection and parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Registered database kind, e.g. "bank" or "noop"
    pub kind: String,
    /// Connection string handed to the database
    pub url: String,
    /// Free-form database-specific parameters
    pub user: BTreeMap<String, String>,
}

/// One entry of the transaction mix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionWeight {
    pub name: String,
    pub weight: u32,
}

impl TransactionWeight {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            load_drivers: 0,
            warmup_time: Duration::ZERO,
            benchmark_time: Duration::ZERO,
            cooldown_time: Duration::ZERO,
            think_time: Duration::ZERO,
            log_level: "info".to_string(),
            registry: RegistryConfig::default(),
            database: DatabaseConfig::default(),
            transactions: Vec::new(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1099,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: "noop".to_string(),
            url: String::new(),
            user: BTreeMap::new(),
        }
    }
}

impl BenchmarkConfig {
    /// Create a new benchmark configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for the bundled in-memory bank database
    pub fn bank(load_drivers: usize) -> Self {
        Self {
            load_drivers,
            warmup_time: Duration::from_secs(10),
            benchmark_time: Duration::from_secs(60),
            cooldown_time: Duration::from_secs(10),
            database: DatabaseConfig {
                kind: "bank".to_string(),
                url: "memory://bank".to_string(),
                user: BTreeMap::from([("n".to_string(), "1".to_string())]),
            },
            transactions: vec![
                TransactionWeight::new("kontostand", 35),
                TransactionWeight::new("einzahlung", 50),
                TransactionWeight::new("analyse", 15),
            ],
            ..Self::default()
        }
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.load_drivers == 0 {
            return Err(DlBenchError::Config(
                "Load driver count must be greater than 0".to_string(),
            ));
        }

        if self.benchmark_time.is_zero() {
            return Err(DlBenchError::Config(
                "Benchmark time must be greater than 0".to_string(),
            ));
        }

        if self.transactions.is_empty() {
            return Err(DlBenchError::Config(
                "At least one transaction must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for tx in &self.transactions {
            if !seen.insert(tx.name.as_str()) {
                return Err(DlBenchError::Config(format!(
                    "Duplicate transaction: {}",
                    tx.name
                )));
            }
        }

        if self.total_weight() == 0 {
            return Err(DlBenchError::Config(
                "Total transaction weight must be greater than 0".to_string(),
            ));
        }

        parse_level(&self.log_level)?;

        Ok(())
    }

    /// Sum of all configured transaction weights
    pub fn total_weight(&self) -> u64 {
        self.transactions.iter().map(|t| t.weight as u64).sum()
    }

    /// Get a database-specific parameter
    pub fn user(&self, key: &str) -> Option<&str> {
        self.database.user.get(key).map(String::as_str)
    }

    /// Set the number of load drivers
    pub fn with_load_drivers(mut self, count: usize) -> Self {
        self.load_drivers = count;
        self
    }

    /// Set the warm-up, benchmark and cool-down lengths
    pub fn with_phases(
        mut self,
        warmup: Duration,
        benchmark: Duration,
        cooldown: Duration,
    ) -> Self {
        self.warmup_time = warmup;
        self.benchmark_time = benchmark;
        self.cooldown_time = cooldown;
        self
    }

    /// Set the think time
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    /// Set the database kind
    pub fn with_database(mut self, kind: impl Into<String>) -> Self {
        self.database.kind = kind.into();
        self
    }

    /// Set a database-specific parameter
    pub fn with_user(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.database.user.insert(key.into(), value.into());
        self
    }

    /// Append a transaction to the mix
    pub fn with_transaction(mut self, name: impl Into<String>, weight: u32) -> Self {
        self.transactions.push(TransactionWeight::new(name, weight));
        self
    }

    /// Set the log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DlBenchError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            DlBenchError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from the standard config file location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        if !config_path.exists() {
            return Err(DlBenchError::Config(format!(
                "No configuration at {}",
                config_path.display()
            )));
        }
        Self::load_from(&config_path)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DlBenchError::Config(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(path, content).map_err(|e| {
            DlBenchError::Config(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/dlbench/dlbench.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            DlBenchError::Config("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Log every effective setting
    pub fn log_summary(&self) {
        info!(load_drivers = self.load_drivers, "configuration");
        info!(
            warmup = %format_duration(self.warmup_time),
            benchmark = %format_duration(self.benchmark_time),
            cooldown = %format_duration(self.cooldown_time),
            think_time = %format_duration(self.think_time),
            "phase timing"
        );
        info!(kind = %self.database.kind, url = %self.database.url, "database");
        for tx in &self.transactions {
            info!(name = %tx.name, weight = tx.weight, "transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid_config() -> BenchmarkConfig {
        BenchmarkConfig::new()
            .with_load_drivers(2)
            .with_phases(
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(1),
            )
            .with_transaction("a", 1)
            .with_transaction("b", 3)
    }

    #[test]
    fn test_defaults_fail_validation() {
        let err = BenchmarkConfig::default().validate().unwrap_err();
        assert!(matches!(err, DlBenchError::Config(_)));
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.total_weight(), 4);
    }

    #[test]
    fn test_zero_total_weight_rejected() {
        let config = BenchmarkConfig::new()
            .with_load_drivers(1)
            .with_phases(Duration::ZERO, Duration::from_secs(1), Duration::ZERO)
            .with_transaction("a", 0)
            .with_transaction("b", 0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("weight"));
    }

    #[test]
    fn test_duplicate_transaction_rejected() {
        let config = valid_config().with_transaction("a", 5);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let config = valid_config().with_log_level("chatty");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_user_parameters() {
        let config = valid_config().with_user("n", "3");
        assert_eq!(config.user("n"), Some("3"));
        assert_eq!(config.user("missing"), None);
    }

    #[test]
    fn test_toml_serialization() {
        let config = BenchmarkConfig::bank(4).with_think_time(Duration::from_millis(5));
        let toml_str = toml::to_string(&config).expect("Failed to serialize to TOML");
        assert!(toml_str.contains("think_time = \"5ms\""));

        let deserialized: BenchmarkConfig =
            toml::from_str(&toml_str).expect("Failed to deserialize from TOML");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_parse_handwritten_file() {
        let text = r#"
            load_drivers = 3
            warmup_time = "1s"
            benchmark_time = "2s"
            cooldown_time = "1s"

            [database]
            kind = "noop"

            [[transactions]]
            name = "exampleTransaction"
            weight = 1
        "#;
        let config: BenchmarkConfig = toml::from_str(text).unwrap();
        assert_eq!(config.load_drivers, 3);
        assert_eq!(config.benchmark_time, Duration::from_secs(2));
        assert_eq!(config.think_time, Duration::ZERO);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.registry.port, 1099);
        assert_eq!(config.transactions[0].name, "exampleTransaction");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = valid_config();
        config.save_to(&path).unwrap();

        let loaded = BenchmarkConfig::load_from(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_config_file_path() {
        let path = BenchmarkConfig::config_file_path();
        assert!(path.is_ok());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("dlbench"));
        assert!(path.to_string_lossy().contains("dlbench.toml"));
    }
}
