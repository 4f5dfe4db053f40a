//! DLBENCH - Distributed Load Bench
//!
//! A controller/load-driver framework for database load tests: load drivers
//! register with a benchmark controller, are driven through synchronized
//! phases, execute a weighted transaction mix, and report a hierarchical
//! result tree.

use thiserror::Error;

// Public re-exports
pub mod bench;
pub mod config;
pub mod db;
pub mod models;
pub mod remote;
pub mod standalone;
pub mod util;

// Common error types
#[derive(Debug, Error)]
pub enum DlBenchError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration validation or parsing error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Error reported by the database under test
    #[error("Database error [{sqlstate}]: {message}")]
    Database {
        /// Standardized SQLSTATE code
        sqlstate: String,
        /// Driver message
        message: String,
    },
    /// Error wrapped by a remote invocation
    #[error("Remote invocation failed: {0}")]
    Remote(#[source] Box<DlBenchError>),
    /// Registration attempted after the configured worker count was reached
    #[error("Benchmark is already full ({capacity} load drivers registered)")]
    AlreadyFull {
        /// Configured number of load drivers
        capacity: usize,
    },
    /// Name not published in the directory
    #[error("Name not bound: {0}")]
    NotBound(String),
    /// Name already published in the directory
    #[error("Name already bound: {0}")]
    AlreadyBound(String),
    /// Transaction name the database cannot resolve
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),
    /// Database kind missing from the registry
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),
    /// Worker task failure
    #[error("Worker error: {0}")]
    Worker(String),
    /// Cancellation error
    #[error("Cancellation error: {0}")]
    Cancelled(String),
    /// Results persistence error
    #[error("Results persistence error: {0}")]
    Persistence(String),
}

impl DlBenchError {
    /// Build a database error from a SQLSTATE and message
    pub fn database(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        DlBenchError::Database {
            sqlstate: sqlstate.into(),
            message: message.into(),
        }
    }

    /// Wrap this error as if it had crossed a remote call boundary
    pub fn remote(self) -> Self {
        DlBenchError::Remote(Box::new(self))
    }
}

impl From<serde_json::Error> for DlBenchError {
    fn from(err: serde_json::Error) -> Self {
        DlBenchError::Persistence(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for DlBenchError {
    fn from(err: toml::de::Error) -> Self {
        DlBenchError::Config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for DlBenchError {
    fn from(err: toml::ser::Error) -> Self {
        DlBenchError::Config(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for DLBENCH operations
pub type Result<T> = std::result::Result<T, DlBenchError>;

/// Error handling utilities
pub mod error {
    use super::DlBenchError;

    /// SQLSTATE reported for serialization failures
    pub const SERIALIZATION_FAILURE: &str = "40001";

    /// Check if an error is a recoverable serialization conflict.
    ///
    /// A `Remote` wrapper is looked through exactly one level.
    pub fn is_serialization_failure(error: &DlBenchError) -> bool {
        match error {
            DlBenchError::Database { sqlstate, .. } => sqlstate == SERIALIZATION_FAILURE,
            DlBenchError::Remote(inner) => matches!(
                inner.as_ref(),
                DlBenchError::Database { sqlstate, .. } if sqlstate == SERIALIZATION_FAILURE
            ),
            _ => false,
        }
    }

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &DlBenchError) -> String {
        match error {
            DlBenchError::Config(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            DlBenchError::AlreadyFull { capacity } => format!(
                "All {} load driver slots are taken. Raise `load_drivers` or stop extra drivers.",
                capacity
            ),
            DlBenchError::NotBound(name) => format!(
                "No benchmark controller published as \"{}\". Start the controller first.",
                name
            ),
            DlBenchError::UnknownDatabase(kind) => format!(
                "Database kind \"{}\" is not registered. Check `database.kind`.",
                kind
            ),
            DlBenchError::UnknownTransaction(name) => format!(
                "Transaction \"{}\" is not provided by the configured database.",
                name
            ),
            DlBenchError::Persistence(_) => {
                "Failed to save results. Check disk space and permissions.".to_string()
            }
            DlBenchError::Cancelled(_) => "Benchmark run was cancelled.".to_string(),
            _ => error.to_string(),
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "dlbench";
pub const CONFIG_FILE: &str = "dlbench.toml";
pub const RESULTS_FILE: &str = "results.json";
pub const LOG_DIR: &str = "logs";
pub const MAX_RESULTS_HISTORY: usize = 100;
/// Directory name the controller is published under
pub const BENCHMARK_NAME: &str = "Benchmark";
/// Name prefix of load driver results and log targets
pub const LOADDRIVER_NAME: &str = "LoadDriver";
