//! Database collaborators
//!
//! A load driver owns exactly one `Database` (its connection). Transaction
//! names from the configuration are resolved once at startup into
//! `OperationId`s; the transaction units then bracket `invoke` calls with
//! begin/commit/rollback.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::BenchmarkConfig;
use crate::{DlBenchError, Result};

pub mod bank;
pub mod noop;

#[cfg(test)]
pub(crate) mod scripted;

pub use bank::{BankConnection, BankOperation, BankStore, BankTotals, HistoryEntry};
pub use noop::NoopDatabase;

/// Handle of a business operation resolved by a `Database`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(pub usize);

/// Connection to the database under test
#[async_trait]
pub trait Database: Send {
    /// Resolve a configured transaction name
    fn resolve(&self, name: &str) -> Option<OperationId>;

    async fn begin(&mut self) -> Result<()>;

    /// Run the body of a business transaction
    async fn invoke(&mut self, operation: OperationId) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Release the connection and everything prepared on it
    async fn close(&mut self) -> Result<()>;
}

/// Constructor registered for a database kind
pub type DatabaseConstructor =
    Arc<dyn Fn(&BenchmarkConfig) -> Result<Box<dyn Database>> + Send + Sync>;

/// Maps `database.kind` strings to constructors
#[derive(Clone, Default)]
pub struct DatabaseRegistry {
    constructors: HashMap<String, DatabaseConstructor>,
}

impl DatabaseRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `noop` database
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("noop", |_config: &BenchmarkConfig| {
            Ok(Box::new(NoopDatabase::new()) as Box<dyn Database>)
        });
        registry
    }

    /// Register a constructor, replacing any previous one for `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&BenchmarkConfig) -> Result<Box<dyn Database>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Arc::new(constructor));
    }

    /// Register the in-memory bank database backed by `store`
    pub fn register_bank(&mut self, store: Arc<BankStore>) {
        self.register("bank", move |_config: &BenchmarkConfig| {
            Ok(Box::new(BankConnection::new(store.clone())) as Box<dyn Database>)
        });
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Open a connection for the configured database kind
    pub fn create(&self, config: &BenchmarkConfig) -> Result<Box<dyn Database>> {
        let constructor = self
            .constructors
            .get(&config.database.kind)
            .ok_or_else(|| DlBenchError::UnknownDatabase(config.database.kind.clone()))?;
        constructor(config)
    }
}
