//! Remote endpoints
//!
//! The controller and the load drivers only see each other through these
//! object-safe handles. `LocalDirectory` is the in-process naming service:
//! the controller publishes itself under `BENCHMARK_NAME`, drivers look it up
//! and register a handle to themselves.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::BenchmarkConfig;
use crate::models::{BenchmarkResult, Phase};
use crate::util::logging::LogSink;
use crate::{DlBenchError, Result};

/// Controller side of the registration protocol
#[async_trait]
pub trait BenchmarkHandle: Send + Sync {
    /// Admit a load driver; returns its 1-based id
    async fn register(&self, driver: Arc<dyn LoadDriverHandle>) -> Result<usize>;

    /// Snapshot of the benchmark configuration
    async fn configuration(&self) -> Result<BenchmarkConfig>;

    /// Central sink for forwarded log records
    async fn log_sink(&self) -> Result<Arc<dyn LogSink>>;
}

/// Load driver side, driven by the controller
#[async_trait]
pub trait LoadDriverHandle: Send + Sync {
    async fn phase(&self) -> Result<Phase>;

    async fn set_phase(&self, phase: Phase) -> Result<()>;

    /// Execute transactions until the phase becomes `Finished`
    async fn run(&self) -> Result<BenchmarkResult>;

    async fn close(&self) -> Result<()>;
}

/// Naming service binding controllers to well-known names
#[async_trait]
pub trait Directory: Send + Sync {
    async fn publish(&self, name: &str, endpoint: Arc<dyn BenchmarkHandle>) -> Result<()>;

    async fn lookup(&self, name: &str) -> Result<Arc<dyn BenchmarkHandle>>;

    async fn unpublish(&self, name: &str) -> Result<()>;
}

/// In-process directory
#[derive(Default)]
pub struct LocalDirectory {
    entries: RwLock<HashMap<String, Arc<dyn BenchmarkHandle>>>,
}

impl LocalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Directory for LocalDirectory {
    async fn publish(&self, name: &str, endpoint: Arc<dyn BenchmarkHandle>) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(name) {
            return Err(DlBenchError::AlreadyBound(name.to_string()));
        }
        entries.insert(name.to_string(), endpoint);
        debug!(name, "published");
        Ok(())
    }

    async fn lookup(&self, name: &str) -> Result<Arc<dyn BenchmarkHandle>> {
        self.entries
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DlBenchError::NotBound(name.to_string()))
    }

    async fn unpublish(&self, name: &str) -> Result<()> {
        if self.entries.write().await.remove(name).is_none() {
            return Err(DlBenchError::NotBound(name.to_string()));
        }
        debug!(name, "unpublished");
        Ok(())
    }
}
