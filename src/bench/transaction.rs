//! Transaction units
//!
//! A unit binds a configured transaction name to a resolved database
//! operation and accumulates the unit's own benchmark result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::{Database, OperationId};
use crate::error::is_serialization_failure;
use crate::models::BenchmarkResult;
use crate::{DlBenchError, Result};

#[derive(Debug)]
pub struct TransactionUnit {
    name: String,
    operation: OperationId,
    result: BenchmarkResult,
}

impl TransactionUnit {
    /// Resolve `name` against `database`
    pub fn resolve(name: &str, database: &dyn Database, benchmark_time: Duration) -> Result<Self> {
        let operation = database
            .resolve(name)
            .ok_or_else(|| DlBenchError::UnknownTransaction(name.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            operation,
            result: BenchmarkResult::new(name, benchmark_time),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }

    pub fn result(&self) -> &BenchmarkResult {
        &self.result
    }

    pub fn record_success(&mut self, duration: Duration) {
        self.result.inc_successful(duration);
    }

    pub fn record_failure(&mut self) {
        self.result.inc_failed();
    }

    /// Hand out the accumulated result, leaving an empty one behind
    pub fn take_result(&mut self) -> BenchmarkResult {
        let fresh = BenchmarkResult::new(self.name.as_str(), self.result.benchmark_time());
        std::mem::replace(&mut self.result, fresh)
    }

    /// Run the operation once inside its own database transaction.
    ///
    /// Any error rolls the transaction back and is returned unchanged.
    pub async fn execute(&self, database: &mut dyn Database) -> Result<()> {
        database.begin().await?;

        let outcome = match database.invoke(self.operation).await {
            Ok(()) => database.commit().await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            if let Err(rollback_err) = database.rollback().await {
                warn!(transaction = %self.name, error = %rollback_err, "rollback failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Run the operation until it completes without a serialization failure.
    ///
    /// Conflicts are retried immediately with no upper bound; `cancelled` is
    /// checked before every attempt. Returns the number of retries.
    pub async fn execute_with_retry(
        &self,
        database: &mut dyn Database,
        cancelled: &AtomicBool,
    ) -> Result<u32> {
        let mut retries = 0u32;
        loop {
            if cancelled.load(Ordering::Acquire) {
                return Err(DlBenchError::Cancelled(format!(
                    "{} cancelled after {} retries",
                    self.name, retries
                )));
            }

            match self.execute(database).await {
                Ok(()) => return Ok(retries),
                Err(e) if is_serialization_failure(&e) => {
                    retries += 1;
                    debug!(transaction = %self.name, retries, "serialization failure, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
