//! Database double replaying scripted `invoke` outcomes.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Database, OperationId};
use crate::{DlBenchError, Result};

#[derive(Debug, Default)]
pub(crate) struct ScriptLog {
    pub begins: usize,
    pub invokes: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closed: bool,
}

pub(crate) struct ScriptedDatabase {
    outcomes: VecDeque<Result<()>>,
    invoke_time: Duration,
    log: Arc<Mutex<ScriptLog>>,
}

impl ScriptedDatabase {
    /// Invocations pop `outcomes` in order, then succeed
    pub fn new(outcomes: Vec<Result<()>>) -> Self {
        Self {
            outcomes: outcomes.into(),
            invoke_time: Duration::ZERO,
            log: Arc::new(Mutex::new(ScriptLog::default())),
        }
    }

    /// Every invocation sleeps this long first
    pub fn with_invoke_time(mut self, invoke_time: Duration) -> Self {
        self.invoke_time = invoke_time;
        self
    }

    pub fn log(&self) -> Arc<Mutex<ScriptLog>> {
        self.log.clone()
    }

    pub fn conflict() -> Result<()> {
        Err(DlBenchError::database("40001", "could not serialize access"))
    }

    fn record(&self, f: impl FnOnce(&mut ScriptLog)) {
        if let Ok(mut log) = self.log.lock() {
            f(&mut log);
        }
    }
}

#[async_trait]
impl Database for ScriptedDatabase {
    fn resolve(&self, name: &str) -> Option<OperationId> {
        (name != "missing").then_some(OperationId(0))
    }

    async fn begin(&mut self) -> Result<()> {
        self.record(|log| log.begins += 1);
        Ok(())
    }

    async fn invoke(&mut self, _operation: OperationId) -> Result<()> {
        self.record(|log| log.invokes += 1);
        if !self.invoke_time.is_zero() {
            tokio::time::sleep(self.invoke_time).await;
        }
        self.outcomes.pop_front().unwrap_or(Ok(()))
    }

    async fn commit(&mut self) -> Result<()> {
        self.record(|log| log.commits += 1);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record(|log| log.rollbacks += 1);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.record(|log| log.closed = true);
        Ok(())
    }
}
