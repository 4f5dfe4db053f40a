//! Database that accepts every transaction name and does no work.

use async_trait::async_trait;

use super::{Database, OperationId};
use crate::{DlBenchError, Result};

#[derive(Debug, Default)]
pub struct NoopDatabase {
    in_transaction: bool,
    closed: bool,
}

impl NoopDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DlBenchError::database("08003", "connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Database for NoopDatabase {
    fn resolve(&self, _name: &str) -> Option<OperationId> {
        Some(OperationId(0))
    }

    async fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.in_transaction = true;
        Ok(())
    }

    async fn invoke(&mut self, _operation: OperationId) -> Result<()> {
        self.ensure_open()
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
