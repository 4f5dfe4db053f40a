//! In-memory bank database
//!
//! Branches, tellers, accounts and a history table in the classic TPC-B
//! shape. Writes are buffered per transaction and validated against row
//! versions at commit; a row changed by another connection in between makes
//! the commit fail with SQLSTATE 40001.

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Database, OperationId};
use crate::bench::params::ParameterGenerator;
use crate::error::SERIALIZATION_FAILURE;
use crate::{DlBenchError, Result};

pub const TELLERS_PER_BRANCH: usize = 10;
pub const ACCOUNTS_PER_BRANCH: usize = 100_000;
/// Largest amount a single deposit moves
pub const MAX_DELTA: i64 = 10_000;

const HISTORY_COMMENT: &str = "deposit";

/// Business operations offered by the bank database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankOperation {
    /// Read the balance of a random account
    AccountBalance,
    /// Deposit a random amount through a random teller and branch
    Deposit,
    /// Count history entries with a random amount
    Analyse,
}

impl BankOperation {
    pub const ALL: [BankOperation; 3] = [
        BankOperation::AccountBalance,
        BankOperation::Deposit,
        BankOperation::Analyse,
    ];

    /// Transaction name used in the configuration
    pub fn name(&self) -> &'static str {
        match self {
            BankOperation::AccountBalance => "kontostand",
            BankOperation::Deposit => "einzahlung",
            BankOperation::Analyse => "analyse",
        }
    }

    fn id(&self) -> OperationId {
        let index = Self::ALL.iter().position(|op| op == self).unwrap_or(0);
        OperationId(index)
    }

    fn from_id(id: OperationId) -> Option<Self> {
        Self::ALL.get(id.0).copied()
    }
}

impl FromStr for BankOperation {
    type Err = DlBenchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|op| op.name() == s)
            .copied()
            .ok_or_else(|| DlBenchError::UnknownTransaction(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Branches,
    Tellers,
    Accounts,
}

#[derive(Debug, Clone, Copy, Default)]
struct Row {
    balance: i64,
    version: u64,
}

/// Row of the history table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub account: usize,
    pub teller: usize,
    pub branch: usize,
    pub delta: i64,
    /// Account balance after the deposit
    pub account_balance: i64,
    pub comment: &'static str,
}

#[derive(Debug)]
struct BankState {
    branches: Vec<Row>,
    tellers: Vec<Row>,
    accounts: Vec<Row>,
    history: Vec<HistoryEntry>,
}

impl BankState {
    fn table(&self, table: Table) -> &Vec<Row> {
        match table {
            Table::Branches => &self.branches,
            Table::Tellers => &self.tellers,
            Table::Accounts => &self.accounts,
        }
    }

    fn table_mut(&mut self, table: Table) -> &mut Vec<Row> {
        match table {
            Table::Branches => &mut self.branches,
            Table::Tellers => &mut self.tellers,
            Table::Accounts => &mut self.accounts,
        }
    }

    fn row(&self, table: Table, id: usize) -> Result<Row> {
        id.checked_sub(1)
            .and_then(|index| self.table(table).get(index))
            .copied()
            .ok_or_else(|| {
                DlBenchError::database("02000", format!("no row {} in {:?}", id, table))
            })
    }
}

/// Totals over every table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankTotals {
    pub branches: i64,
    pub tellers: i64,
    pub accounts: i64,
    pub history: i64,
    pub history_entries: usize,
}

impl BankTotals {
    /// Every deposit reached all three balances and the history
    pub fn is_consistent(&self) -> bool {
        self.branches == self.tellers
            && self.tellers == self.accounts
            && self.accounts == self.history
    }
}

/// Shared bank tables
#[derive(Debug)]
pub struct BankStore {
    state: Mutex<BankState>,
}

impl BankStore {
    /// Tables for scale factor `n`
    pub fn initialize(scale: usize) -> Self {
        Self::with_sizes(scale, TELLERS_PER_BRANCH, ACCOUNTS_PER_BRANCH)
    }

    /// Tables with explicit per-branch sizes
    pub fn with_sizes(
        branches: usize,
        tellers_per_branch: usize,
        accounts_per_branch: usize,
    ) -> Self {
        let branches = branches.max(1);
        let state = BankState {
            branches: vec![Row::default(); branches],
            tellers: vec![Row::default(); branches * tellers_per_branch.max(1)],
            accounts: vec![Row::default(); branches * accounts_per_branch.max(1)],
            history: Vec::new(),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BankState>> {
        self.state
            .lock()
            .map_err(|_| DlBenchError::database("XX000", "bank store lock poisoned"))
    }

    /// (branches, tellers, accounts)
    pub fn sizes(&self) -> Result<(usize, usize, usize)> {
        let state = self.lock()?;
        Ok((state.branches.len(), state.tellers.len(), state.accounts.len()))
    }

    /// Committed history rows in commit order
    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.lock()?.history.clone())
    }

    pub fn totals(&self) -> Result<BankTotals> {
        fn sum(rows: &[Row]) -> i64 {
            rows.iter().map(|r| r.balance).sum()
        }

        let state = self.lock()?;
        Ok(BankTotals {
            branches: sum(&state.branches),
            tellers: sum(&state.tellers),
            accounts: sum(&state.accounts),
            history: state.history.iter().map(|h| h.delta).sum(),
            history_entries: state.history.len(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    table: Table,
    id: usize,
    delta: i64,
    version: u64,
}

#[derive(Debug, Default)]
struct PendingTransaction {
    writes: Vec<PendingWrite>,
    history: Vec<HistoryEntry>,
}

impl PendingTransaction {
    fn pending_delta(&self, table: Table, id: usize) -> i64 {
        self.writes
            .iter()
            .filter(|w| w.table == table && w.id == id)
            .map(|w| w.delta)
            .sum()
    }
}

/// One connection to a `BankStore`
#[derive(Debug)]
pub struct BankConnection {
    store: Arc<BankStore>,
    params: ParameterGenerator,
    pending: Option<PendingTransaction>,
    closed: bool,
}

impl BankConnection {
    pub fn new(store: Arc<BankStore>) -> Self {
        Self::with_params(store, ParameterGenerator::new())
    }

    pub fn with_params(store: Arc<BankStore>, params: ParameterGenerator) -> Self {
        Self {
            store,
            params,
            pending: None,
            closed: false,
        }
    }

    fn transaction(&mut self) -> Result<&mut PendingTransaction> {
        if self.closed {
            return Err(DlBenchError::database("08003", "connection is closed"));
        }
        self.pending
            .as_mut()
            .ok_or_else(|| DlBenchError::database("25P01", "no transaction in progress"))
    }

    /// Balance of `account` as seen by the current transaction
    pub fn account_balance(&mut self, account: usize) -> Result<i64> {
        let store = self.store.clone();
        let tx = self.transaction()?;
        let row = store.lock()?.row(Table::Accounts, account)?;
        Ok(row.balance + tx.pending_delta(Table::Accounts, account))
    }

    /// Book `delta` on an account, a teller and a branch and record it in the
    /// history; returns the new account balance
    pub fn deposit(
        &mut self,
        account: usize,
        teller: usize,
        branch: usize,
        delta: i64,
    ) -> Result<i64> {
        let store = self.store.clone();
        let tx = self.transaction()?;
        let state = store.lock()?;

        for (table, id) in [
            (Table::Branches, branch),
            (Table::Tellers, teller),
            (Table::Accounts, account),
        ] {
            let row = state.row(table, id)?;
            // The first write of a row pins the version it was based on
            let version = tx
                .writes
                .iter()
                .find(|w| w.table == table && w.id == id)
                .map_or(row.version, |w| w.version);
            tx.writes.push(PendingWrite {
                table,
                id,
                delta,
                version,
            });
        }

        let account_balance = state.row(Table::Accounts, account)?.balance
            + tx.pending_delta(Table::Accounts, account);
        tx.history.push(HistoryEntry {
            account,
            teller,
            branch,
            delta,
            account_balance,
            comment: HISTORY_COMMENT,
        });
        Ok(account_balance)
    }

    /// Number of committed and own history entries with the given amount
    pub fn count_delta(&mut self, delta: i64) -> Result<usize> {
        let store = self.store.clone();
        let tx = self.transaction()?;
        let committed = store.lock()?.history.iter().filter(|h| h.delta == delta).count();
        let own = tx.history.iter().filter(|h| h.delta == delta).count();
        Ok(committed + own)
    }

    fn random_id(&mut self, count: usize) -> Result<usize> {
        let id = self.params.random_int(1, count as i64)?;
        Ok(id as usize)
    }
}

#[async_trait]
impl Database for BankConnection {
    fn resolve(&self, name: &str) -> Option<OperationId> {
        name.parse::<BankOperation>().ok().map(|op| op.id())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.closed {
            return Err(DlBenchError::database("08003", "connection is closed"));
        }
        self.pending = Some(PendingTransaction::default());
        Ok(())
    }

    async fn invoke(&mut self, operation: OperationId) -> Result<()> {
        let operation = BankOperation::from_id(operation)
            .ok_or_else(|| DlBenchError::UnknownTransaction(format!("{:?}", operation)))?;
        let (branches, tellers, accounts) = self.store.sizes()?;

        match operation {
            BankOperation::AccountBalance => {
                let account = self.random_id(accounts)?;
                self.account_balance(account)?;
            }
            BankOperation::Deposit => {
                let account = self.random_id(accounts)?;
                let teller = self.random_id(tellers)?;
                let branch = self.random_id(branches)?;
                let delta = self.params.random_int(1, MAX_DELTA)?;
                self.deposit(account, teller, branch, delta)?;
            }
            BankOperation::Analyse => {
                let delta = self.params.random_int(1, MAX_DELTA)?;
                self.count_delta(delta)?;
            }
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.transaction()?;
        let tx = self.pending.take().unwrap_or_default();
        let mut state = self.store.lock()?;

        for write in &tx.writes {
            if state.row(write.table, write.id)?.version != write.version {
                return Err(DlBenchError::database(
                    SERIALIZATION_FAILURE,
                    "could not serialize access due to concurrent update",
                ));
            }
        }

        for write in &tx.writes {
            let row = &mut state.table_mut(write.table)[write.id - 1];
            row.balance += write.delta;
            row.version += 1;
        }
        state.history.extend(tx.history);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.pending = None;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_serialization_failure;

    fn small_store() -> Arc<BankStore> {
        Arc::new(BankStore::with_sizes(2, 2, 5))
    }

    #[test]
    fn test_operation_names() {
        assert_eq!("kontostand".parse::<BankOperation>().unwrap(), BankOperation::AccountBalance);
        assert_eq!("einzahlung".parse::<BankOperation>().unwrap(), BankOperation::Deposit);
        assert_eq!("analyse".parse::<BankOperation>().unwrap(), BankOperation::Analyse);
        assert!("transfer".parse::<BankOperation>().is_err());

        for op in BankOperation::ALL {
            assert_eq!(BankOperation::from_id(op.id()), Some(op));
        }
    }

    #[test]
    fn test_initialize_sizes() {
        let store = BankStore::with_sizes(3, 10, 100);
        assert_eq!(store.sizes().unwrap(), (3, 30, 300));
    }

    #[tokio::test]
    async fn test_deposit_commit_updates_all_tables() {
        let store = small_store();
        let mut conn = BankConnection::new(store.clone());

        conn.begin().await.unwrap();
        assert_eq!(conn.deposit(3, 1, 2, 100).unwrap(), 100);
        assert_eq!(conn.deposit(3, 2, 1, 50).unwrap(), 150);
        assert_eq!(conn.count_delta(100).unwrap(), 1);
        conn.commit().await.unwrap();

        let totals = store.totals().unwrap();
        assert_eq!(totals.accounts, 150);
        assert_eq!(totals.history_entries, 2);
        assert!(totals.is_consistent());

        let history = store.history().unwrap();
        assert_eq!((history[1].account, history[1].teller, history[1].branch), (3, 2, 1));
        assert_eq!(history[1].account_balance, 150);
        assert_eq!(history[1].comment, "deposit");

        conn.begin().await.unwrap();
        assert_eq!(conn.account_balance(3).unwrap(), 150);
        conn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = small_store();
        let mut conn = BankConnection::new(store.clone());

        conn.begin().await.unwrap();
        conn.deposit(1, 1, 1, 500).unwrap();
        conn.rollback().await.unwrap();

        let totals = store.totals().unwrap();
        assert_eq!(totals.accounts, 0);
        assert_eq!(totals.history_entries, 0);
    }

    #[tokio::test]
    async fn test_concurrent_update_fails_with_serialization_failure() {
        let store = small_store();
        let mut first = BankConnection::new(store.clone());
        let mut second = BankConnection::new(store.clone());

        first.begin().await.unwrap();
        second.begin().await.unwrap();
        first.deposit(1, 1, 1, 10).unwrap();
        second.deposit(2, 2, 1, 20).unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(is_serialization_failure(&err));

        // The losing transaction left nothing behind and can be retried
        let totals = store.totals().unwrap();
        assert_eq!(totals.branches, 10);
        assert!(totals.is_consistent());

        second.begin().await.unwrap();
        second.deposit(2, 2, 1, 20).unwrap();
        second.commit().await.unwrap();
        assert_eq!(store.totals().unwrap().branches, 30);
    }

    #[tokio::test]
    async fn test_random_operations_keep_tables_consistent() {
        let store = small_store();
        let mut conn = BankConnection::with_params(store.clone(), ParameterGenerator::seeded(5));

        for _ in 0..50 {
            for op in BankOperation::ALL {
                conn.begin().await.unwrap();
                conn.invoke(op.id()).await.unwrap();
                conn.commit().await.unwrap();
            }
        }

        let totals = store.totals().unwrap();
        assert_eq!(totals.history_entries, 50);
        assert!(totals.is_consistent());
    }

    #[tokio::test]
    async fn test_work_outside_transaction_is_rejected() {
        let mut conn = BankConnection::new(small_store());
        assert!(conn.invoke(BankOperation::AccountBalance.id()).await.is_err());

        conn.close().await.unwrap();
        assert!(conn.begin().await.is_err());
    }
}
