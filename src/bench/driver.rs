//! Load driver
//!
//! A load driver connects to the benchmark controller, registers itself and
//! then executes the weighted transaction mix against its own database
//! connection until the controller moves it to `Finished`. Only transactions
//! that end while the phase is `Benchmark` are counted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::Level;

use super::mix::TransactionMix;
use super::params::ParameterGenerator;
use super::transaction::TransactionUnit;
use crate::config::BenchmarkConfig;
use crate::db::{Database, DatabaseRegistry};
use crate::models::{AtomicPhase, BenchmarkResult, Phase};
use crate::remote::{BenchmarkHandle, Directory, LoadDriverHandle};
use crate::util::logging::{parse_level, LogRecord, LogSink};
use crate::{DlBenchError, Result, BENCHMARK_NAME, LOADDRIVER_NAME};

/// State owned by the execution loop
struct DriverState {
    database: Box<dyn Database>,
    units: Vec<TransactionUnit>,
    mix: TransactionMix,
    params: ParameterGenerator,
    executed: bool,
    closed: bool,
}

pub struct LoadDriver {
    id: AtomicUsize,
    config: BenchmarkConfig,
    phase: AtomicPhase,
    cancelled: AtomicBool,
    cancel_notify: Notify,
    log_sink: Arc<dyn LogSink>,
    log_level: Level,
    state: Mutex<DriverState>,
}

impl LoadDriver {
    /// Prepare a driver: build the mix and resolve every configured
    /// transaction. Fails without touching the database further if either
    /// step fails.
    pub fn new(
        config: BenchmarkConfig,
        database: Box<dyn Database>,
        log_sink: Arc<dyn LogSink>,
    ) -> Result<Self> {
        Self::with_params(config, database, log_sink, ParameterGenerator::new())
    }

    pub fn with_params(
        config: BenchmarkConfig,
        database: Box<dyn Database>,
        log_sink: Arc<dyn LogSink>,
        params: ParameterGenerator,
    ) -> Result<Self> {
        let mix = TransactionMix::new(&config.transactions)?;
        let units = config
            .transactions
            .iter()
            .map(|tx| TransactionUnit::resolve(&tx.name, database.as_ref(), config.benchmark_time))
            .collect::<Result<Vec<_>>>()?;
        let log_level = parse_level(&config.log_level)?;

        Ok(Self {
            id: AtomicUsize::new(0),
            config,
            phase: AtomicPhase::new(Phase::Init),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
            log_sink,
            log_level,
            state: Mutex::new(DriverState {
                database,
                units,
                mix,
                params,
                executed: false,
                closed: false,
            }),
        })
    }

    /// Look up the controller, fetch its configuration, open a database
    /// connection and register. The returned driver is `Ready`.
    pub async fn connect(
        directory: &dyn Directory,
        databases: &DatabaseRegistry,
    ) -> Result<Arc<Self>> {
        let controller = directory.lookup(BENCHMARK_NAME).await?;
        let config = controller.configuration().await?;
        let log_sink = controller.log_sink().await?;
        let database = databases.create(&config)?;

        let driver = Arc::new(Self::new(config, database, log_sink)?);
        driver.register_with(controller.as_ref()).await?;
        Ok(driver)
    }

    /// Register with `controller` and move to `Ready`
    pub async fn register_with(
        self: &Arc<Self>,
        controller: &dyn BenchmarkHandle,
    ) -> Result<usize> {
        let handle: Arc<dyn LoadDriverHandle> = self.clone();
        let id = match controller.register(handle).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(close_err) = self.close_database().await {
                    tracing::warn!(
                        error = %close_err,
                        "closing database after failed registration"
                    );
                }
                return Err(e);
            }
        };

        self.id.store(id, Ordering::Release);
        self.phase.store(Phase::Ready);
        self.log(Level::INFO, format!("registered as load driver {}", id));
        Ok(id)
    }

    /// Id assigned by the controller, 0 before registration
    pub fn id(&self) -> usize {
        self.id.load(Ordering::Acquire)
    }

    /// Result and log target name
    pub fn name(&self) -> String {
        format!("{}{}", LOADDRIVER_NAME, self.id())
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Stop the execution loop before its next transaction attempt, cutting
    /// short a think-time sleep in progress
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.cancel_notify.notify_waiters();
    }

    /// Emit through `tracing` and forward to the controller's sink
    fn log(&self, level: Level, message: String) {
        let name = self.name();
        match level {
            Level::ERROR => tracing::error!(driver = %name, "{}", message),
            Level::WARN => tracing::warn!(driver = %name, "{}", message),
            Level::INFO => tracing::info!(driver = %name, "{}", message),
            Level::DEBUG => tracing::debug!(driver = %name, "{}", message),
            _ => tracing::trace!(driver = %name, "{}", message),
        }

        // Level ordering: ERROR is the smallest, TRACE the largest
        if level <= self.log_level {
            if let Err(e) = self.log_sink.log_message(LogRecord::new(level, name, message)) {
                tracing::warn!(error = %e, "log forwarding failed");
            }
        }
    }

    async fn think(&self) {
        if self.config.think_time.is_zero() {
            tokio::task::yield_now().await;
            return;
        }

        // Registered before the flag check so a concurrent cancel is not lost
        let cancelled = self.cancel_notify.notified();
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.config.think_time) => {}
            _ = cancelled => {}
        }
    }

    async fn execution_loop(&self) -> Result<BenchmarkResult> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.closed {
            return Err(DlBenchError::Worker(format!("{} is closed", self.name())));
        }
        if state.executed {
            return Err(DlBenchError::Worker(format!("{} already executed", self.name())));
        }
        state.executed = true;

        self.log(Level::INFO, "starting execution".to_string());

        while self.phase.load() != Phase::Finished {
            let index = state.mix.select(&mut state.params)?;
            let unit = &mut state.units[index];

            let started = Instant::now();
            let outcome = unit
                .execute_with_retry(state.database.as_mut(), &self.cancelled)
                .await;
            let elapsed = started.elapsed();
            let recording = self.phase.load().is_recording();

            match outcome {
                Ok(retries) => {
                    if recording {
                        unit.record_success(elapsed);
                    }
                    if Level::DEBUG <= self.log_level {
                        self.log(
                            Level::DEBUG,
                            format!(
                                "{} took {:.3} ms ({} retries)",
                                unit.name(),
                                elapsed.as_secs_f64() * 1000.0,
                                retries
                            ),
                        );
                    }
                }
                Err(e @ DlBenchError::Cancelled(_)) => {
                    self.log(Level::INFO, format!("execution cancelled: {}", e));
                    return Err(e);
                }
                Err(e) => {
                    if recording {
                        unit.record_failure();
                    }
                    self.log(Level::WARN, format!("{} failed: {}", unit.name(), e));
                }
            }

            self.think().await;
        }

        let mut result = BenchmarkResult::new(self.name(), self.config.benchmark_time);
        for unit in state.units.iter_mut() {
            let unit_result = unit.take_result();
            self.log(Level::TRACE, unit_result.summary());
            result.add_child(unit_result);
        }

        self.log(Level::INFO, format!("finished: {}", result.summary()));
        Ok(result)
    }

    async fn close_database(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.database.close().await
    }
}

#[async_trait]
impl LoadDriverHandle for LoadDriver {
    async fn phase(&self) -> Result<Phase> {
        Ok(self.phase.load())
    }

    async fn set_phase(&self, phase: Phase) -> Result<()> {
        self.phase.store(phase);
        self.log(Level::DEBUG, format!("phase {}", phase));
        Ok(())
    }

    async fn run(&self) -> Result<BenchmarkResult> {
        self.execution_loop().await
    }

    async fn close(&self) -> Result<()> {
        self.cancel();
        self.close_database().await?;
        self.log(Level::INFO, "closed".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::scripted::ScriptedDatabase;
    use crate::util::logging::MemoryLogSink;
    use std::time::Duration;

    fn config() -> BenchmarkConfig {
        BenchmarkConfig::new()
            .with_load_drivers(1)
            .with_phases(Duration::ZERO, Duration::from_secs(2), Duration::ZERO)
            .with_think_time(Duration::from_secs(3600))
            .with_transaction("exampleTransaction", 1)
    }

    fn driver(db: ScriptedDatabase, sink: Arc<MemoryLogSink>) -> Arc<LoadDriver> {
        Arc::new(LoadDriver::new(config(), Box::new(db), sink).unwrap())
    }

    /// Run until the first think-time sleep, then finish
    async fn run_one_iteration(driver: Arc<LoadDriver>) -> BenchmarkResult {
        driver.set_phase(Phase::Benchmark).await.unwrap();
        let task = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.run().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        driver.set_phase(Phase::Finished).await.unwrap();
        task.await.unwrap().unwrap()
    }

    #[test]
    fn test_unknown_transaction_fails_fast() {
        let cfg = config().with_transaction("missing", 1);
        let db = Box::new(ScriptedDatabase::new(vec![]));
        let result = LoadDriver::new(cfg, db, Arc::new(MemoryLogSink::new()));
        assert!(matches!(result, Err(DlBenchError::UnknownTransaction(_))));
    }

    #[test]
    fn test_zero_total_weight_fails_fast() {
        let mut cfg = config();
        cfg.transactions[0].weight = 0;
        let db = Box::new(ScriptedDatabase::new(vec![]));
        let result = LoadDriver::new(cfg, db, Arc::new(MemoryLogSink::new()));
        assert!(matches!(result, Err(DlBenchError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicts_count_as_one_success_timed_from_first_attempt() {
        let outcomes = vec![ScriptedDatabase::conflict(), ScriptedDatabase::conflict()];
        let db = ScriptedDatabase::new(outcomes).with_invoke_time(Duration::from_millis(10));
        let log = db.log();
        let driver = driver(db, Arc::new(MemoryLogSink::new()));

        let result = run_one_iteration(driver).await;

        assert_eq!(result.successful(), 1);
        assert_eq!(result.failed(), 0);
        assert!(result.duration() >= Duration::from_millis(30));
        assert!(result.duration() < Duration::from_secs(1));
        assert_eq!(log.lock().unwrap().invokes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_error_counts_as_one_failure_without_retry() {
        let db = ScriptedDatabase::new(vec![Err(DlBenchError::database("23505", "duplicate key"))]);
        let log = db.log();
        let sink = Arc::new(MemoryLogSink::new());
        let driver = driver(db, sink.clone());

        let result = run_one_iteration(driver).await;

        assert_eq!(result.successful(), 0);
        assert_eq!(result.failed(), 1);
        assert_eq!(log.lock().unwrap().invokes, 1);
        assert!(sink
            .records()
            .iter()
            .any(|r| r.level == "WARN" && r.message.contains("23505")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_recorded_outside_benchmark_phase() {
        let db = ScriptedDatabase::new(vec![]);
        let log = db.log();
        let driver = driver(db, Arc::new(MemoryLogSink::new()));
        driver.set_phase(Phase::Warmup).await.unwrap();

        let task = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.run().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        driver.set_phase(Phase::Finished).await.unwrap();
        let result = task.await.unwrap().unwrap();

        assert_eq!(log.lock().unwrap().commits, 1);
        assert_eq!(result.successful() + result.failed(), 0);
        assert_eq!(result.children().len(), 1);
        assert_eq!(result.children()[0].name(), "exampleTransaction");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_is_not_reentrant() {
        let driver = driver(ScriptedDatabase::new(vec![]), Arc::new(MemoryLogSink::new()));
        run_one_iteration(driver.clone()).await;
        assert!(driver.run().await.is_err());
    }

    #[tokio::test]
    async fn test_close_releases_database_and_blocks_run() {
        let db = ScriptedDatabase::new(vec![]);
        let log = db.log();
        let driver = driver(db, Arc::new(MemoryLogSink::new()));

        driver.close().await.unwrap();
        assert!(log.lock().unwrap().closed);
        assert!(driver.run().await.is_err());
        // Closing twice is harmless
        driver.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_interrupts_think_time() {
        let db = ScriptedDatabase::new(vec![]);
        let log = db.log();
        let driver = driver(db, Arc::new(MemoryLogSink::new()));
        driver.set_phase(Phase::Benchmark).await.unwrap();

        let task = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.run().await })
        };
        // First transaction done, now in the hour-long think time
        while log.lock().unwrap().commits == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tokio::time::timeout(Duration::from_secs(5), driver.close())
            .await
            .expect("close must not wait out the think time")
            .unwrap();
        assert!(log.lock().unwrap().closed);

        let outcome = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, Err(DlBenchError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_log_forwarding_respects_level() {
        let sink = Arc::new(MemoryLogSink::new());
        let cfg = config().with_log_level("warn");
        let db = Box::new(ScriptedDatabase::new(vec![]));
        let driver = LoadDriver::new(cfg, db, sink.clone()).unwrap();

        driver.log(Level::INFO, "hidden".to_string());
        driver.log(Level::ERROR, "shown".to_string());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "shown");
        assert_eq!(records[0].target, "LoadDriver0");
    }
}
