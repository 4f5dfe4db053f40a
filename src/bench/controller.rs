//! Benchmark controller
//!
//! Admits exactly the configured number of load drivers, drives all of them
//! through the phase sequence on its own clock, collects their results and
//! publishes the aggregated result tree.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::BenchmarkConfig;
use crate::models::{BenchmarkResult, Phase};
use crate::remote::{BenchmarkHandle, Directory, LoadDriverHandle};
use crate::util::logging::LogSink;
use crate::util::units::format_tps;
use crate::{DlBenchError, Result, BENCHMARK_NAME};

/// Controller-side state of a registered load driver
#[derive(Debug, Clone, PartialEq)]
pub enum DriverStatus {
    /// Registered, waiting for the run
    Registered,
    /// Execution loop running
    Running,
    /// Returned a result
    Completed,
    /// Execution failed
    Failed(String),
}

struct DriverSlot {
    id: usize,
    handle: Arc<dyn LoadDriverHandle>,
    status: DriverStatus,
}

pub struct BenchmarkController {
    config: BenchmarkConfig,
    directory: Arc<dyn Directory>,
    log_sink: Arc<dyn LogSink>,
    drivers: RwLock<Vec<DriverSlot>>,
    started: AtomicBool,
    phase_tx: watch::Sender<Phase>,
}

impl BenchmarkController {
    /// Validate the configuration and publish the controller under
    /// `BENCHMARK_NAME`
    pub async fn start(
        config: BenchmarkConfig,
        directory: Arc<dyn Directory>,
        log_sink: Arc<dyn LogSink>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let (phase_tx, _) = watch::channel(Phase::Init);
        let controller = Arc::new(Self {
            config,
            directory: directory.clone(),
            log_sink,
            drivers: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
            phase_tx,
        });

        let endpoint: Arc<dyn BenchmarkHandle> = controller.clone();
        directory.publish(BENCHMARK_NAME, endpoint).await?;
        info!(
            name = BENCHMARK_NAME,
            load_drivers = controller.config.load_drivers,
            "benchmark published"
        );

        Ok(controller)
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Follow the phase the controller last broadcast
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    pub async fn registered_count(&self) -> usize {
        self.drivers.read().await.len()
    }

    pub async fn driver_statuses(&self) -> Vec<(usize, DriverStatus)> {
        let drivers = self.drivers.read().await;
        drivers.iter().map(|d| (d.id, d.status.clone())).collect()
    }

    /// All configured drivers registered and every one reports `Ready`
    pub async fn is_admission_complete(&self) -> Result<bool> {
        let handles = self.handles().await;
        if handles.len() != self.config.load_drivers {
            return Ok(false);
        }
        for handle in &handles {
            if handle.phase().await? != Phase::Ready {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Poll until admission is complete
    pub async fn wait_for_admission(&self, poll_interval: Duration) -> Result<()> {
        while !self.is_admission_complete().await? {
            tokio::time::sleep(poll_interval).await;
        }
        info!(load_drivers = self.config.load_drivers, "admission complete");
        Ok(())
    }

    async fn handles(&self) -> Vec<Arc<dyn LoadDriverHandle>> {
        let drivers = self.drivers.read().await;
        drivers.iter().map(|d| d.handle.clone()).collect()
    }

    async fn set_status(&self, index: usize, status: DriverStatus) {
        if let Some(slot) = self.drivers.write().await.get_mut(index) {
            slot.status = status;
        }
    }

    /// Push `phase` to every driver, stopping at the first failure
    async fn broadcast(&self, handles: &[Arc<dyn LoadDriverHandle>], phase: Phase) -> Result<()> {
        for handle in handles {
            handle.set_phase(phase).await?;
        }
        self.phase_tx.send_replace(phase);
        info!(phase = %phase, "phase changed");
        Ok(())
    }

    /// Push `Finished` to every driver, closing any driver that cannot be
    /// reached so its execution loop still ends
    async fn broadcast_finished_best_effort(&self, handles: &[Arc<dyn LoadDriverHandle>]) {
        for handle in handles {
            if let Err(e) = handle.set_phase(Phase::Finished).await {
                warn!(error = %e, "could not finish load driver, closing it");
                if let Err(e) = handle.close().await {
                    warn!(error = %e, "could not close load driver");
                }
            }
        }
        self.phase_tx.send_replace(Phase::Finished);
    }

    /// Warmup, benchmark and cooldown on the controller's clock
    async fn drive_phases(&self, handles: &[Arc<dyn LoadDriverHandle>]) -> Result<()> {
        tokio::time::sleep(self.config.warmup_time).await;
        self.broadcast(handles, Phase::Benchmark).await?;
        tokio::time::sleep(self.config.benchmark_time).await;
        self.broadcast(handles, Phase::Cooldown).await?;
        tokio::time::sleep(self.config.cooldown_time).await;
        self.broadcast(handles, Phase::Finished).await
    }

    /// Run the benchmark once over all admitted drivers.
    ///
    /// Every driver task is awaited before returning, also on failure; the
    /// first error observed is returned.
    pub async fn run(&self) -> Result<BenchmarkResult> {
        let handles = self.handles().await;
        if handles.len() != self.config.load_drivers {
            return Err(DlBenchError::Worker(format!(
                "Admission incomplete: {} of {} load drivers registered",
                handles.len(),
                self.config.load_drivers
            )));
        }

        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DlBenchError::Worker("Benchmark already started".to_string()));
        }

        if let Err(e) = self.broadcast(&handles, Phase::Warmup).await {
            self.broadcast_finished_best_effort(&handles).await;
            return Err(e);
        }

        let tasks: Vec<JoinHandle<Result<BenchmarkResult>>> = handles
            .iter()
            .map(|handle| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.run().await })
            })
            .collect();
        for index in 0..tasks.len() {
            self.set_status(index, DriverStatus::Running).await;
        }

        let mut first_error = None;
        if let Err(e) = self.drive_phases(&handles).await {
            error!(error = %e, "phase change failed, finishing all load drivers");
            self.broadcast_finished_best_effort(&handles).await;
            first_error = Some(e);
        }

        let mut root = BenchmarkResult::new(BENCHMARK_NAME, self.config.benchmark_time);
        for (index, task) in tasks.into_iter().enumerate() {
            match task.await {
                Ok(Ok(result)) => {
                    self.set_status(index, DriverStatus::Completed).await;
                    root.add_child(result);
                }
                Ok(Err(e)) => {
                    error!(driver = index + 1, error = %e, "load driver failed");
                    self.set_status(index, DriverStatus::Failed(e.to_string())).await;
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(driver = index + 1, error = %e, "load driver task failed");
                    self.set_status(index, DriverStatus::Failed(e.to_string())).await;
                    first_error.get_or_insert(DlBenchError::Worker(format!(
                        "Load driver join failed: {}",
                        e
                    )));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            successful = root.successful(),
            failed = root.failed(),
            tps = %format_tps(root.transactions_per_second()),
            avg_ms = root.average_duration_ms(),
            "benchmark finished"
        );
        Ok(root)
    }

    /// Close every registered driver and unpublish the controller
    pub async fn shutdown(&self) -> Result<()> {
        let mut first_error = None;
        for handle in self.handles().await {
            if let Err(e) = handle.close().await {
                warn!(error = %e, "closing load driver failed");
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.directory.unpublish(BENCHMARK_NAME).await {
            warn!(error = %e, "unpublishing benchmark failed");
            first_error.get_or_insert(e);
        }

        info!("benchmark shut down");
        first_error.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl BenchmarkHandle for BenchmarkController {
    async fn register(&self, driver: Arc<dyn LoadDriverHandle>) -> Result<usize> {
        let mut drivers = self.drivers.write().await;
        if drivers.len() >= self.config.load_drivers {
            warn!(capacity = self.config.load_drivers, "registration rejected");
            return Err(DlBenchError::AlreadyFull {
                capacity: self.config.load_drivers,
            });
        }

        let id = drivers.len() + 1;
        drivers.push(DriverSlot {
            id,
            handle: driver,
            status: DriverStatus::Registered,
        });
        info!(
            id,
            registered = drivers.len(),
            capacity = self.config.load_drivers,
            "load driver registered"
        );
        Ok(id)
    }

    async fn configuration(&self) -> Result<BenchmarkConfig> {
        Ok(self.config.clone())
    }

    async fn log_sink(&self) -> Result<Arc<dyn LogSink>> {
        Ok(self.log_sink.clone())
    }
}
