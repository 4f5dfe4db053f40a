//! Single-process deployment: the controller and all load drivers share one
//! runtime and talk through a `LocalDirectory`.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bench::{BenchmarkController, LoadDriver};
use crate::config::BenchmarkConfig;
use crate::db::{BankStore, DatabaseRegistry};
use crate::models::{BenchmarkResult, Phase};
use crate::remote::{Directory, LocalDirectory};
use crate::util::logging::LogSink;
use crate::{DlBenchError, Result};

/// Interval at which admission is polled
pub const ADMISSION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Registry with every bundled database. The bank tables are created here,
/// sized by the `n` database parameter (default 1).
pub fn default_registry(config: &BenchmarkConfig) -> Result<DatabaseRegistry> {
    let mut registry = DatabaseRegistry::with_builtin();

    if config.database.kind == "bank" {
        let scale = match config.user("n") {
            Some(n) => n.trim().parse::<usize>().map_err(|_| {
                DlBenchError::Config(format!("Invalid bank scale factor: {}", n))
            })?,
            None => 1,
        };
        info!(scale, "initializing bank tables");
        registry.register_bank(Arc::new(BankStore::initialize(scale)));
    }

    Ok(registry)
}

/// Start the controller and `load_drivers` drivers, run the benchmark and
/// shut everything down again
pub async fn run_benchmark(
    config: BenchmarkConfig,
    databases: &DatabaseRegistry,
    log_sink: Arc<dyn LogSink>,
    show_progress: bool,
) -> Result<BenchmarkResult> {
    let directory: Arc<dyn Directory> = Arc::new(LocalDirectory::new());
    let controller = BenchmarkController::start(config.clone(), directory.clone(), log_sink).await?;

    for _ in 0..config.load_drivers {
        if let Err(e) = LoadDriver::connect(directory.as_ref(), databases).await {
            return Err(abort_startup(&controller, e).await);
        }
    }

    if let Err(e) = controller.wait_for_admission(ADMISSION_POLL_INTERVAL).await {
        return Err(abort_startup(&controller, e).await);
    }

    let progress = show_progress.then(|| spawn_progress(&config, controller.subscribe_phase()));

    let outcome = controller.run().await;

    if let Some(progress) = progress {
        progress.await.ok();
    }

    let shutdown = controller.shutdown().await;
    let result = outcome?;
    shutdown?;
    Ok(result)
}

/// Shut the controller down after a failed startup; the startup error wins
async fn abort_startup(controller: &BenchmarkController, error: DlBenchError) -> DlBenchError {
    if let Err(e) = controller.shutdown().await {
        warn!(error = %e, "shutdown after failed startup failed");
    }
    error
}

/// Progress bar over the whole run, labelled with the current phase
fn spawn_progress(config: &BenchmarkConfig, mut phases: watch::Receiver<Phase>) -> JoinHandle<()> {
    let total = config.warmup_time + config.benchmark_time + config.cooldown_time;
    let pb = ProgressBar::new(total.as_millis() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    tokio::spawn(async move {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_millis(200));

        loop {
            tokio::select! {
                changed = phases.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let phase = *phases.borrow();
                    pb.set_message(phase.description());
                    if phase == Phase::Finished {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    pb.set_position(started.elapsed().as_millis() as u64);
                }
            }
        }
        pb.finish_with_message(Phase::Finished.description());
    })
}
