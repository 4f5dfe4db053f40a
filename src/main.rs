use dlbench::config::persistence::ResultsStorage;
use dlbench::config::BenchmarkConfig;
use dlbench::error::user_friendly_message;
use dlbench::models::RunRecord;
use dlbench::standalone::{default_registry, run_benchmark};
use dlbench::util::logging::{init_tracing, parse_level, FileLogSink};
use dlbench::{DlBenchError, Result, APP_NAME, LOG_DIR};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "Usage: dlbench [config.toml] [--save]
       dlbench --history

Runs the benchmark controller and all configured load drivers in this
process. Without a path the configuration is read from the platform config
directory. --save appends the result to the results history, --history
prints the most recent saved runs.";

const HISTORY_LENGTH: usize = 10;

struct Args {
    config_path: Option<PathBuf>,
    save: bool,
    history: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        config_path: None,
        save: false,
        history: false,
    };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--save" => args.save = true,
            "--history" => args.history = true,
            flag if flag.starts_with('-') => {
                return Err(DlBenchError::Config(format!("Unknown option: {}", flag)))
            }
            _ if args.config_path.is_none() => args.config_path = Some(PathBuf::from(&arg)),
            _ => {
                return Err(DlBenchError::Config(format!(
                    "Unexpected argument: {}",
                    arg
                )))
            }
        }
    }

    Ok(Some(args))
}

async fn run() -> Result<()> {
    let Some(args) = parse_args()? else {
        println!("{}", USAGE);
        return Ok(());
    };

    if args.history {
        let storage = ResultsStorage::new()?;
        for run in storage.recent_runs(HISTORY_LENGTH)? {
            println!("{}", run.summary());
        }
        return Ok(());
    }

    let config = match &args.config_path {
        Some(path) => BenchmarkConfig::load_from(path)?,
        None => BenchmarkConfig::load()?,
    };

    init_tracing(parse_level(&config.log_level)?);
    info!("{} {}", APP_NAME, env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let databases = default_registry(&config)?;
    let log_sink = Arc::new(FileLogSink::in_dir(LOG_DIR)?);
    info!(path = %log_sink.path().display(), "load driver log");

    let result = run_benchmark(config.clone(), &databases, log_sink, true).await?;
    println!("{}", result.render());

    if args.save {
        let storage = ResultsStorage::new()?;
        let record = RunRecord::new(config, result);
        let summary = record.summary();
        storage.append_run(record)?;
        println!("Saved {} to {}", summary, storage.results_path().display());
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", user_friendly_message(&e));
        std::process::exit(1);
    }
}
