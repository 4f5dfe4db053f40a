//! Results persistence module
//!
//! Handles saving, loading, and rotation of finished benchmark runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::models::result::RunRecord;
use crate::{DlBenchError, Result, APP_NAME, MAX_RESULTS_HISTORY, RESULTS_FILE};

/// Results storage manager
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// Results file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    runs: Vec<RunRecord>,
}

impl ResultsStorage {
    /// Create a results storage manager at the standard location
    pub fn new() -> Result<Self> {
        let results_path = Self::results_file_path()?;
        Ok(Self { results_path })
    }

    /// Create a results storage manager backed by the given file
    pub fn at(results_path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: results_path.into(),
        }
    }

    /// Get the standard results file path
    /// Uses $DATA_HOME/dlbench/results.json
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            DlBenchError::Config("Unable to determine data directory".to_string())
        })?;

        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// Load all runs from the results file
    pub fn load_runs(&self) -> Result<Vec<RunRecord>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path).map_err(|e| {
            DlBenchError::Persistence(format!(
                "Failed to read results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        let results_file: ResultsFile = serde_json::from_str(&content).map_err(|e| {
            DlBenchError::Persistence(format!(
                "Failed to parse results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(results_file.runs)
    }

    /// Append a finished run, keeping only the most recent `MAX_RESULTS_HISTORY`
    pub fn append_run(&self, run: RunRecord) -> Result<()> {
        let mut runs = self.load_runs()?;
        runs.push(run);

        if runs.len() > MAX_RESULTS_HISTORY {
            let skip_count = runs.len() - MAX_RESULTS_HISTORY;
            runs.drain(..skip_count);
        }

        self.save_runs(runs)
    }

    fn save_runs(&self, runs: Vec<RunRecord>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DlBenchError::Persistence(format!(
                    "Failed to create results directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let results_file = ResultsFile { version: 1, runs };
        let content = serde_json::to_string_pretty(&results_file)?;

        fs::write(&self.results_path, content).map_err(|e| {
            DlBenchError::Persistence(format!(
                "Failed to write results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the most recent N runs, oldest first
    pub fn recent_runs(&self, count: usize) -> Result<Vec<RunRecord>> {
        let mut runs = self.load_runs()?;
        if runs.len() > count {
            runs.drain(..runs.len() - count);
        }
        Ok(runs)
    }

    pub fn results_path(&self) -> &PathBuf {
        &self.results_path
    }
}
