//! Benchmark result data models
//!
//! A `BenchmarkResult` is a node of the report tree: the controller's root,
//! one child per load driver, one grandchild per transaction type. Attaching
//! a child folds its totals into the parent, so every node always reports
//! its own events plus everything attached below it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

use crate::config::BenchmarkConfig;

/// Mergeable statistics node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Name of the node (benchmark, load driver or transaction)
    name: String,
    /// Committed transactions
    successful: u64,
    /// Transactions that failed with a non-recoverable error
    failed: u64,
    /// Cumulative duration of the successful transactions
    #[serde(with = "duration_serde")]
    duration: Duration,
    /// Configured length of the benchmark phase, the TPS denominator
    #[serde(with = "duration_serde")]
    benchmark_time: Duration,
    /// Attached child results, in attachment order
    children: Vec<BenchmarkResult>,
}

impl BenchmarkResult {
    /// Create an empty result with a fixed benchmark-phase denominator
    pub fn new(name: impl Into<String>, benchmark_time: Duration) -> Self {
        Self {
            name: name.into(),
            successful: 0,
            failed: 0,
            duration: Duration::ZERO,
            benchmark_time,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn successful(&self) -> u64 {
        self.successful
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Cumulative duration of all successful transactions
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn benchmark_time(&self) -> Duration {
        self.benchmark_time
    }

    pub fn children(&self) -> &[BenchmarkResult] {
        &self.children
    }

    /// Record one successful transaction
    pub fn inc_successful(&mut self, duration: Duration) {
        self.successful += 1;
        self.duration += duration;
    }

    /// Record one failed transaction
    pub fn inc_failed(&mut self) {
        self.failed += 1;
    }

    /// Attach a finished child and fold its totals into this node
    pub fn add_child(&mut self, child: BenchmarkResult) {
        self.successful += child.successful;
        self.failed += child.failed;
        self.duration += child.duration;
        self.children.push(child);
    }

    /// Successful transactions recorded directly on this node
    pub fn own_successful(&self) -> u64 {
        self.successful
            .saturating_sub(self.children.iter().map(|c| c.successful).sum::<u64>())
    }

    /// Failed transactions recorded directly on this node
    pub fn own_failed(&self) -> u64 {
        self.failed
            .saturating_sub(self.children.iter().map(|c| c.failed).sum::<u64>())
    }

    /// Duration recorded directly on this node
    pub fn own_duration(&self) -> Duration {
        self.duration
            .saturating_sub(self.children.iter().map(|c| c.duration).sum::<Duration>())
    }

    /// Successful transactions per second of the benchmark phase, rounded down
    pub fn transactions_per_second(&self) -> u64 {
        let secs = self.benchmark_time.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.successful as f64 / secs).floor() as u64
    }

    /// Average duration of a successful transaction in milliseconds
    pub fn average_duration_ms(&self) -> f64 {
        if self.successful == 0 {
            return 0.0;
        }
        self.duration.as_secs_f64() * 1000.0 / self.successful as f64
    }

    /// Get a human-readable summary of this node
    pub fn summary(&self) -> String {
        format!(
            "{} - {} ok - {} failed - {} TPS - {:.3}ms avg",
            self.name,
            self.successful,
            self.failed,
            self.transactions_per_second(),
            self.average_duration_ms()
        )
    }

    /// Render the whole tree, one tab of indentation per level
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_at(&mut out, 0);
        out
    }

    fn render_at(&self, out: &mut String, depth: usize) {
        let tab = "\t".repeat(depth);
        let _ = writeln!(out, "{}Name: {}", tab, self.name);
        let _ = writeln!(out, "{}Successful transactions: {}", tab, self.successful);
        let _ = writeln!(out, "{}Failed transactions: {}", tab, self.failed);
        let _ = writeln!(
            out,
            "{}Transactions per second: {}",
            tab,
            self.transactions_per_second()
        );
        let _ = writeln!(
            out,
            "{}Average transaction duration: {:.6} ms",
            tab,
            self.average_duration_ms()
        );
        for child in &self.children {
            child.render_at(out, depth + 1);
        }
    }
}

/// A finished run as kept in the results history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Timestamp when the run finished
    pub timestamp: DateTime<Utc>,
    /// Configuration used for this run
    pub config: BenchmarkConfig,
    /// Root of the result tree
    pub result: BenchmarkResult,
}

impl RunRecord {
    pub fn new(config: BenchmarkConfig, result: BenchmarkResult) -> Self {
        Self {
            timestamp: Utc::now(),
            config,
            result,
        }
    }

    /// Get a one-line summary of the run
    pub fn summary(&self) -> String {
        format!(
            "{} - {} load drivers - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.result.children().len(),
            self.result.summary()
        )
    }
}

// Durations are stored as nanoseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
