//! Data models module
//!
//! Contains the benchmark phase state and the hierarchical result tree.

pub mod phase;
pub mod result;

// Re-export commonly used types
pub use phase::{AtomicPhase, Phase};
pub use result::{BenchmarkResult, RunRecord};
