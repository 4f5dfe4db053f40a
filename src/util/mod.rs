//! Utility functions module
//!
//! Contains helpers for duration parsing/formatting and the log
//! forwarding sinks.

pub mod logging;
pub mod units;

// Re-export commonly used functions
pub use logging::{FileLogSink, LogRecord, LogSink, MemoryLogSink};
pub use units::{format_duration, format_tps, parse_duration};
