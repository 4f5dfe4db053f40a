//! Benchmark engine module
//!
//! Contains the benchmark controller, the load driver execution loop,
//! transaction units with conflict retry, and the weighted transaction mix.

pub mod controller;
pub mod driver;
pub mod mix;
pub mod params;
pub mod transaction;

// Re-export commonly used types
pub use controller::{BenchmarkController, DriverStatus};
pub use driver::LoadDriver;
pub use mix::TransactionMix;
pub use params::ParameterGenerator;
pub use transaction::TransactionUnit;
