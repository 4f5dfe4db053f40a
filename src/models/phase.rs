//! Benchmark phases
//!
//! The phase is the shared state the controller pushes to every load driver.
//! Load drivers only ever move themselves from `Init` to `Ready`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Ordered benchmark phases
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Phase {
    /// Constructed, not yet registered
    #[default]
    Init,
    /// Registered and waiting for the run to start
    Ready,
    /// Load is applied, nothing is recorded
    Warmup,
    /// Load is applied and recorded
    Benchmark,
    /// Load is applied, nothing is recorded
    Cooldown,
    /// Terminal; ends execution loops
    Finished,
}

impl Phase {
    /// Phases broadcast by the controller during a run, in order
    pub const RUN_SEQUENCE: [Phase; 4] = [
        Phase::Warmup,
        Phase::Benchmark,
        Phase::Cooldown,
        Phase::Finished,
    ];

    /// Whether statistics are recorded in this phase
    pub fn is_recording(&self) -> bool {
        matches!(self, Phase::Benchmark)
    }

    /// Whether load drivers execute transactions in this phase
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Warmup | Phase::Benchmark | Phase::Cooldown)
    }

    /// Get a human-readable description of the phase
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Ready => "READY",
            Phase::Warmup => "WARMUP",
            Phase::Benchmark => "BENCHMARK",
            Phase::Cooldown => "COOLDOWN",
            Phase::Finished => "FINISHED",
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Init,
            1 => Phase::Ready,
            2 => Phase::Warmup,
            3 => Phase::Benchmark,
            4 => Phase::Cooldown,
            _ => Phase::Finished,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Phase cell shared between the controller (writer) and a load driver loop (reader).
///
/// Reads are last-write-wins; intermediate phases may be skipped by a reader
/// that checks infrequently.
#[derive(Debug)]
pub struct AtomicPhase(AtomicU8);

impl AtomicPhase {
    pub fn new(phase: Phase) -> Self {
        Self(AtomicU8::new(phase.to_u8()))
    }

    pub fn load(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, phase: Phase) {
        self.0.store(phase.to_u8(), Ordering::Release);
    }
}

impl Default for AtomicPhase {
    fn default() -> Self {
        Self::new(Phase::Init)
    }
}
