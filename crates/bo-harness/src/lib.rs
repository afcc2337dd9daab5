//! # bo-harness
//!
//! Drives an optimization service through the observe/propose loop against a
//! known benchmark objective and checks that the best observation converges
//! to the benchmark's optimum.

pub mod benchmark;
pub mod config;
pub mod convergence;
pub mod harness;
pub mod objective;
pub mod state;

pub use benchmark::Benchmark;
pub use config::HarnessConfig;
pub use convergence::{ConvergenceCriteria, ConvergenceError, ConvergenceReport};
pub use harness::{HarnessEvent, HarnessPhase, LoopOptions, OptimizationLoop, RunOutcome, Termination};
pub use objective::{branin, forrester, FnObjective, Objective};
pub use state::{ObjectiveDirection, RunState};
