//! Batch orchestration and the batch-size sweep built on top of it.

pub mod harness;
pub mod orchestrator;

pub use harness::{BatchObserver, BatchReport, Benchmark};
pub use orchestrator::BatchRunner;
