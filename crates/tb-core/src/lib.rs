//! tb-core: shared types, errors and configuration for transcode-bench.
//!
//! This crate is the foundational dependency for the other tb-* crates,
//! providing the unified error type, the benchmark configuration, and the
//! media-domain types exchanged between the probe, planner and orchestrator.

pub mod config;
pub mod error;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use media::*;

/// Serde helpers to (de)serialize `Duration` as fractional seconds.
pub mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
