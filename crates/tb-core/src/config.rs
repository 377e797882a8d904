//! Benchmark configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! sweep settings, the encode limits and tool overrides. Every section
//! defaults sensibly so a completely empty `{}` file is valid, and these
//! defaults are the only place the benchmark's constants live.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root benchmark configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bench: BenchConfig,
    pub limits: EncodeLimits,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Configuration(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error: running a
    /// benchmark with silently different limits would skew the numbers.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Return a list of problems that make the configuration unusable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.limits.validate();

        if self.bench.batch_sizes.is_empty() {
            problems.push("bench.batch_sizes is empty".into());
        }
        if self.bench.batch_sizes.iter().any(|&n| n == 0) {
            problems.push("bench.batch_sizes contains 0".into());
        }
        if self.bench.output_prefix.is_empty() {
            problems.push("bench.output_prefix is empty".into());
        }
        if self.bench.output_prefix.contains(['/', '\\']) {
            problems.push(format!(
                "bench.output_prefix '{}' must be a file name prefix, not a path",
                self.bench.output_prefix
            ));
        }
        if self.bench.job_timeout_secs == Some(0) {
            problems.push("bench.job_timeout_secs is 0".into());
        }
        if self.bench.probe_timeout_secs == 0 {
            problems.push("bench.probe_timeout_secs is 0".into());
        }

        problems
    }

    /// Fail with [`Error::Configuration`] listing every problem found by
    /// [`Config::validate`].
    pub fn ensure_valid(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(problems.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Sweep settings: what to encode, where, and how many at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Source video every job encodes.
    pub input: PathBuf,
    /// Directory receiving the per-job outputs.
    pub output_dir: PathBuf,
    /// File name prefix; job `i` writes `<output_dir>/<prefix>_<i>.mp4`.
    pub output_prefix: String,
    /// Batch sizes run in order, one batch after the other.
    pub batch_sizes: Vec<usize>,
    /// Upper bound on simultaneously running jobs. `0` means CPU count.
    pub max_concurrency: usize,
    /// Per-job encode timeout. `None` lets encodes run unbounded.
    pub job_timeout_secs: Option<u64>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Request hardware acceleration.
    pub hw_accel: bool,
}

fn default_probe_timeout() -> u64 {
    30
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input.mp4"),
            output_dir: PathBuf::from("output"),
            output_prefix: "conversion".into(),
            batch_sizes: vec![
                2, 5, 8, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120,
            ],
            max_concurrency: 0,
            job_timeout_secs: None,
            probe_timeout_secs: default_probe_timeout(),
            hw_accel: false,
        }
    }
}

impl BenchConfig {
    /// Resolve `max_concurrency`, mapping `0` to the number of CPUs.
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency == 0 {
            num_cpus::get().max(1)
        } else {
            self.max_concurrency
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Size and dimension budget every encode plan is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeLimits {
    /// Maximum output side length in pixels.
    pub dimension_limit: u32,
    /// Output size budget in bytes.
    pub size_limit: u64,
    /// Maximum source duration in seconds before the output is truncated.
    pub duration_limit: u32,
    /// Safety margin subtracted from the size-derived bitrate, in percent.
    pub bitrate_margin_percent: u32,
    /// Hard cap on the video bitrate in bits/sec.
    pub recommended_bitrate: i64,
}

impl Default for EncodeLimits {
    fn default() -> Self {
        Self {
            dimension_limit: 384,
            size_limit: 8_389_000,
            duration_limit: 60,
            bitrate_margin_percent: 2,
            recommended_bitrate: 2_000_000,
        }
    }
}

impl EncodeLimits {
    /// Return problems that would make plan derivation undefined.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.dimension_limit == 0 {
            problems.push("limits.dimension_limit is 0".into());
        }
        if self.size_limit == 0 {
            problems.push("limits.size_limit is 0".into());
        }
        // The cap truncates to `duration_limit - 1`, which must stay positive.
        if self.duration_limit < 2 {
            problems.push(format!(
                "limits.duration_limit must be at least 2 seconds, got {}",
                self.duration_limit
            ));
        }
        if self.bitrate_margin_percent >= 100 {
            problems.push(format!(
                "limits.bitrate_margin_percent must be below 100, got {}",
                self.bitrate_margin_percent
            ));
        }
        if self.recommended_bitrate <= 0 {
            problems.push("limits.recommended_bitrate must be positive".into());
        }

        problems
    }
}

/// Paths to external CLI tools. Unset entries are looked up on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub nvidia_smi_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_benchmark_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.bench.input, PathBuf::from("input.mp4"));
        assert_eq!(cfg.bench.output_dir, PathBuf::from("output"));
        assert_eq!(cfg.bench.batch_sizes.first(), Some(&2));
        assert_eq!(cfg.bench.batch_sizes.last(), Some(&120));
        assert_eq!(cfg.limits.dimension_limit, 384);
        assert_eq!(cfg.limits.size_limit, 8_389_000);
        assert_eq!(cfg.limits.duration_limit, 60);
        assert_eq!(cfg.limits.bitrate_margin_percent, 2);
        assert_eq!(cfg.limits.recommended_bitrate, 2_000_000);
        assert!(cfg.bench.job_timeout().is_none());
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_empty(), "unexpected: {:?}", cfg.validate());
        assert!(cfg.ensure_valid().is_ok());
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.limits.dimension_limit, 384);
        assert_eq!(cfg.bench.probe_timeout_secs, 30);
    }

    #[test]
    fn parse_partial_json() {
        let json = r#"{"limits": {"dimension_limit": 720}, "bench": {"batch_sizes": [1, 4]}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.limits.dimension_limit, 720);
        assert_eq!(cfg.limits.duration_limit, 60);
        assert_eq!(cfg.bench.batch_sizes, vec![1, 4]);
    }

    #[test]
    fn malformed_json_is_configuration_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = Config::load_or_default(None).unwrap();
        assert_eq!(cfg.limits.size_limit, 8_389_000);
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/bench.json"))).unwrap();
        assert_eq!(cfg.limits.size_limit, 8_389_000);
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(&path, r#"{"bench": {"max_concurrency": 3}}"#).unwrap();
        let cfg = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(cfg.bench.max_concurrency, 3);
        assert_eq!(cfg.bench.effective_concurrency(), 3);
    }

    #[test]
    fn zero_concurrency_means_cpu_count() {
        let cfg = BenchConfig::default();
        assert!(cfg.effective_concurrency() >= 1);
    }

    #[test]
    fn short_duration_limit_rejected() {
        let mut cfg = Config::default();
        cfg.limits.duration_limit = 1;
        let problems = cfg.validate();
        assert!(problems.iter().any(|p| p.contains("duration_limit")));
        assert!(cfg.ensure_valid().is_err());
    }

    #[test]
    fn full_margin_rejected() {
        let mut limits = EncodeLimits::default();
        limits.bitrate_margin_percent = 100;
        assert!(limits.validate().iter().any(|p| p.contains("margin")));
    }

    #[test]
    fn empty_and_zero_batches_rejected() {
        let mut cfg = Config::default();
        cfg.bench.batch_sizes = vec![];
        assert!(cfg.validate().iter().any(|p| p.contains("empty")));
        cfg.bench.batch_sizes = vec![2, 0];
        assert!(cfg.validate().iter().any(|p| p.contains("contains 0")));
    }

    #[test]
    fn prefix_must_not_be_a_path() {
        let mut cfg = Config::default();
        cfg.bench.output_prefix = "out/run".into();
        assert!(cfg.validate().iter().any(|p| p.contains("output_prefix")));
    }
}
