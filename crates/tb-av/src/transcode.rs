//! One source-to-output transcode: probe, plan, encode.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tb_core::config::EncodeLimits;
use tb_core::{HwCapabilities, JobResult, Result};

use crate::command::ToolCommand;
use crate::plan::{plan, EncodePlan};
use crate::probe::FfprobeProber;
use crate::tools::ToolRegistry;

/// Something that can turn `source` into `output` and time it.
///
/// Implementations must be safe to share across the tasks of a batch.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Perform one conversion and report the elapsed wall-clock time.
    async fn transcode(&self, source: &Path, output: &Path) -> Result<JobResult>;
}

/// [`Transcoder`] driving ffprobe and ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
    prober: FfprobeProber,
    limits: EncodeLimits,
    hw: HwCapabilities,
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new(
        ffmpeg_path: PathBuf,
        prober: FfprobeProber,
        limits: EncodeLimits,
        hw: HwCapabilities,
    ) -> Self {
        Self {
            ffmpeg_path,
            prober,
            limits,
            hw,
            timeout: None,
        }
    }

    /// Build a transcoder from discovered tools.
    ///
    /// # Errors
    ///
    /// Returns [`tb_core::Error::Configuration`] if ffmpeg or ffprobe is
    /// missing.
    pub fn from_registry(
        tools: &ToolRegistry,
        limits: EncodeLimits,
        hw: HwCapabilities,
        probe_timeout: Duration,
    ) -> Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?.to_path_buf();
        let prober = FfprobeProber::new(tools.require("ffprobe")?.to_path_buf())
            .with_timeout(probe_timeout);
        Ok(Self::new(ffmpeg, prober, limits, hw))
    }

    /// Bound each encode by `timeout` (`None` for no bound).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe `source` and derive its encode plan without encoding.
    pub async fn plan_for(&self, source: &Path) -> Result<EncodePlan> {
        let info = self.prober.probe(source).await?;
        plan(&info, &self.limits, &self.hw)
    }

    /// The ffmpeg command that [`Transcoder::transcode`] would run for `plan`.
    pub fn encode_command(&self, plan: &EncodePlan, source: &Path, output: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.args(plan.ffmpeg_args(source, output));
        cmd.description("Resize");
        cmd.maybe_timeout(self.timeout);
        cmd
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, source: &Path, output: &Path) -> Result<JobResult> {
        let start = Instant::now();

        let plan = self.plan_for(source).await?;
        tracing::debug!(
            "plan for {}: vf={:?} t={:?} b:v={} encoder={}",
            output.display(),
            plan.filter_graph(),
            plan.duration_cap,
            plan.bitrate,
            plan.encoder.accel
        );

        self.encode_command(&plan, source, output).execute().await?;

        let elapsed = start.elapsed();
        tracing::info!(
            "Conversion for {} took {:.2} seconds.",
            output.display(),
            elapsed.as_secs_f64()
        );

        Ok(JobResult {
            output: output.to_path_buf(),
            elapsed,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{fake_ffmpeg, fake_ffprobe, write_script};
    use tb_core::Error;

    fn transcoder(dir: &Path, ffmpeg: PathBuf) -> FfmpegTranscoder {
        let ffprobe = fake_ffprobe(dir, 1920, 1080, "90.0");
        FfmpegTranscoder::new(
            ffmpeg,
            FfprobeProber::new(ffprobe),
            EncodeLimits::default(),
            HwCapabilities::software(),
        )
    }

    #[tokio::test]
    async fn transcode_runs_planned_command() {
        let dir = tempfile::tempdir().unwrap();
        let t = transcoder(dir.path(), fake_ffmpeg(dir.path()));
        let output = dir.path().join("conversion_0.mp4");

        let result = t.transcode(Path::new("input.mp4"), &output).await.unwrap();
        assert_eq!(result.output, output);
        assert!(output.exists());

        let args = std::fs::read_to_string(dir.path().join("conversion_0.mp4.args")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        let vf = args.iter().position(|a| *a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "crop=1080:1080,scale=384:384:flags=fast_bilinear");
        let t_flag = args.iter().position(|a| *a == "-t").unwrap();
        assert_eq!(args[t_flag + 1], "59");
        assert_eq!(args.last().copied(), Some(output.to_str().unwrap()));
        assert!(!args.contains(&"-c:v"));
    }

    #[tokio::test]
    async fn encoder_failure_propagates_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(
            dir.path(),
            "ffmpeg",
            "echo 'Unknown encoder' >&2\nexit 1\n",
        );
        let t = transcoder(dir.path(), ffmpeg);
        let err = t
            .transcode(Path::new("input.mp4"), &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        match err {
            Error::CommandFailed {
                description,
                stderr,
                code,
                command,
                ..
            } => {
                assert_eq!(description, "Resize");
                assert_eq!(stderr.trim(), "Unknown encoder");
                assert_eq!(code, Some(1));
                assert!(command.iter().any(|a| a == "-b:v"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn encode_timeout_surfaces_timed_out() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(dir.path(), "ffmpeg", "exec sleep 10\n");
        let t = transcoder(dir.path(), ffmpeg).with_timeout(Some(Duration::from_millis(200)));
        let err = t
            .transcode(Path::new("input.mp4"), &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::TimedOut { timeout, .. } if timeout == Duration::from_millis(200)),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn plan_for_uses_probe() {
        let dir = tempfile::tempdir().unwrap();
        let t = transcoder(dir.path(), fake_ffmpeg(dir.path()));
        let plan = t.plan_for(Path::new("input.mp4")).await.unwrap();
        assert_eq!(plan.duration_cap, Some(59));
        assert_eq!(plan.filters.len(), 2);
    }

    #[test]
    fn from_registry_requires_both_tools() {
        let only_ffmpeg = ToolRegistry::with_paths([("ffmpeg", PathBuf::from("/bin/true"))]);
        let err = FfmpegTranscoder::from_registry(
            &only_ffmpeg,
            EncodeLimits::default(),
            HwCapabilities::software(),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.to_string().contains("ffprobe"));
    }
}
