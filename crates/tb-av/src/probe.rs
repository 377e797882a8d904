//! FFprobe-based media probing.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_streams -show_format`
//! and folds the JSON report into a [`tb_core::MediaInfo`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tb_core::{Error, MediaInfo, Result};

use crate::command::ToolCommand;

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
    timeout: Option<Duration>,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self {
            ffprobe_path,
            timeout: None,
        }
    }

    /// Bound every probe by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Probe `path` and normalize the report.
    ///
    /// # Errors
    ///
    /// - [`Error::ProbeFailed`] if ffprobe exits with a non-zero status.
    /// - [`Error::ProbeParse`] if the report is not JSON, has no positive
    ///   numeric duration, or has no usable video stream.
    /// - [`Error::TimedOut`] / [`Error::Spawn`] from the command runner.
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        cmd.description("Probe");
        cmd.maybe_timeout(self.timeout);

        let output = match cmd.execute().await {
            Ok(output) => output,
            Err(Error::CommandFailed { stderr, code, .. }) => {
                return Err(Error::ProbeFailed {
                    path: path.to_path_buf(),
                    stderr,
                    code,
                });
            }
            Err(e) => return Err(e),
        };

        parse_ffprobe_output(path, &output.stdout)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    /// Seconds, as a string in practice but accepted as a number too.
    duration: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    bit_rate: Option<Value>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Fold an ffprobe JSON report into a [`MediaInfo`].
///
/// Video streams overwrite each other, so the last one wins. Its bitrate only
/// replaces the stored one when it reports one. Audio bitrates are summed; a
/// stream without a bitrate adds zero to an existing total but never starts
/// one.
pub fn parse_ffprobe_output(path: &Path, json: &str) -> Result<MediaInfo> {
    let report: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::probe_parse(path, format!("ffprobe JSON parse error: {e}")))?;

    let mut video: Option<(u32, u32)> = None;
    let mut video_codec = None;
    let mut frame_rate = None;
    let mut video_bitrate = None;
    let mut audio_codec = None;
    let mut audio_bitrate: Option<i64> = None;
    let mut video_streams = 0usize;

    for stream in report.streams {
        match stream.codec_type.as_deref() {
            Some("video") => {
                video_streams += 1;
                let (Some(width), Some(height)) = (stream.width, stream.height) else {
                    return Err(Error::probe_parse(
                        path,
                        "video stream is missing width or height",
                    ));
                };
                video = Some((width, height));
                video_codec = stream.codec_name;
                frame_rate = stream.avg_frame_rate.as_deref().and_then(parse_frame_rate);
                if let Some(bitrate) = parse_bit_rate(path, stream.bit_rate.as_ref())? {
                    video_bitrate = Some(bitrate);
                }
            }
            Some("audio") => {
                audio_codec = stream.codec_name;
                let bitrate = parse_bit_rate(path, stream.bit_rate.as_ref())?;
                audio_bitrate = match audio_bitrate {
                    Some(total) => Some(
                        total
                            .checked_add(bitrate.unwrap_or(0))
                            .ok_or_else(|| Error::probe_parse(path, "audio bit_rate total overflows"))?,
                    ),
                    None => bitrate,
                };
            }
            _ => {}
        }
    }

    if video_streams > 1 {
        tracing::debug!(
            "{} has {video_streams} video streams; using the last one",
            path.display()
        );
    }

    let Some((width, height)) = video else {
        return Err(Error::probe_parse(path, "no video stream found"));
    };

    let duration = report
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| Error::probe_parse(path, "format.duration is missing"))?;
    let duration = match numeric(&duration) {
        Some(secs) if secs.is_finite() && secs > 0.0 => secs,
        _ => {
            return Err(Error::probe_parse(
                path,
                format!("format.duration is not a positive number: {duration}"),
            ))
        }
    };

    Ok(MediaInfo {
        width,
        height,
        video_codec,
        audio_codec,
        frame_rate,
        video_bitrate,
        audio_bitrate,
        duration,
    })
}

/// Interpret a JSON string or number as `f64`.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `bit_rate` is optional; ffprobe also prints `N/A` when it cannot tell.
/// Negative values are rejected.
fn parse_bit_rate(path: &Path, value: Option<&Value>) -> Result<Option<i64>> {
    let bitrate = match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s == "N/A" => Ok(None),
        Some(Value::Number(n)) if n.is_i64() => Ok(n.as_i64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::probe_parse(path, format!("bit_rate is not an integer: {s:?}"))),
        Some(other) => Err(Error::probe_parse(
            path,
            format!("bit_rate is not an integer: {other}"),
        )),
    }?;

    match bitrate {
        Some(b) if b < 0 => Err(Error::probe_parse(
            path,
            format!("bit_rate is negative: {b}"),
        )),
        _ => Ok(bitrate),
    }
}

fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    if let Some((num, den)) = rate_str.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }
    rate_str.parse().ok()
}
