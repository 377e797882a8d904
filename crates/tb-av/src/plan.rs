//! Encode parameter planning.
//!
//! [`plan`] turns probed metadata, the size/dimension budget and the
//! available hardware into an [`EncodePlan`]: which filters to apply, whether
//! to truncate, what video bitrate to target and which encoder to use. It is
//! pure and deterministic; the ffmpeg argument vector is rendered from the
//! plan by [`EncodePlan::ffmpeg_args`].

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tb_core::config::EncodeLimits;
use tb_core::{Error, HwAccel, HwCapabilities, MediaInfo, Result};

/// Audio bitrate assumed when the source does not report one.
pub const FALLBACK_AUDIO_BITRATE: i64 = 320;

/// Bytes-to-bits factor of the size budget (1 MiB / 1 MB).
const MIB_PER_MB: f64 = 1.048576;

/// One step of the `-vf` filter graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "filter", rename_all = "lowercase")]
pub enum VideoFilter {
    /// Centered crop to `width`x`height`.
    Crop { width: u32, height: u32 },
    /// Resize to `width`x`height` with fast bilinear resampling.
    Scale { width: u32, height: u32 },
}

impl fmt::Display for VideoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crop { width, height } => write!(f, "crop={width}:{height}"),
            Self::Scale { width, height } => {
                write!(f, "scale={width}:{height}:flags=fast_bilinear")
            }
        }
    }
}

/// Encoder choice: decoder hint, encoder codec and speed preset travel
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderProfile {
    pub accel: HwAccel,
    /// Flags placed before `-i`.
    pub hwaccel_args: Vec<&'static str>,
    /// `-c:v` value; `None` leaves ffmpeg's default software encoder.
    pub codec: Option<&'static str>,
    pub preset: &'static str,
}

impl EncoderProfile {
    /// Resolve the profile for an accelerator.
    pub fn for_accel(accel: HwAccel) -> Self {
        match accel {
            HwAccel::Nvenc => Self {
                accel,
                hwaccel_args: vec!["-hwaccel", "cuda"],
                codec: Some("h264_nvenc"),
                // p1..p7 for NVENC, lower is faster.
                preset: "p1",
            },
            HwAccel::VideoToolbox => Self {
                accel,
                hwaccel_args: vec!["-hwaccel", "videotoolbox"],
                codec: Some("h264_videotoolbox"),
                preset: "superfast",
            },
            HwAccel::Software => Self {
                accel,
                hwaccel_args: Vec::new(),
                codec: None,
                preset: "superfast",
            },
        }
    }
}

/// Fully resolved parameters for one transcode job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodePlan {
    /// Filters in application order; crop always precedes scale.
    pub filters: Vec<VideoFilter>,
    /// Output truncation in whole seconds (`-t`).
    pub duration_cap: Option<u32>,
    /// Duration the bitrate was derived from, in seconds.
    pub effective_duration: f64,
    /// Budget-derived bitrate before the source/cap clamps.
    pub target_bitrate: i64,
    /// Video bitrate in bits/sec handed to `-b:v`. May be negative when the
    /// audio bitrate alone exceeds the size budget.
    pub bitrate: i64,
    pub encoder: EncoderProfile,
}

impl EncodePlan {
    /// The `-vf` argument, if any filter is planned.
    pub fn filter_graph(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        Some(
            self.filters
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Render the ffmpeg argument vector (program excluded).
    ///
    /// Order: global flags, hwaccel flags, input, preset, stream-disable
    /// flags, filter graph, duration cap, bitrate, encoder codec, output.
    pub fn ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];
        args.extend(self.encoder.hwaccel_args.iter().map(|a| a.to_string()));
        args.push("-i".into());
        args.push(input.to_string_lossy().to_string());
        args.extend(["-preset".into(), self.encoder.preset.to_string()]);
        args.extend(["-sn".into(), "-dn".into()]);
        if let Some(graph) = self.filter_graph() {
            args.extend(["-vf".into(), graph]);
        }
        if let Some(cap) = self.duration_cap {
            args.extend(["-t".into(), cap.to_string()]);
        }
        args.extend(["-b:v".into(), self.bitrate.to_string()]);
        if let Some(codec) = self.encoder.codec {
            args.extend(["-c:v".into(), codec.to_string()]);
        }
        args.push(output.to_string_lossy().to_string());
        args
    }
}

/// Derive the encode plan for one source.
///
/// # Errors
///
/// Returns [`Error::Configuration`] only when the duration the bitrate is
/// derived from is not a positive finite number; every other input is taken
/// as validated by the caller.
pub fn plan(info: &MediaInfo, limits: &EncodeLimits, hw: &HwCapabilities) -> Result<EncodePlan> {
    let filters = plan_filters(info, limits.dimension_limit);

    let (duration_cap, effective_duration) = if info.duration > f64::from(limits.duration_limit) {
        let capped = limits.duration_limit.saturating_sub(1);
        (Some(capped), f64::from(capped))
    } else {
        (None, info.duration)
    };

    if !(effective_duration.is_finite() && effective_duration > 0.0) {
        return Err(Error::Configuration(format!(
            "cannot derive a bitrate from a duration of {effective_duration}s"
        )));
    }

    let target_bitrate = target_bitrate(
        limits.size_limit,
        limits.bitrate_margin_percent,
        effective_duration,
        info.audio_bitrate,
    );
    let bitrate = info
        .video_bitrate
        .unwrap_or(target_bitrate)
        .min(target_bitrate)
        .min(limits.recommended_bitrate);

    if bitrate <= 0 {
        tracing::warn!(
            "planned video bitrate {bitrate} is not positive (audio {:?} exceeds the size budget)",
            info.audio_bitrate
        );
    }

    Ok(EncodePlan {
        filters,
        duration_cap,
        effective_duration,
        target_bitrate,
        bitrate,
        encoder: EncoderProfile::for_accel(hw.select()),
    })
}

/// Crop non-square frames to their shorter side, then scale down to the
/// dimension limit if still too large.
fn plan_filters(info: &MediaInfo, limit: u32) -> Vec<VideoFilter> {
    let mut filters = Vec::with_capacity(2);
    let scale = VideoFilter::Scale {
        width: limit,
        height: limit,
    };

    if !info.is_square() {
        let side = info.min_side();
        filters.push(VideoFilter::Crop {
            width: side,
            height: side,
        });
        if side > limit {
            filters.push(scale);
        }
    } else if info.width > limit || info.height > limit {
        filters.push(scale);
    }

    filters
}

/// Video bits/sec that fit `size_limit` bytes over `duration` seconds after
/// reserving the margin and the audio bitrate.
fn target_bitrate(size_limit: u64, margin_percent: u32, duration: f64, audio: Option<i64>) -> i64 {
    let usable = (100.0 - f64::from(margin_percent)) / 100.0;
    let budget = size_limit as f64 * 8.0 / MIB_PER_MB * usable / duration;
    // The cast truncates toward zero and saturates; so does the subtraction.
    (budget as i64).saturating_sub(audio.unwrap_or(FALLBACK_AUDIO_BITRATE))
}
