//! Media-domain types shared by the probe, planner and orchestrator layers.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MediaInfo
// ---------------------------------------------------------------------------

/// Normalized snapshot of one probed source file.
///
/// When the source carries several video streams the last one wins; audio
/// stream bitrates are summed. See the ffprobe prober for the exact rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Width in pixels of the (last) video stream.
    pub width: u32,
    /// Height in pixels of the (last) video stream.
    pub height: u32,
    /// Video codec identifier as reported by the probe (e.g. "h264").
    pub video_codec: Option<String>,
    /// Codec identifier of the last audio stream.
    pub audio_codec: Option<String>,
    /// Average frame rate in frames per second.
    pub frame_rate: Option<f64>,
    /// Video bitrate in bits/sec, if the container reports one.
    pub video_bitrate: Option<i64>,
    /// Sum of audio stream bitrates in bits/sec.
    pub audio_bitrate: Option<i64>,
    /// Container duration in seconds, always > 0.
    pub duration: f64,
}

impl MediaInfo {
    /// Whether the frame is already square.
    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Length of the shorter side.
    pub fn min_side(&self) -> u32 {
        self.width.min(self.height)
    }
}

// ---------------------------------------------------------------------------
// Hardware acceleration
// ---------------------------------------------------------------------------

/// Hardware encoders reachable on this machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwCapabilities {
    /// A dedicated NVIDIA GPU answered `nvidia-smi`.
    pub nvidia: bool,
    /// Running on macOS / aarch64 with VideoToolbox.
    pub apple_silicon: bool,
}

impl HwCapabilities {
    /// Capabilities of a software-only run.
    pub const fn software() -> Self {
        Self {
            nvidia: false,
            apple_silicon: false,
        }
    }

    /// Pick the accelerator to use, dedicated GPU first.
    pub fn select(&self) -> HwAccel {
        if self.nvidia {
            HwAccel::Nvenc
        } else if self.apple_silicon {
            HwAccel::VideoToolbox
        } else {
            HwAccel::Software
        }
    }

    /// Whether any hardware encoder is present.
    pub fn any(&self) -> bool {
        self.nvidia || self.apple_silicon
    }
}

/// The accelerator chosen for an encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    Nvenc,
    VideoToolbox,
    Software,
}

impl fmt::Display for HwAccel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvenc => write!(f, "nvenc"),
            Self::VideoToolbox => write!(f, "videotoolbox"),
            Self::Software => write!(f, "software"),
        }
    }
}

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// Outcome of one successful transcode job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// The file the job wrote.
    pub output: PathBuf,
    /// Wall-clock time from job entry (including probe) to completion.
    #[serde(with = "crate::duration_secs_f64")]
    pub elapsed: Duration,
}
