//! # tb-av
//!
//! External tool plumbing and encode planning for transcode-bench.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe and nvidia-smi.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   termination and structured errors for running external processes.
//! - **Probing** ([`FfprobeProber`]) -- ffprobe JSON into [`tb_core::MediaInfo`].
//! - **Hardware detection** ([`hwaccel`]) -- NVIDIA / Apple Silicon checks.
//! - **Planning** ([`plan()`]) -- crop/scale, duration cap, bitrate and encoder
//!   selection as a pure function.
//! - **Transcoding** ([`Transcoder`], [`FfmpegTranscoder`]) -- one timed
//!   source-to-output conversion.

pub mod command;
pub mod hwaccel;
pub mod plan;
pub mod probe;
pub mod tools;
pub mod transcode;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use hwaccel::detect_capabilities;
pub use plan::{plan, EncodePlan, EncoderProfile, VideoFilter};
pub use probe::FfprobeProber;
pub use tools::{ToolInfo, ToolRegistry};
pub use transcode::{FfmpegTranscoder, Transcoder};
