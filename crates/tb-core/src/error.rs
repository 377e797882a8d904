//! Unified error type for transcode-bench.
//!
//! Every failure in the probe, plan, job, batch and sweep layers is funnelled
//! into [`Error`]. Variants carry the command line and captured output of the
//! external process involved so the message is actionable on its own.

use std::path::PathBuf;
use std::time::Duration;

/// Unified error type covering all failure modes in transcode-bench.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The probing process exited with a non-zero status.
    #[error("Probe failed for {}: exit code {}: {}", .path.display(), display_code(.code), .stderr.trim())]
    ProbeFailed {
        /// The probed source file.
        path: PathBuf,
        /// Captured standard error of the probe.
        stderr: String,
        /// Exit code, `None` when the probe was killed by a signal.
        code: Option<i32>,
    },

    /// The probe report could not be parsed or lacked a required field.
    #[error("Probe report for {} unusable: {message}", .path.display())]
    ProbeParse {
        /// The probed source file.
        path: PathBuf,
        /// What was wrong with the report.
        message: String,
    },

    /// An external process exited with a non-zero status.
    #[error(
        "{description} failed with exit code {}. Command: {}. stderr: {}. stdout: {}",
        display_code(.code),
        render_command(.command),
        .stderr.trim(),
        .stdout.trim()
    )]
    CommandFailed {
        /// What the command was doing (e.g. "Resize").
        description: String,
        /// Full argument vector, program first.
        command: Vec<String>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
        /// Exit code, `None` when the process was killed by a signal.
        code: Option<i32>,
    },

    /// An external process exceeded its wall-clock budget and was terminated.
    #[error(
        "{description} timed out after {timeout:?}. Command: {}. stderr: {}. stdout: {}",
        render_command(.command),
        .stderr.trim(),
        .stdout.trim()
    )]
    TimedOut {
        /// What the command was doing.
        description: String,
        /// Full argument vector, program first.
        command: Vec<String>,
        /// The configured timeout that elapsed.
        timeout: Duration,
        /// Standard output captured before termination.
        stdout: String,
        /// Standard error captured before termination.
        stderr: String,
    },

    /// Invalid configuration, missing source, missing tool or unavailable
    /// hardware.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The external process could not be started.
    #[error("Failed to spawn {}: {source}", render_command(.command))]
    Spawn {
        /// Full argument vector, program first.
        command: Vec<String>,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors (e.g. a panicked job task).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Convenience constructor for [`Error::ProbeParse`].
    pub fn probe_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::ProbeParse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Render an argument vector as a single human-readable line.
///
/// Arguments containing whitespace or quotes are double-quoted so the line
/// can be copied into a shell for reproduction.
pub fn render_command(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
                format!("{arg:?}")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
