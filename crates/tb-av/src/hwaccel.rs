//! Hardware encoder detection.
//!
//! Reduces the machine to a [`HwCapabilities`] value: whether `nvidia-smi`
//! answers, and whether we run on Apple Silicon.

use std::path::Path;
use std::time::Duration;

use tb_core::{Error, HwCapabilities, Result};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Budget for the `nvidia-smi` query.
const NVIDIA_SMI_TIMEOUT: Duration = Duration::from_secs(5);

/// Banner `nvidia-smi` prints when a driver and GPU respond.
const NVIDIA_SMI_BANNER: &str = "NVIDIA-SMI";

/// Whether `nvidia-smi` runs successfully and reports a GPU.
///
/// Any failure (missing tool, non-zero exit, timeout) counts as "no GPU".
pub async fn detect_nvidia(nvidia_smi: &Path) -> bool {
    let result = ToolCommand::new(nvidia_smi.to_path_buf())
        .description("Checking for NVIDIA GPU")
        .timeout(NVIDIA_SMI_TIMEOUT)
        .execute()
        .await;

    match result {
        Ok(output) => output.text().contains(NVIDIA_SMI_BANNER),
        Err(e) => {
            tracing::debug!("nvidia-smi check failed: {e}");
            false
        }
    }
}

/// Whether this build targets macOS on aarch64.
pub fn is_apple_silicon() -> bool {
    std::env::consts::OS == "macos" && std::env::consts::ARCH == "aarch64"
}

/// Resolve the capabilities to plan with.
///
/// When acceleration is not requested the result is software-only and no
/// probing happens.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when acceleration is requested but no
/// supported hardware is present.
pub async fn detect_capabilities(tools: &ToolRegistry, requested: bool) -> Result<HwCapabilities> {
    if !requested {
        tracing::info!("Running without GPU acceleration");
        return Ok(HwCapabilities::software());
    }

    tracing::info!("Requested GPU acceleration");
    let nvidia = match tools.get("nvidia-smi") {
        Some(path) => detect_nvidia(path).await,
        None => false,
    };
    let caps = HwCapabilities {
        nvidia,
        apple_silicon: is_apple_silicon(),
    };

    if !caps.any() {
        return Err(Error::configuration(
            "GPU acceleration requested but no supported GPU found (need NVIDIA or Apple Silicon)",
        ));
    }

    if caps.nvidia {
        tracing::info!("NVIDIA GPU detected");
    } else {
        tracing::info!("Apple Silicon detected");
    }
    Ok(caps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_requested_is_software_only() {
        let caps = detect_capabilities(&ToolRegistry::default(), false)
            .await
            .unwrap();
        assert_eq!(caps, HwCapabilities::software());
    }

    #[tokio::test]
    async fn missing_nvidia_smi_is_not_a_gpu() {
        assert!(!detect_nvidia(Path::new("nonexistent_nvidia_smi_xyz")).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn banner_in_output_means_gpu() {
        let dir = tempfile::tempdir().unwrap();
        let smi = crate::test_support::write_script(
            dir.path(),
            "nvidia-smi",
            "echo '| NVIDIA-SMI 535.54.03   Driver Version: 535.54.03 |'\n",
        );
        assert!(detect_nvidia(&smi).await);

        let caps = detect_capabilities(&ToolRegistry::with_paths([("nvidia-smi", smi)]), true)
            .await
            .unwrap();
        assert!(caps.nvidia);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_or_silent_nvidia_smi_is_not_a_gpu() {
        let dir = tempfile::tempdir().unwrap();
        let failing = crate::test_support::write_script(
            dir.path(),
            "nvidia-smi-fail",
            "echo 'NVIDIA-SMI has failed' >&2\nexit 9\n",
        );
        assert!(!detect_nvidia(&failing).await);

        let silent = crate::test_support::write_script(dir.path(), "nvidia-smi-quiet", "exit 0\n");
        assert!(!detect_nvidia(&silent).await);
    }

    #[tokio::test]
    async fn requested_without_hardware_is_configuration_error() {
        if is_apple_silicon() {
            return;
        }
        let err = detect_capabilities(&ToolRegistry::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
