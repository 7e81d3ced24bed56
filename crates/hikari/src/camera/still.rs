//! Still capture through an external program
//!
//! Default is ffmpeg reading one frame from a V4L2 device and writing a
//! JPEG to stdout. The device gets a settle delay first: the first frames
//! off a freshly opened sensor are often dark.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, info};

use super::Camera;

/// Still capture configuration
#[derive(Debug, Clone)]
pub struct StillCaptureConfig {
    /// Capture device (V4L2 node)
    pub device: PathBuf,
    /// Settle delay before grabbing
    pub warmup: Duration,
    /// Grabber program
    pub program: String,
    /// Extra arguments placed before the output spec (`-` = stdout)
    pub extra_args: Vec<String>,
}

impl Default for StillCaptureConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video2"),
            warmup: Duration::from_millis(2000),
            program: "ffmpeg".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl StillCaptureConfig {
    /// Full argument list for the grabber.
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "v4l2".to_string(),
            "-i".to_string(),
            self.device.display().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "image2".to_string(),
            "-c:v".to_string(),
            "mjpeg".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push("-".to_string()); // Output to stdout
        args
    }
}

/// Camera backed by an external grabber process
pub struct CommandCamera {
    config: StillCaptureConfig,
}

impl CommandCamera {
    pub fn new(config: StillCaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StillCaptureConfig {
        &self.config
    }
}

#[async_trait]
impl Camera for CommandCamera {
    async fn capture_still(&self) -> Result<Bytes> {
        info!(device = %self.config.device.display(), "Capturing image...");
        tokio::time::sleep(self.config.warmup).await;

        let args = self.config.args();
        debug!("{} args: {:?}", self.config.program, args);

        let output = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}. Is it installed?", self.config.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            );
        }

        if output.stdout.is_empty() {
            anyhow::bail!("{} produced no frame", self.config.program);
        }

        debug!(bytes = output.stdout.len(), "Still captured");
        Ok(Bytes::from(output.stdout))
    }
}
