//! Still capture
//!
//! The agent needs exactly one thing from the camera: one encoded still
//! (JPEG bytes) or a failure.
//! - [`CommandCamera`]: spawns an external grabber (ffmpeg by default)
//! - [`TestCamera`]: synthetic frames, no hardware (`test-source` feature)

mod still;

pub use still::{CommandCamera, StillCaptureConfig};

#[cfg(feature = "test-source")]
mod test_source;
#[cfg(feature = "test-source")]
pub use test_source::TestCamera;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;

/// Produces one still image per call.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Grab one frame, encoded (JPEG). May take seconds.
    async fn capture_still(&self) -> Result<Bytes>;
}

/// Encode a captured still for a text message body.
pub fn encode_still(image: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(image)
}
