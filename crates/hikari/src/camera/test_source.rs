//! Synthetic camera for development without hardware

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::Camera;

/// Returns fake JPEG-framed stills after a fixed delay.
pub struct TestCamera {
    delay: Duration,
    frame_size: usize,
    frames: AtomicU32,
}

impl TestCamera {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            frame_size: 4096,
            frames: AtomicU32::new(0),
        }
    }

    pub fn frames_captured(&self) -> u32 {
        self.frames.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Camera for TestCamera {
    async fn capture_still(&self) -> Result<Bytes> {
        tokio::time::sleep(self.delay).await;
        let frame_num = self.frames.fetch_add(1, Ordering::Relaxed);

        // SOI marker, counter pattern, EOI marker
        let mut data = Vec::with_capacity(self.frame_size);
        data.extend_from_slice(&[0xFF, 0xD8]);
        data.extend_from_slice(&frame_num.to_be_bytes());
        while data.len() < self.frame_size - 2 {
            data.push((frame_num & 0xFF) as u8);
        }
        data.extend_from_slice(&[0xFF, 0xD9]);

        debug!(frame = frame_num, "Test still generated");
        Ok(Bytes::from(data))
    }
}
