//! Capture pipeline: one photo request, start to finish
//!
//! The whole run holds the camera slot up to the commit, so a queued run
//! only checks after the previous run's cooldown is written.
//!
//! 1. under the gate: sample `now`, check the requester's cooldown
//! 2. grab a still (gate released, so a ban can land meanwhile)
//! 3. encode
//! 4. under the gate: re-check with the same `now`, then write the
//!    request cooldown
//! 5. release the slot, send the photo
//!
//! The re-check is what turns a ban issued mid-capture into a cancelled
//! delivery instead of a photo.

use tracing::{debug, info, warn};

use super::{AgentInner, AtomicAgentStats};
use crate::camera::encode_still;
use crate::identity::Identity;
use crate::message::OutboundMessage;

/// Body of the notice sent instead of a photo
pub const CANCELLED_NOTICE: &str = "Request cancelled due to throttle/ban";

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Photo delivered; `bytes` is the raw still size
    Sent { bytes: usize },
    /// Cooldown or ban active at the first check; no capture attempted
    Throttled,
    /// Ban (or another run's cooldown) landed while capturing
    CancelledMidCapture,
    /// Camera produced nothing; nothing sent
    CaptureFailed,
    /// Photo committed but the transport refused it
    SendFailed,
}

impl AgentInner {
    pub(super) async fn run_pipeline(&self, requester: &Identity) -> PipelineOutcome {
        AtomicAgentStats::bump(&self.stats.requests_received);

        let slot = self.capture_slot.lock().await;

        let gate = self.gate.acquire().await;
        let now = self.clock.now_ms();
        if !self.store.is_elapsed(requester, now) {
            drop(gate);
            drop(slot);
            info!(%requester, "Request under timeout, cancelling");
            AtomicAgentStats::bump(&self.stats.requests_throttled);
            self.send_cancelled(requester).await;
            return PipelineOutcome::Throttled;
        }
        drop(gate);

        debug!(%requester, "Capturing image...");
        let image = match self.camera.capture_still().await {
            Ok(image) => image,
            Err(e) => {
                drop(slot);
                warn!(%requester, error = %e, "Failed to capture image");
                AtomicAgentStats::bump(&self.stats.capture_failures);
                return PipelineOutcome::CaptureFailed;
            }
        };

        let encoded = encode_still(&image);

        {
            let gate = self.gate.acquire().await;
            if !self.store.is_elapsed(requester, now) {
                drop(gate);
                drop(slot);
                info!(%requester, "Requester throttled during capture, photo suppressed");
                AtomicAgentStats::bump(&self.stats.cancelled_mid_capture);
                self.send_cancelled(requester).await;
                return PipelineOutcome::CancelledMidCapture;
            }
            self.store
                .write(requester, now, self.settings.throttle.request_cooldown_ms);
        }
        drop(slot);

        match self
            .channel
            .send(OutboundMessage::photo(requester.clone(), encoded))
            .await
        {
            Ok(()) => {
                info!(%requester, bytes = image.len(), "Photo sent");
                AtomicAgentStats::bump(&self.stats.photos_sent);
                PipelineOutcome::Sent { bytes: image.len() }
            }
            Err(e) => {
                warn!(%requester, error = %e, "Failed to send photo");
                AtomicAgentStats::bump(&self.stats.send_failures);
                PipelineOutcome::SendFailed
            }
        }
    }

    async fn send_cancelled(&self, requester: &Identity) {
        let notice = OutboundMessage::cancelled(requester.clone(), CANCELLED_NOTICE);
        if let Err(e) = self.channel.send(notice).await {
            warn!(%requester, error = %e, "Failed to send cancellation notice");
            AtomicAgentStats::bump(&self.stats.send_failures);
        }
    }
}
