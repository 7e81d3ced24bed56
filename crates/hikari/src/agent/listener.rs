//! Request listener
//!
//! One receive loop per agent. `ban` messages go to ban intake, everything
//! else is a photo request and gets its own pipeline run. Runs are tracked
//! (not awaited) so shutdown can give them a grace period.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::AgentInner;
use crate::message::InboundMessage;
use crate::transport::Incoming;

/// Pause after a transport error before receiving again
const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);

impl AgentInner {
    pub(super) async fn run_listener(self: Arc<Self>) {
        info!("Waiting for requests...");

        loop {
            let incoming = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Listener: shutting down");
                    break;
                }
                incoming = self.channel.recv(self.settings.receive_timeout) => incoming,
            };

            match incoming {
                Ok(Incoming::Message(msg)) => self.dispatch(msg),
                Ok(Incoming::Timeout) => trace!("No request within receive timeout"),
                Ok(Incoming::Closed) => {
                    warn!("Message channel closed, listener stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Receive failed, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        self.listening.store(false, Ordering::SeqCst);
    }

    fn dispatch(self: &Arc<Self>, msg: InboundMessage) {
        if msg.is_ban() {
            debug!(sender = %msg.sender, "Received ban command");
            let agent = Arc::clone(self);
            self.tracker
                .spawn(async move { agent.handle_ban_message(msg).await });
            return;
        }

        let Some(requester) = msg.sender_identity() else {
            warn!(sender = %msg.sender, "Dropping request from unaddressable sender");
            return;
        };

        info!(%requester, "Received camera image request");
        let agent = Arc::clone(self);
        self.tracker.spawn(async move {
            let outcome = agent.run_pipeline(&requester).await;
            debug!(%requester, ?outcome, "Pipeline finished");
        });
    }
}
