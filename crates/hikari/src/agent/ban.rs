//! Ban intake
//!
//! Both entry points (a `ban` message, the admin endpoint) end up in
//! [`AgentInner::apply_ban`]: wait for the gate, then write the long
//! cooldown while holding it. Holding the gate is what keeps an in-flight
//! pipeline from overwriting the ban with its own, older request cooldown.

use tracing::{info, warn};

use super::{AgentInner, AtomicAgentStats};
use crate::error::BanError;
use crate::identity::Identity;
use crate::message::{InboundMessage, OutboundMessage};

/// A ban that has been written to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanOutcome {
    pub target: Identity,
    pub duration_ms: u64,
    pub applied_at_ms: u64,
}

impl AgentInner {
    pub(super) async fn apply_ban(&self, raw_target: &str) -> Result<BanOutcome, BanError> {
        let target = Identity::parse(raw_target).ok_or(BanError::InvalidTarget)?;

        if self.cancel.is_cancelled() {
            return Err(BanError::ShuttingDown);
        }

        let timeout = self.settings.ban_gate_timeout;
        let gate = tokio::time::timeout(timeout, self.gate.acquire())
            .await
            .map_err(|_| BanError::GateTimeout(timeout))?;

        let now = self.clock.now_ms();
        let duration_ms = self.settings.throttle.ban_duration_ms;
        self.store.write(&target, now, duration_ms);
        drop(gate);

        AtomicAgentStats::bump(&self.stats.bans_applied);
        info!("Agent {} has been banned for {}ms", target, duration_ms);

        Ok(BanOutcome {
            target,
            duration_ms,
            applied_at_ms: now,
        })
    }

    /// Handle a `ban` message and answer the sender.
    pub(super) async fn handle_ban_message(&self, msg: InboundMessage) {
        let Some(sender) = msg.sender_identity() else {
            warn!(sender = %msg.sender, "Dropping ban command from unaddressable sender");
            return;
        };

        let reply = match self.apply_ban(&msg.body).await {
            Ok(outcome) => OutboundMessage::ban_confirmed(sender.clone(), &outcome.target),
            Err(e) => {
                warn!(%sender, error = %e, "Ban command rejected");
                OutboundMessage::failure(sender.clone(), e.to_string())
            }
        };

        if let Err(e) = self.channel.send(reply).await {
            warn!(%sender, error = %e, "Failed to answer ban command");
            AtomicAgentStats::bump(&self.stats.send_failures);
        }
    }
}
