//! Message transport
//!
//! The agent only needs two things from the message layer: send one message
//! to an identity, and receive the next message with a timeout. Adapters:
//! - [`TcpChannel`]: a message server reached over TCP (length-prefixed MessagePack)
//! - [`MemoryChannel`]: in-process queues, for tests and local demos

pub mod codec;
mod tcp;

pub use tcp::TcpChannel;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::identity::Identity;
use crate::message::{Envelope, InboundMessage, OutboundMessage, Performative};

/// Result of one bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Message(InboundMessage),
    /// Nothing arrived within the timeout
    Timeout,
    /// The transport is gone; no more messages will arrive
    Closed,
}

/// Send/receive boundary to the message layer.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// The agent's own address on this channel
    fn local_identity(&self) -> &Identity;

    /// Send one message
    async fn send(&self, msg: OutboundMessage) -> Result<()>;

    /// Wait up to `timeout` for the next inbound message
    async fn recv(&self, timeout: Duration) -> Result<Incoming>;
}

/// In-process channel. The matching [`MemoryPeer`] plays the rest of the
/// network.
pub struct MemoryChannel {
    identity: Identity,
    inbox: Mutex<mpsc::Receiver<InboundMessage>>,
    outbox: mpsc::UnboundedSender<Envelope>,
}

/// Network side of a [`MemoryChannel`].
pub struct MemoryPeer {
    inbox_tx: Option<mpsc::Sender<InboundMessage>>,
    outbox_rx: mpsc::UnboundedReceiver<Envelope>,
}

/// Create a connected channel/peer pair.
pub fn memory_channel(identity: Identity, capacity: usize) -> (MemoryChannel, MemoryPeer) {
    let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel {
            identity,
            inbox: Mutex::new(inbox_rx),
            outbox: outbox_tx,
        },
        MemoryPeer {
            inbox_tx: Some(inbox_tx),
            outbox_rx,
        },
    )
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    fn local_identity(&self) -> &Identity {
        &self.identity
    }

    async fn send(&self, msg: OutboundMessage) -> Result<()> {
        self.outbox
            .send(msg.into_envelope(&self.identity))
            .map_err(|_| anyhow::anyhow!("Memory peer dropped"))
    }

    async fn recv(&self, timeout: Duration) -> Result<Incoming> {
        let mut inbox = self.inbox.lock().await;
        match tokio::time::timeout(timeout, inbox.recv()).await {
            Ok(Some(msg)) => Ok(Incoming::Message(msg)),
            Ok(None) => Ok(Incoming::Closed),
            Err(_) => Ok(Incoming::Timeout),
        }
    }
}

impl MemoryPeer {
    /// Deliver a message to the agent as if `sender` had sent it.
    pub async fn deliver(
        &self,
        sender: &str,
        performative: Option<Performative>,
        body: &str,
    ) -> Result<()> {
        let tx = self
            .inbox_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Memory peer closed"))?;
        tx.send(InboundMessage::new(sender, performative, body))
            .await
            .map_err(|_| anyhow::anyhow!("Memory channel dropped"))
    }

    /// Photo request from `sender`.
    pub async fn request_photo(&self, sender: &str) -> Result<()> {
        self.deliver(sender, None, "").await
    }

    /// Ban command from `sender` naming `target`.
    pub async fn ban(&self, sender: &str, target: &str) -> Result<()> {
        self.deliver(sender, Some(Performative::Ban), target).await
    }

    /// Next message the agent sent, waiting up to `timeout`.
    pub async fn next_sent(&mut self, timeout: Duration) -> Option<Envelope> {
        tokio::time::timeout(timeout, self.outbox_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// A message the agent already sent, without waiting.
    pub fn try_next_sent(&mut self) -> Option<Envelope> {
        self.outbox_rx.try_recv().ok()
    }

    /// Stop delivering; the agent's next receive reports `Closed`.
    pub fn close(&mut self) {
        self.inbox_tx = None;
    }
}
