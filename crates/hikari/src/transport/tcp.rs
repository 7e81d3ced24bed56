//! TCP connection to the message server
//!
//! The agent logs in with its identity and password, then exchanges
//! `WireFrame::Message` frames. A background task drains the socket into a
//! queue so a receive timeout never abandons a half-read frame.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::{read_wire_frame, write_wire_frame};
use super::{Incoming, MessageChannel};
use crate::identity::Identity;
use crate::message::{InboundMessage, OutboundMessage, RedactedString, WireFrame};

/// How long the server gets to answer a login
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound queue depth between the socket reader and `recv`
const INBOX_CAPACITY: usize = 64;

/// Logged-in connection to the message server.
pub struct TcpChannel {
    identity: Identity,
    writer: Mutex<OwnedWriteHalf>,
    inbox: Mutex<mpsc::Receiver<InboundMessage>>,
    reader: JoinHandle<()>,
}

impl TcpChannel {
    /// Connect to `addr` and log in as `identity`.
    pub async fn connect(addr: &str, identity: Identity, password: RedactedString) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to message server at {}", addr))?;
        stream.set_nodelay(true).ok();
        let (mut read_half, mut write_half) = stream.into_split();

        write_wire_frame(
            &mut write_half,
            &WireFrame::Login {
                identity: identity.clone(),
                password,
            },
        )
        .await
        .context("Failed to send login")?;

        let ack = tokio::time::timeout(LOGIN_TIMEOUT, read_wire_frame(&mut read_half))
            .await
            .context("Message server did not answer login")?
            .context("Failed to read login answer")?;

        match ack {
            WireFrame::LoginAck { accepted: true, .. } => {
                info!(%identity, server = %addr, "Logged in to message server");
            }
            WireFrame::LoginAck {
                accepted: false,
                reason,
            } => {
                anyhow::bail!(
                    "Login rejected for {}: {}",
                    identity,
                    reason.unwrap_or_else(|| "no reason given".to_string())
                );
            }
            other => anyhow::bail!("Unexpected frame during login: {:?}", other),
        }

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let reader = tokio::spawn(read_loop(read_half, tx));

        Ok(Self {
            identity,
            writer: Mutex::new(write_half),
            inbox: Mutex::new(rx),
            reader,
        })
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Forward routed messages to the inbox until the socket closes.
async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<InboundMessage>) {
    loop {
        match read_wire_frame(&mut reader).await {
            Ok(WireFrame::Message(env)) => {
                if tx.send(env.into()).await.is_err() {
                    debug!("Inbox dropped, stopping reader");
                    break;
                }
            }
            Ok(other) => {
                debug!(frame = ?other, "Ignoring non-message frame");
            }
            Err(e) => {
                let eof = e
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| io.kind() == std::io::ErrorKind::UnexpectedEof);
                if eof {
                    info!("Message server closed the connection");
                } else {
                    warn!(error = %e, "Message server read error");
                }
                break;
            }
        }
    }
}

#[async_trait]
impl MessageChannel for TcpChannel {
    fn local_identity(&self) -> &Identity {
        &self.identity
    }

    async fn send(&self, msg: OutboundMessage) -> Result<()> {
        let frame = WireFrame::Message(msg.into_envelope(&self.identity));
        let mut writer = self.writer.lock().await;
        write_wire_frame(&mut *writer, &frame).await
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
