//! The camera agent
//!
//! Owns the throttle state and wires the three concurrent activities to it:
//! - the request listener (receives messages, spawns pipeline runs)
//! - capture pipeline runs (one per photo request)
//! - ban intake (from the message channel or the admin endpoint)
//!
//! All of them share one [`CooldownStore`] and one [`ProcessingGate`];
//! nothing here is global, the state lives and dies with the agent.

mod ban;
mod listener;
mod pipeline;

pub use ban::BanOutcome;
pub use pipeline::{PipelineOutcome, CANCELLED_NOTICE};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::camera::Camera;
use crate::clock::Clock;
use crate::identity::Identity;
use crate::throttle::{CooldownStore, ProcessingGate, ThrottleConfig};
use crate::transport::MessageChannel;

/// Timing knobs for the agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub throttle: ThrottleConfig,
    /// Listener receive timeout (liveness only)
    pub receive_timeout: Duration,
    /// Longest a ban waits for the gate before failing
    pub ban_gate_timeout: Duration,
    /// Period of the expired-record sweep
    pub sweep_interval: Duration,
    /// How long `stop` waits for in-flight runs
    pub shutdown_grace: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            receive_timeout: Duration::from_secs(10),
            ban_gate_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub requests_received: u64,
    pub photos_sent: u64,
    pub requests_throttled: u64,
    pub cancelled_mid_capture: u64,
    pub capture_failures: u64,
    pub send_failures: u64,
    pub bans_applied: u64,
}

/// Lock-free counters behind [`AgentStats`]
#[derive(Default)]
struct AtomicAgentStats {
    requests_received: AtomicU64,
    photos_sent: AtomicU64,
    requests_throttled: AtomicU64,
    cancelled_mid_capture: AtomicU64,
    capture_failures: AtomicU64,
    send_failures: AtomicU64,
    bans_applied: AtomicU64,
}

impl AtomicAgentStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AgentStats {
        AgentStats {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            photos_sent: self.photos_sent.load(Ordering::Relaxed),
            requests_throttled: self.requests_throttled.load(Ordering::Relaxed),
            cancelled_mid_capture: self.cancelled_mid_capture.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            bans_applied: self.bans_applied.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub online: bool,
    pub identity: Identity,
    pub tracked_identities: usize,
    pub gate_busy: bool,
    pub stats: AgentStats,
}

/// Handle to a camera agent. Cheap to clone.
#[derive(Clone)]
pub struct CameraAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    identity: Identity,
    settings: AgentSettings,
    store: CooldownStore,
    gate: ProcessingGate,
    /// Held by a pipeline run from its first check to its commit: one capture in flight at a time
    capture_slot: Mutex<()>,
    camera: Arc<dyn Camera>,
    channel: Arc<dyn MessageChannel>,
    clock: Arc<dyn Clock>,
    stats: AtomicAgentStats,
    started: AtomicBool,
    listening: AtomicBool,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl CameraAgent {
    /// Assemble an agent. Nothing runs until [`CameraAgent::start`].
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        camera: Arc<dyn Camera>,
        clock: Arc<dyn Clock>,
        settings: AgentSettings,
    ) -> Self {
        let identity = channel.local_identity().clone();
        Self {
            inner: Arc::new(AgentInner {
                identity,
                settings,
                store: CooldownStore::new(),
                gate: ProcessingGate::new(),
                capture_slot: Mutex::new(()),
                camera,
                channel,
                clock,
                stats: AtomicAgentStats::default(),
                started: AtomicBool::new(false),
                listening: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Spawn the request listener and the store sweeper.
    ///
    /// Only the first call does anything; an agent is not restartable.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("Camera agent already started");
            return;
        }
        if self.inner.cancel.is_cancelled() {
            warn!("Camera agent was stopped, not starting");
            return;
        }

        info!(identity = %self.inner.identity, "Camera agent is ready");
        self.inner.listening.store(true, Ordering::SeqCst);

        let listener = Arc::clone(&self.inner);
        self.inner.tracker.spawn(listener.run_listener());

        let sweeper = Arc::clone(&self.inner);
        self.inner.tracker.spawn(sweeper.run_sweeper());
    }

    /// Stop listening and wait (bounded) for in-flight runs.
    ///
    /// Runs still going after the grace period are abandoned.
    pub async fn stop(&self) {
        info!("Shutting down agent...");
        self.inner.cancel.cancel();
        self.inner.tracker.close();

        let grace = self.inner.settings.shutdown_grace;
        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_err()
        {
            warn!("Shutdown timed out after {:?}, abandoning in-flight captures", grace);
        }
        self.inner.listening.store(false, Ordering::SeqCst);
    }

    /// Whether the listener is still receiving.
    pub fn is_alive(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst) && !self.inner.cancel.is_cancelled()
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        self.inner.cancel.cancelled().await
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.inner.settings
    }

    pub fn store(&self) -> &CooldownStore {
        &self.inner.store
    }

    pub fn gate(&self) -> &ProcessingGate {
        &self.inner.gate
    }

    pub fn stats(&self) -> AgentStats {
        self.inner.stats.snapshot()
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            online: self.is_alive(),
            identity: self.inner.identity.clone(),
            tracked_identities: self.inner.store.len(),
            gate_busy: self.inner.gate.is_busy(),
            stats: self.stats(),
        }
    }

    /// Run one capture pipeline for `requester` to completion.
    pub async fn request_photo(&self, requester: &Identity) -> PipelineOutcome {
        self.inner.run_pipeline(requester).await
    }

    /// Apply a ban on behalf of an administrative caller.
    pub async fn ban(&self, target: &str) -> Result<BanOutcome, crate::BanError> {
        self.inner.apply_ban(target).await
    }
}

impl AgentInner {
    /// Periodically drop records whose cooldown is over.
    async fn run_sweeper(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let _gate = self.gate.acquire().await;
                    let removed = self.store.sweep(self.clock.now_ms());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.store.len(), "Swept expired cooldowns");
                    }
                }
            }
        }
    }
}
