//! Hikari - Throttled single-frame camera agent
//!
//! Answers photo requests arriving over a message channel with one captured
//! still each, while enforcing a short per-requester cooldown and honouring
//! administrative bans.
//!
//! - **Core types**: Identity, Clock, message envelopes
//! - **`throttle`**: cooldown store and the processing gate
//! - **`agent`**: request listener, capture pipeline, ban intake
//! - **`transport`**: message channel trait, TCP and in-memory adapters
//! - **`camera`**: still capture (external grabber, `test-source` synthetic frames)
//! - **`web`**: admin HTTP endpoint (ban, status)
//! - **`config`**: environment configuration for the agent binary

// Core modules
mod clock;
mod error;
mod identity;
mod message;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::BanError;
pub use identity::Identity;
pub use message::*;

pub mod agent;
pub mod camera;
pub mod config;
pub mod throttle;
pub mod transport;
pub mod web;

pub use agent::{
    AgentSettings, AgentStats, AgentStatus, BanOutcome, CameraAgent, PipelineOutcome, CANCELLED_NOTICE,
};
pub use camera::{encode_still, Camera, CommandCamera, StillCaptureConfig};
#[cfg(feature = "test-source")]
pub use camera::TestCamera;
pub use config::AgentConfig;
pub use throttle::{CooldownRecord, CooldownStore, GateGuard, ProcessingGate, ThrottleConfig};
pub use transport::{memory_channel, Incoming, MemoryChannel, MemoryPeer, MessageChannel, TcpChannel};
