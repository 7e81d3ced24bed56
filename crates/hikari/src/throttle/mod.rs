//! Request throttling: cooldown records and the gate that serializes
//! writes to them.

mod cooldown;
mod gate;

pub use cooldown::{CooldownRecord, CooldownStore, ThrottleConfig};
pub use gate::{GateGuard, ProcessingGate};
