//! Processing gate
//!
//! Serializes cooldown commits: the pipeline's check and its
//! re-check-then-write, and every ban write. Holding a [`GateGuard`] marks
//! the gate busy; dropping it (on any path, including task cancellation)
//! marks it idle and wakes the next waiter.

use tokio::sync::{Mutex, MutexGuard};

/// Process-wide busy/idle flag with async wait.
#[derive(Debug, Default)]
pub struct ProcessingGate {
    busy: Mutex<()>,
}

/// Proof that the gate is held. Released on drop.
#[must_use = "the gate is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard<'a> {
    _held: MutexGuard<'a, ()>,
}

impl ProcessingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until idle, then mark busy. Waiters are woken in FIFO order.
    pub async fn acquire(&self) -> GateGuard<'_> {
        GateGuard {
            _held: self.busy.lock().await,
        }
    }

    /// Whether some holder currently has the gate.
    pub fn is_busy(&self) -> bool {
        self.busy.try_lock().is_err()
    }
}
