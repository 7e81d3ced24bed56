//! Per-requester cooldowns
//!
//! One record per identity: when it was written and how long it holds.
//! The short request cooldown and the long ban share the store, and a new
//! write always replaces the previous record outright.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::identity::Identity;

/// Cooldown durations applied by the pipeline and by bans.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Anti-flood window after every photo sent (ms)
    pub request_cooldown_ms: u64,
    /// Window applied by a ban (ms)
    pub ban_duration_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            request_cooldown_ms: 500,
            ban_duration_ms: 10_000,
        }
    }
}

/// `(last_timestamp, duration)` for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownRecord {
    pub last_ms: u64,
    pub duration_ms: u64,
}

impl CooldownRecord {
    pub fn new(last_ms: u64, duration_ms: u64) -> Self {
        Self {
            last_ms,
            duration_ms,
        }
    }

    /// Whether the cooldown is over at `now_ms`.
    ///
    /// A record stamped after `now_ms` counts as zero elapsed, so a ban
    /// written after a pipeline sampled its clock still reads as active.
    pub fn is_elapsed(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_ms) >= self.duration_ms
    }

    /// Milliseconds left before the cooldown is over (0 once elapsed).
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.duration_ms
            .saturating_sub(now_ms.saturating_sub(self.last_ms))
    }
}

/// Identity → cooldown record.
///
/// Reads and writes take a short lock; records are `Copy`, so a reader
/// never sees half of a write.
#[derive(Debug, Default)]
pub struct CooldownStore {
    records: RwLock<HashMap<Identity, CooldownRecord>>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `identity` has no record or its cooldown is over. Pure read.
    pub fn is_elapsed(&self, identity: &Identity, now_ms: u64) -> bool {
        self.get(identity)
            .map_or(true, |record| record.is_elapsed(now_ms))
    }

    /// Replace the record for `identity` with `(now_ms, duration_ms)`.
    pub fn write(&self, identity: &Identity, now_ms: u64, duration_ms: u64) {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        records.insert(identity.clone(), CooldownRecord::new(now_ms, duration_ms));
    }

    /// Snapshot of the record for `identity`, if any.
    pub fn get(&self, identity: &Identity) -> Option<CooldownRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .copied()
    }

    /// Number of distinct identities currently tracked.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record whose cooldown is over at `now_ms`.
    ///
    /// Removing an elapsed record changes nothing observable: a missing
    /// record also reads as elapsed. Returns the number removed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, record| !record.is_elapsed(now_ms));
        before - records.len()
    }
}
