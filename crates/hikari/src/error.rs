//! Errors callers need to branch on

use std::time::Duration;

/// Why a ban was not applied. The store is untouched in every case.
#[derive(Debug, thiserror::Error)]
pub enum BanError {
    /// Target identity missing or empty after normalization
    #[error("ban request is missing a target agent")]
    InvalidTarget,
    /// The processing gate stayed busy for too long
    #[error("processing gate stayed busy for {0:?}")]
    GateTimeout(Duration),
    /// The agent is stopping and no longer accepts bans
    #[error("agent is shutting down")]
    ShuttingDown,
}

impl BanError {
    /// Whether the caller sent something wrong (as opposed to an agent fault).
    pub fn is_client_error(&self) -> bool {
        matches!(self, BanError::InvalidTarget)
    }
}
