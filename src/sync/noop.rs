//! Disabled backend: no persistence, no locking, no cross-process safety.
//!
//! For callers that explicitly opt out of synchronization (single process,
//! ephemeral identifiers) while keeping the same wiring. Still enforces the
//! handle lifecycle so swapping backends does not hide misuse.

use crate::error::SyncError;
use crate::sync::{HandleState, TimestampSynchronizer};
use crate::types::{Timestamp, NO_PRIOR_BOUNDARY};

/// A synchronizer that never coordinates with anything.
#[derive(Debug, Default)]
pub struct NoopSynchronizer {
    state: HandleState,
}

impl NoopSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state of this handle.
    pub fn state(&self) -> HandleState {
        self.state
    }
}

impl TimestampSynchronizer for NoopSynchronizer {
    /// Always returns the "no prior boundary" sentinel: the caller may use
    /// whatever current timestamp it has.
    fn initialize(&mut self) -> Result<Timestamp, SyncError> {
        if self.state != HandleState::Uninitialized {
            return Err(SyncError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        self.state = HandleState::Active;
        Ok(NO_PRIOR_BOUNDARY)
    }

    /// Grants exactly the requested value: the bound is `now + 1`, nothing
    /// is reserved ahead and nothing is persisted.
    fn update(&mut self, now: Timestamp) -> Result<Timestamp, SyncError> {
        if self.state != HandleState::Active {
            return Err(SyncError::InvalidState {
                operation: "update",
                state: self.state,
            });
        }
        Ok(now.saturating_add(1))
    }

    fn deactivate(&mut self) -> Result<(), SyncError> {
        if self.state != HandleState::Active {
            return Err(SyncError::InvalidState {
                operation: "deactivate",
                state: self.state,
            });
        }
        self.state = HandleState::Deactivated;
        Ok(())
    }
}
