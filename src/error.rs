//!
//! Defines error types for the synchronizer contract.

use std::path::PathBuf;
use std::time::Duration;

use crate::sync::HandleState;

/// Represents errors that can occur during synchronizer operations.
///
/// Everything except [`SyncError::InvalidState`] is I/O-class: lock
/// acquisition, persisted-state read/parse, persisted-state write/flush, or
/// lock release failed. I/O-class failures from `initialize` and `update`
/// are fatal to the caller: it cannot safely issue timestamps beyond the
/// last confirmed boundary. A `deactivate` failure is non-fatal (the handle
/// is being torn down regardless) but is still surfaced for logging.
///
/// No retries are performed internally; blind retry on a corrupt store could
/// mask a real conflict, so retry policy belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The exclusive lock on the shared store could not be acquired within
    /// the bounded wait. Another live handle holds it.
    #[error("lock acquisition timed out for {path} after {elapsed:?}")]
    LockTimeout {
        /// Lock file that could not be acquired.
        path: PathBuf,
        /// Total time spent polling before giving up.
        elapsed: Duration,
    },
    /// An underlying filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What the synchronizer was doing when the operation failed.
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// The persisted boundary state exists but could not be understood.
    #[error("corrupt boundary state in {path}: {reason}")]
    CorruptState {
        /// State file that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },
    /// A lifecycle operation was called in the wrong state (e.g. `update`
    /// before `initialize`, or `deactivate` twice). Shared state is never
    /// touched on this path.
    #[error("cannot {operation} while handle is {state:?}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the handle was in.
        state: HandleState,
    },
}

impl SyncError {
    /// Wraps an `std::io::Error` with a short description of the operation
    /// that produced it.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::Io {
            context: context.into(),
            source,
        }
    }
}
