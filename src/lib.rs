#![deny(unsafe_code)]
#![deny(clippy::all)]
#![deny(deprecated)]

//!
//! Stampsync guarantees that timestamp values used to derive time-ordered
//! unique identifiers are monotonically increasing across process restarts
//! and across multiple independent processes sharing a clock source.
//!
//! The crate provides the synchronizer contract ([`TimestampSynchronizer`])
//! and concrete store backends. It does not generate identifiers itself;
//! an identifier generator holds a synchronizer, asks it for a safe starting
//! boundary, and asks it to extend the safe range when exhausted.
//!
//! ```no_run
//! use stampsync::{FileSynchronizer, TimestampSynchronizer};
//!
//! # fn main() -> Result<(), stampsync::SyncError> {
//! let mut sync = FileSynchronizer::new("/var/lib/myapp/uuid-state")?;
//! let first_safe = sync.initialize()?;
//! // ... issue timestamps up to and including `first_safe` ...
//! let next_unsafe = sync.update(first_safe)?;
//! // ... issue timestamps strictly below `next_unsafe` ...
//! sync.deactivate()?;
//! # Ok(())
//! # }
//! ```

// Module for shared timestamp domain types and constants.
pub mod types;

// Module for synchronizer error types.
pub mod error;

// Module for the synchronizer contract and its store backends.
pub mod sync;

// Re-export the contract surface for easier access at the crate root.
pub use error::SyncError;
pub use sync::file::{FileSyncOptions, FileSynchronizer};
pub use sync::memory::{MemorySynchronizer, SharedBoundary};
pub use sync::noop::NoopSynchronizer;
pub use sync::{HandleState, TimestampSynchronizer};
pub use types::Timestamp;
