//! The synchronizer contract and its store backends.
//!
//! A synchronizer is one process's claim on a shared, persisted timestamp
//! boundary: the exclusive upper limit on timestamp values already
//! considered possibly used. The persisted boundary is a lease
//! high-water-mark: holding the backend's lock is what prevents two
//! processes from advancing it inconsistently.
//!
//! Backends live in submodules: [`file`] (advisory file lock + state file),
//! [`memory`] (shared in-process store), [`noop`] (disabled).

pub mod file;
pub mod memory;
pub mod noop;

use crate::error::SyncError;
use crate::types::Timestamp;

/// Lifecycle state of one synchronizer handle.
///
/// Transitions are strictly `Uninitialized` → `Active` → `Deactivated`;
/// every backend rejects out-of-order lifecycle calls with
/// [`SyncError::InvalidState`] without touching shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleState {
    /// Created, `initialize` not yet called.
    #[default]
    Uninitialized,
    /// `initialize` succeeded; the handle holds its coordination resource.
    Active,
    /// `deactivate` was called; the handle is spent.
    Deactivated,
}

/// Contract for keeping issued timestamps monotonic across restarts and
/// across processes sharing one backing store.
///
/// The caller is expected to serialize calls to a single handle; the `&mut
/// self` receivers make sharing a handle across threads without external
/// synchronization a compile error, so misuse cannot corrupt the store.
/// Multiple processes each hold their own handle, coordinated through the
/// backend's shared state.
pub trait TimestampSynchronizer {
    /// Claims the shared store and returns the first legal timestamp.
    ///
    /// Acquires the backend's exclusive coordination resource and reads the
    /// persisted boundary. The returned value is the first **and last**
    /// timestamp the caller may use without calling [`update`]: using any
    /// strictly greater value first requires an `update` call. A return of
    /// [`NO_PRIOR_BOUNDARY`] (zero) means no prior claim exists and the
    /// caller may start from whatever current timestamp it has.
    ///
    /// Must be called exactly once per handle, before any other operation.
    ///
    /// # Errors
    ///
    /// I/O-class errors here are fatal to the caller: proceeding would risk
    /// issuing a timestamp some previous incarnation already used.
    ///
    /// [`update`]: TimestampSynchronizer::update
    /// [`NO_PRIOR_BOUNDARY`]: crate::types::NO_PRIOR_BOUNDARY
    fn initialize(&mut self) -> Result<Timestamp, SyncError>;

    /// Reserves timestamp values through `now` and beyond.
    ///
    /// Durably advances the persisted boundary to a value strictly greater
    /// than `now` before returning. The return value is the new exclusive
    /// upper bound, the first timestamp that is NOT yet safe to use.
    /// Backends reserve a look-ahead batch beyond `now`, so one durable
    /// write amortizes over many issued timestamps. At the very top of the
    /// domain the bound saturates at `u64::MAX`.
    ///
    /// Callable any number of times while Active. The lock acquired in
    /// `initialize` is still held; no per-call re-acquisition. Callers issue
    /// `update` with non-decreasing `now` values; the backend does not
    /// validate that, but its persisted boundary never moves backward.
    ///
    /// # Errors
    ///
    /// An I/O-class error means the reservation did not commit; the caller
    /// must not issue timestamps beyond the last confirmed boundary.
    fn update(&mut self, now: Timestamp) -> Result<Timestamp, SyncError>;

    /// Releases the coordination resource so another handle may claim the
    /// store. The persisted boundary is left in place for the next
    /// `initialize`.
    ///
    /// Not guaranteed to run on abrupt process termination; crash safety
    /// rests on the backend's lock semantics (advisory locks self-release
    /// on process death), never on this method.
    ///
    /// # Errors
    ///
    /// Release failures are surfaced for logging but are non-fatal by
    /// contract: the caller is shutting this synchronizer down regardless.
    fn deactivate(&mut self) -> Result<(), SyncError>;
}
