//! Shared timestamp domain types and constants.
//!
//! The synchronizer deals in opaque 64-bit timestamp values. It never
//! interprets them as wall-clock time; the unit (100-ns ticks, milliseconds,
//! a logical counter) is whatever the caller's identifier scheme uses. The
//! only structure the contract relies on is total ordering.

/// A timestamp value in the caller's unit, totally ordered, 64-bit.
pub type Timestamp = u64;

/// Sentinel returned by `initialize` when no prior boundary can be
/// determined: the caller may use whatever current timestamp it has.
pub const NO_PRIOR_BOUNDARY: Timestamp = 0;

/// Default look-ahead added on every `update`, in caller timestamp units.
///
/// Each durable write reserves this much headroom beyond the requested
/// value, so a burst of timestamps costs one persistence operation rather
/// than one per value. The trade is that a crash wastes at most this much
/// timestamp space.
pub const DEFAULT_LOOKAHEAD: Timestamp = 10_000;
