//! Error types for signal emission.
//!
//! Only one condition is part of the normal control-flow surface: a combiner
//! that must produce a value when no slot was callable. Everything else that
//! can go wrong (a record erased while still pinned, a core dropped with live
//! records) is a broken internal invariant and is checked with
//! `debug_assert!` instead.

use thiserror::Error;

/// Errors produced while emitting a signal.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// The combiner needed at least one slot result but none was produced.
    ///
    /// Raised by [`LastValue`](crate::LastValue). Use
    /// [`OptionalLastValue`](crate::OptionalLastValue) or a custom combiner
    /// when an empty emission is expected.
    #[error("signal invoked with no slots connected")]
    NoSlotsConnected,
}

impl SignalError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use switchboard_core::SignalError;
    ///
    /// assert_eq!(SignalError::NoSlotsConnected.as_label(), "no_slots_connected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SignalError::NoSlotsConnected => "no_slots_connected",
        }
    }
}

/// Result alias for emissions that can fail.
pub type Result<T> = std::result::Result<T, SignalError>;
