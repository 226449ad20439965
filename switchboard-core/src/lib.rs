//! Switchboard Core
//!
//! This crate provides lifetime-safe, reentrant signal/slot dispatch.
//! It implements:
//!
//! - Signals that call connected slots in a defined order and reduce their
//!   results through a pluggable combiner
//! - Weak connection handles for blocking, unblocking and disconnecting
//! - Automatic disconnection when an object a slot depends on is dropped
//! - Single-threaded and multi-threaded (recursive lock) variants
//!
//! Slots may connect, disconnect and emit on the very signal that is calling
//! them, and objects they track may be dropped mid-emission. A slot record
//! that is being called is pinned and cannot be freed under the caller.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `slot`: slot storage (arena, groups, ordering) and the per-slot state
//!   machine
//! - `signal`: the signal type, its builder and the emission engine
//! - `connection`: weak and scoped connection handles
//! - `trackable`: lifetime tokens for automatic disconnection
//! - `combiner`: strategies that reduce slot results
//! - `threading`: the lock policy selected per signal
//!
//! # Example
//!
//! ```
//! use switchboard_core::{CollectAll, Signal};
//!
//! let on_resize: Signal<(u32, u32), String, CollectAll> = Signal::new();
//!
//! let log = on_resize.connect(|(w, h): &(u32, u32)| format!("resized to {w}x{h}"));
//! on_resize.connect(|(w, h): &(u32, u32)| format!("area {}", w * h));
//!
//! assert_eq!(on_resize.emit(&(4, 3)), vec!["resized to 4x3", "area 12"]);
//!
//! log.disconnect();
//! assert_eq!(on_resize.emit(&(2, 2)), vec!["area 4"]);
//! ```

pub mod combiner;
pub mod connection;
pub mod error;
pub mod signal;
pub mod slot;
pub mod threading;
pub mod trackable;

pub use combiner::{
    BoxedResults, CollectAll, Combiner, LastValue, Maximum, OptionalLastValue, RunAll,
};
pub use connection::{BlockGuard, Connection, ScopedConnection, SlotOwner, SlotState};
pub use error::{Result, SignalError};
pub use signal::{EmissionContext, EmissionFrame, Signal, SignalBuilder, SignalStats, SlotCalls};
pub use slot::{GroupOrder, Position, SignalId, Slot, SlotFn, SlotGroup, SlotKey};
pub use threading::{IntoExtendedSlot, IntoSlot, MultiThreaded, SingleThreaded, ThreadingModel};
pub use trackable::Trackable;

/// A signal whose slots and handles may cross threads.
pub type SyncSignal<A, R = (), C = LastValue, G = ()> = Signal<A, R, C, G, MultiThreaded>;

/// Connection handle to a [`SyncSignal`] slot.
pub type SyncConnection = Connection<MultiThreaded>;

/// Scoped connection to a [`SyncSignal`] slot.
pub type SyncScopedConnection = ScopedConnection<MultiThreaded>;

/// Lifetime token usable by [`SyncSignal`] slots.
pub type SyncTrackable = Trackable<MultiThreaded>;

/// Slot builder for [`SyncSignal`].
pub type SyncSlot<F> = Slot<F, MultiThreaded>;
