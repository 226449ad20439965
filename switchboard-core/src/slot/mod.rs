//! Slots
//!
//! A slot is a callable registered on a signal. This module holds the pieces
//! every signal shares regardless of its argument and result types:
//!
//! - [`SlotFn`]: the erased callable capability stored in each record
//! - [`Slot`]: a callable bundled with the trackable objects it depends on
//! - the arena-backed container and the per-slot record state machine
//!
//! # Example
//!
//! ```
//! use switchboard_core::{Signal, Slot, Trackable};
//!
//! let owner = Trackable::new();
//! let signal: Signal<i32> = Signal::new();
//!
//! let conn = signal.connect_slot(Slot::new(|x: &i32| println!("got {x}")).track(&owner));
//! assert!(conn.is_connected());
//!
//! drop(owner);
//! assert!(!conn.is_connected());
//! ```

mod container;
mod key;
mod record;

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::Weak;

use smallvec::SmallVec;

use crate::threading::{SingleThreaded, ThreadingModel};
use crate::trackable::{Trackable, TrackableInner};

pub use container::{GroupOrder, Position};
pub use key::{SignalId, SlotKey};

pub(crate) use container::{GroupKey, Liveness, SlotContainer};
pub(crate) use record::{Reaped, SlotTable};

/// Erased callable stored in a slot record.
///
/// Implemented for every `Fn(&A) -> R + 'static`. The `as_any` accessor lets
/// [`Signal::disconnect_target`](crate::Signal::disconnect_target) compare
/// stored callables by concrete type and value.
pub trait SlotFn<A, R>: Any {
    /// Invoke the callable with the emission's arguments.
    fn invoke(&self, args: &A) -> R;

    /// The concrete callable, for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<A, R, F> SlotFn<A, R> for F
where
    F: Fn(&A) -> R + 'static,
{
    fn invoke(&self, args: &A) -> R {
        self(args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Key type usable for named slot groups.
pub trait SlotGroup: Clone + Hash + Eq + fmt::Debug + Send + Sync + 'static {}

impl<G> SlotGroup for G where G: Clone + Hash + Eq + fmt::Debug + Send + Sync + 'static {}

/// Weak references to the trackables one slot depends on.
pub(crate) type TrackedList<T> = SmallVec<[Weak<TrackableInner<T>>; 2]>;

/// A callable plus the trackable objects whose destruction should
/// disconnect it.
pub struct Slot<F, T: ThreadingModel = SingleThreaded> {
    target: F,
    tracked: TrackedList<T>,
}

impl<F, T: ThreadingModel> Slot<F, T> {
    /// Wrap a callable with no tracked objects.
    pub fn new(target: F) -> Self {
        Self {
            target,
            tracked: SmallVec::new(),
        }
    }

    /// Disconnect this slot automatically when `object` is dropped.
    pub fn track(mut self, object: &Trackable<T>) -> Self {
        self.tracked.push(object.downgrade());
        self
    }

    /// Number of objects this slot tracks.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Whether any tracked object has already been dropped.
    pub fn expired(&self) -> bool {
        self.tracked.iter().any(|weak| weak.strong_count() == 0)
    }

    pub(crate) fn into_parts(self) -> (F, TrackedList<T>) {
        (self.target, self.tracked)
    }
}

impl<F, T: ThreadingModel> fmt::Debug for Slot<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}
