//! Signal Implementation
//!
//! A [`Signal`] is the emission point: it owns a set of connected slots and a
//! combiner, and emitting it calls the slots in order and reduces their
//! results through the combiner.
//!
//! # How Signals Work
//!
//! 1. `connect` stores a slot record and returns a weak [`Connection`].
//!
//! 2. `emit` takes the call lock, walks the records with a pinned cursor
//!    and lets the combiner pull results one slot at a time.
//!
//! 3. Disconnecting a slot (directly, through its connection, or by
//!    dropping a tracked object) marks it disconnected; the record is erased
//!    once no emission is parked on it.
//!
//! # Reentrancy
//!
//! Slots may connect, disconnect, block and emit on the signal that is
//! calling them. No internal borrow is held while a slot runs.
//!
//! # Memory Layout
//!
//! The signal itself is a thin owner: an `Arc` to the shared core plus the
//! combiner. Dropping the signal disconnects every slot; the core is freed
//! once the last in-flight emission finishes.

mod builder;
mod context;
mod emit;
mod shared;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::combiner::{Combiner, LastValue};
use crate::connection::Connection;
use crate::slot::{GroupKey, Position, SignalId, Slot, SlotFn, SlotGroup, SlotKey, TrackedList};
use crate::threading::{IntoExtendedSlot, IntoSlot, SingleThreaded, ThreadingModel};

pub use self::builder::SignalBuilder;
pub use self::context::{EmissionContext, EmissionFrame};
pub use self::emit::SlotCalls;
pub(crate) use self::shared::SignalCore;

use self::shared::owner_of;

/// An emission point with connected slots and a combiner.
///
/// # Type Parameters
///
/// - `A`: argument passed by reference to every slot. Use a tuple for
///   several arguments and `()` for none.
/// - `R`: what each slot returns.
/// - `C`: the [`Combiner`] reducing slot results; defaults to
///   [`LastValue`].
/// - `G`: named group key; `()` when groups are not used.
/// - `T`: [`SingleThreaded`] (default) or
///   [`MultiThreaded`](crate::MultiThreaded).
///
/// # Example
///
/// ```
/// use switchboard_core::{Signal, SignalError};
///
/// let signal: Signal<i32, i32> = Signal::new();
/// let a = signal.connect(|x: &i32| x + 1);
/// let b = signal.connect(|x: &i32| x * 10);
///
/// assert_eq!(signal.emit(&2), Ok(20));
///
/// b.disconnect();
/// assert_eq!(signal.emit(&2), Ok(3));
///
/// a.disconnect();
/// assert_eq!(signal.emit(&2), Err(SignalError::NoSlotsConnected));
/// ```
pub struct Signal<A, R = (), C = LastValue, G = (), T = SingleThreaded>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    core: Arc<SignalCore<A, R, G, T>>,
    combiner: C,
}

/// Point-in-time counters for one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalStats {
    /// Raw signal ID.
    pub signal: u64,
    /// Name given through [`SignalBuilder::name`].
    pub name: Option<String>,
    /// Threading model name.
    pub threading: &'static str,
    /// Slots still connected, blocked ones included.
    pub connected: usize,
    /// Connected slots that are blocked.
    pub blocked: usize,
    /// Records an in-flight emission is parked on.
    pub pinned: usize,
    /// Records physically stored, including disconnected ones still pinned.
    pub stored: usize,
    /// Named groups holding at least one record.
    pub groups: usize,
}

impl<A, R, C, G, T> Signal<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    C: Default,
    G: SlotGroup + Ord,
    T: ThreadingModel,
{
    /// Create a signal with the default combiner and natural group order.
    pub fn new() -> Self {
        SignalBuilder::new().build()
    }
}

impl<A, R, C, G, T> Signal<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup + Ord,
    T: ThreadingModel,
{
    /// Create a signal with the given combiner and natural group order.
    pub fn with_combiner(combiner: C) -> Self {
        SignalBuilder::<A, R, LastValue, G, T>::new()
            .combiner(combiner)
            .build()
    }
}

impl<A, R, C, G, T> Signal<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    pub(crate) fn from_parts(core: Arc<SignalCore<A, R, G, T>>, combiner: C) -> Self {
        Self { core, combiner }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.core.id()
    }

    /// Name given at build time, if any.
    pub fn name(&self) -> Option<&str> {
        self.core.name()
    }

    // ------------------------------------------------------------------
    // Connecting
    // ------------------------------------------------------------------

    /// Connect a slot after every ungrouped slot.
    pub fn connect<F>(&self, slot: F) -> Connection<T>
    where
        F: Fn(&A) -> R + IntoSlot<T, A, R>,
    {
        self.connect_at(slot, Position::Back)
    }

    /// Connect an ungrouped slot at the front or back.
    ///
    /// Front slots run before every named group, most recent first; back
    /// slots run after every named group, in connection order.
    pub fn connect_at<F>(&self, slot: F, at: Position) -> Connection<T>
    where
        F: Fn(&A) -> R + IntoSlot<T, A, R>,
    {
        self.connect_record(GroupKey::ungrouped(at), at, TrackedList::new(), move |_| {
            slot.into_target()
        })
    }

    /// Connect a slot that is disconnected when any object it tracks is
    /// dropped.
    pub fn connect_slot<F>(&self, slot: Slot<F, T>) -> Connection<T>
    where
        F: Fn(&A) -> R + IntoSlot<T, A, R>,
    {
        let (target, tracked) = slot.into_parts();
        self.connect_record(GroupKey::Back, Position::Back, tracked, move |_| target.into_target())
    }

    /// Connect a slot at the back of a named group.
    pub fn connect_group<F>(&self, group: G, slot: F) -> Connection<T>
    where
        F: Fn(&A) -> R + IntoSlot<T, A, R>,
    {
        self.connect_group_at(group, slot, Position::Back)
    }

    /// Connect a slot at the front or back of a named group.
    pub fn connect_group_at<F>(&self, group: G, slot: F, at: Position) -> Connection<T>
    where
        F: Fn(&A) -> R + IntoSlot<T, A, R>,
    {
        self.connect_group_slot(group, Slot::new(slot), at)
    }

    /// Connect a tracking slot at the front or back of a named group.
    pub fn connect_group_slot<F>(&self, group: G, slot: Slot<F, T>, at: Position) -> Connection<T>
    where
        F: Fn(&A) -> R + IntoSlot<T, A, R>,
    {
        tracing::trace!(signal = %self.core.id(), group = ?group, "connecting grouped slot");
        let (target, tracked) = slot.into_parts();
        self.connect_record(GroupKey::Named(group), at, tracked, move |_| target.into_target())
    }

    /// Connect a slot that receives its own connection, so it can block or
    /// disconnect itself while running.
    ///
    /// ```
    /// use switchboard_core::{Connection, RunAll, Signal};
    ///
    /// let signal: Signal<(), (), RunAll> = Signal::new();
    /// let once = signal.connect_extended(|conn: &Connection, _: &()| conn.disconnect());
    ///
    /// signal.emit(&());
    /// assert!(!once.is_connected());
    /// ```
    pub fn connect_extended<F>(&self, slot: F) -> Connection<T>
    where
        F: Fn(&Connection<T>, &A) -> R + IntoExtendedSlot<T, A, R>,
    {
        let owner = owner_of(&self.core);
        self.connect_record(GroupKey::Back, Position::Back, TrackedList::new(), move |key| {
            slot.into_extended_target(Connection::new(owner, key))
        })
    }

    fn connect_record<F>(
        &self,
        group: GroupKey<G>,
        at: Position,
        tracked: TrackedList<T>,
        make: F,
    ) -> Connection<T>
    where
        F: FnOnce(SlotKey) -> Arc<T::Target<A, R>>,
    {
        let key = self
            .core
            .update(|table, reaped| table.connect(group, at, tracked, make, reaped));
        Connection::new(owner_of(&self.core), key)
    }

    // ------------------------------------------------------------------
    // Disconnecting
    // ------------------------------------------------------------------

    /// Disconnect every slot of one named group. Returns how many were
    /// disconnected.
    pub fn disconnect_group(&self, group: &G) -> usize {
        let count = self.core.update(|table, reaped| {
            let keys = table.group_keys(group);
            keys.into_iter()
                .filter(|key| table.disconnect(*key, reaped))
                .count()
        });
        tracing::debug!(signal = %self.core.id(), group = ?group, count, "group disconnected");
        count
    }

    /// Disconnect every slot whose callable has the same concrete type as
    /// `target` and compares equal to it. Returns how many were
    /// disconnected.
    ///
    /// ```
    /// use switchboard_core::{RunAll, Signal};
    ///
    /// fn log(x: &u32) {
    ///     println!("value {x}");
    /// }
    /// fn audit(x: &u32) {
    ///     eprintln!("audit {x}");
    /// }
    ///
    /// let signal: Signal<u32, (), RunAll> = Signal::new();
    /// signal.connect(log as fn(&u32));
    /// signal.connect(audit as fn(&u32));
    ///
    /// assert_eq!(signal.disconnect_target(&(log as fn(&u32))), 1);
    /// assert_eq!(signal.slot_count(), 1);
    /// ```
    pub fn disconnect_target<F>(&self, target: &F) -> usize
    where
        F: PartialEq + 'static,
    {
        self.core.update(|table, reaped| {
            let keys = table.keys_where(|record| {
                record
                    .target()
                    .as_any()
                    .downcast_ref::<F>()
                    .is_some_and(|stored| stored == target)
            });
            keys.into_iter()
                .filter(|key| table.disconnect(*key, reaped))
                .count()
        })
    }

    /// Disconnect every slot.
    pub fn disconnect_all(&self) {
        let count = self.core.update(|table, reaped| {
            let keys = table.connected_keys();
            keys.into_iter()
                .filter(|key| table.disconnect(*key, reaped))
                .count()
        });
        if count > 0 {
            tracing::debug!(signal = %self.core.id(), count, "all slots disconnected");
        }
    }

    // ------------------------------------------------------------------
    // Emitting
    // ------------------------------------------------------------------

    /// Call the connected slots through the combiner and return its result.
    pub fn emit(&self, args: &A) -> C::Output
    where
        C: Combiner<R>,
    {
        self.emit_with(args, |calls| self.combiner.combine(calls))
    }

    /// Emit with an ad-hoc consumer instead of the signal's combiner.
    ///
    /// The consumer gets the concrete [`SlotCalls`] sequence, including
    /// [`SlotCalls::peek`].
    pub fn emit_with<O>(
        &self,
        args: &A,
        consume: impl FnOnce(SlotCalls<'_, A, R, G, T>) -> O,
    ) -> O {
        let core = Arc::clone(&self.core);
        let _call = core.call_lock();
        let span = tracing::trace_span!(
            "emit",
            signal = %core.id(),
            name = core.name(),
            depth = EmissionContext::depth()
        );
        let _enter = span.enter();

        consume(SlotCalls::new(&core, args))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether no slot is connected.
    pub fn is_empty(&self) -> bool {
        self.slot_count() == 0
    }

    /// Number of connected slots, blocked ones included.
    pub fn slot_count(&self) -> usize {
        self.core.read(|table| table.connected_len())
    }

    /// The combiner used by [`emit`](Self::emit).
    pub fn combiner(&self) -> &C {
        &self.combiner
    }

    /// Replace the combiner, returning the previous one.
    pub fn set_combiner(&mut self, combiner: C) -> C {
        std::mem::replace(&mut self.combiner, combiner)
    }

    /// Snapshot of this signal's counters.
    pub fn stats(&self) -> SignalStats {
        self.core.read(|table| SignalStats {
            signal: self.core.id().raw(),
            name: self.core.name().map(str::to_owned),
            threading: T::NAME,
            connected: table.connected_len(),
            blocked: table.blocked_len(),
            pinned: table.pinned_len(),
            stored: table.stored_len(),
            groups: table.group_count(),
        })
    }
}

impl<A, R, C, G, T> Default for Signal<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    C: Default,
    G: SlotGroup + Ord,
    T: ThreadingModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R, C, G, T> Drop for Signal<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

impl<A, R, C, G, T> fmt::Debug for Signal<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    C: fmt::Debug,
    G: SlotGroup,
    T: ThreadingModel,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.core.id())
            .field("name", &self.core.name())
            .field("slots", &self.slot_count())
            .field("combiner", &self.combiner)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectAll, Maximum, OptionalLastValue, RunAll, SignalError, Trackable};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn signals_have_unique_ids() {
        let s1: Signal<()> = Signal::new();
        let s2: Signal<()> = Signal::new();

        assert_ne!(s1.id(), s2.id());
    }

    #[test]
    fn last_value_returns_last_slot() {
        let signal: Signal<(), i32> = Signal::new();
        assert_eq!(signal.emit(&()), Err(SignalError::NoSlotsConnected));

        signal.connect(|_: &()| 1);
        signal.connect(|_: &()| 2);
        assert_eq!(signal.emit(&()), Ok(2));
        assert_eq!(signal.slot_count(), 2);
    }

    #[test]
    fn front_slots_run_first() {
        let signal: Signal<(), &str, CollectAll> = Signal::new();
        signal.connect(|_: &()| "back");
        signal.connect_at(|_: &()| "front1", Position::Front);
        signal.connect_at(|_: &()| "front2", Position::Front);

        assert_eq!(signal.emit(&()), vec!["front2", "front1", "back"]);
    }

    #[test]
    fn groups_run_between_front_and_back() {
        let signal: Signal<(), &str, CollectAll, i32> = Signal::new();
        signal.connect(|_: &()| "back");
        signal.connect_group(2, |_: &()| "g2");
        signal.connect_group(1, |_: &()| "g1");
        signal.connect_group_at(1, |_: &()| "g1-front", Position::Front);
        signal.connect_at(|_: &()| "front", Position::Front);

        assert_eq!(signal.emit(&()), vec!["front", "g1-front", "g1", "g2", "back"]);
        assert_eq!(signal.stats().groups, 2);
    }

    #[test]
    fn disconnect_group_removes_only_that_group() {
        let signal: Signal<(), i32, CollectAll, &'static str> = Signal::new();
        signal.connect_group("a", |_: &()| 1);
        signal.connect_group("b", |_: &()| 2);
        signal.connect_group("b", |_: &()| 3);

        assert_eq!(signal.disconnect_group(&"b"), 2);
        assert_eq!(signal.disconnect_group(&"missing"), 0);
        assert_eq!(signal.emit(&()), vec![1]);
        assert_eq!(signal.stats().groups, 1);
    }

    #[test]
    fn disconnect_all_empties_the_signal() {
        let signal: Signal<(), ()> = Signal::new();
        let a = signal.connect(|_: &()| {});
        let b = signal.connect(|_: &()| {});

        signal.disconnect_all();
        assert!(signal.is_empty());
        assert!(!a.is_connected());
        assert!(!b.is_connected());
    }

    #[test]
    fn dropping_the_signal_disconnects_slots() {
        let signal: Signal<()> = Signal::new();
        let conn = signal.connect(|_: &()| {});

        drop(signal);
        assert!(!conn.is_connected());
    }

    #[test]
    fn set_combiner_swaps_strategy() {
        let mut signal: Signal<(), i32, Maximum> = Signal::new();
        signal.connect(|_: &()| 3);
        signal.connect(|_: &()| 7);
        signal.connect(|_: &()| 5);

        assert_eq!(signal.emit(&()), Some(7));
        assert_eq!(signal.set_combiner(Maximum), Maximum);
        assert_eq!(signal.combiner(), &Maximum);
    }

    #[test]
    fn tracked_slot_disconnects_with_its_object() {
        let signal: Signal<i32, i32, OptionalLastValue> = Signal::new();
        let owner = Trackable::new();
        let conn = signal.connect_slot(Slot::new(|x: &i32| x * 2).track(&owner));

        assert_eq!(owner.tracked_count(), 1);
        assert_eq!(signal.emit(&4), Some(8));

        drop(owner);
        assert!(!conn.is_connected());
        assert_eq!(signal.emit(&4), None);
    }

    #[test]
    fn connecting_with_expired_object_yields_dead_connection() {
        let signal: Signal<(), (), RunAll> = Signal::new();
        let owner = Trackable::new();
        let slot = Slot::new(|_: &()| panic!("never called")).track(&owner);
        drop(owner);

        let conn = signal.connect_slot(slot);
        assert!(!conn.is_connected());
        signal.emit(&());
        assert!(signal.is_empty());
    }

    #[test]
    fn disconnecting_the_signal_untracks_objects() {
        let signal: Signal<()> = Signal::new();
        let owner = Trackable::new();
        let conn = signal.connect_slot(Slot::new(|_: &()| {}).track(&owner));

        conn.disconnect();
        assert_eq!(owner.tracked_count(), 0);
    }

    #[test]
    fn extended_slot_sees_its_connection() {
        let signal: Signal<(), bool, OptionalLastValue> = Signal::new();
        let conn = signal.connect_extended(|conn: &Connection, _: &()| {
            let connected = conn.is_connected();
            conn.block();
            connected
        });

        assert_eq!(signal.emit(&()), Some(true));
        assert!(conn.is_blocked());
        assert_eq!(signal.emit(&()), None);
    }

    #[test]
    fn slot_connected_during_emission_waits_for_next_emission() {
        let signal: Rc<Signal<(), i32, CollectAll>> = Rc::new(Signal::new());
        let connected = Rc::new(Cell::new(false));

        let weak = Rc::downgrade(&signal);
        let flag = Rc::clone(&connected);
        signal.connect(move |_: &()| {
            if !flag.replace(true) {
                if let Some(signal) = weak.upgrade() {
                    signal.connect_at(|_: &()| 0, Position::Front);
                    signal.connect(|_: &()| 2);
                }
            }
            1
        });

        assert_eq!(signal.emit(&()), vec![1]);
        assert_eq!(signal.emit(&()), vec![0, 1, 2]);
    }

    #[test]
    fn recursive_emission_is_legal() {
        let signal: Rc<Signal<u32, u32, CollectAll>> = Rc::new(Signal::new());
        let depths = Rc::new(RefCell::new(Vec::new()));

        let weak = Rc::downgrade(&signal);
        let seen = Rc::clone(&depths);
        signal.connect(move |n: &u32| {
            seen.borrow_mut().push(EmissionContext::depth());
            if *n > 0 {
                if let Some(signal) = weak.upgrade() {
                    signal.emit(&(n - 1));
                }
            }
            *n
        });

        assert_eq!(signal.emit(&2), vec![2]);
        assert_eq!(*depths.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn stats_serialize_to_json() {
        let signal: Signal<(), (), RunAll> = SignalBuilder::new().name("stats").build();
        let conn = signal.connect(|_: &()| {});
        conn.block();

        let stats = signal.stats();
        assert_eq!(stats.connected, 1);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.pinned, 0);

        let json = serde_json::to_value(&stats).expect("stats serialize");
        assert_eq!(json["name"], "stats");
        assert_eq!(json["threading"], "single_threaded");
        assert_eq!(json["connected"], 1);
    }
}
