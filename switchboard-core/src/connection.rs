//! Connection Handles
//!
//! A [`Connection`] is a weak, copyable handle to one slot record. It never
//! keeps the record or its signal alive: once either is gone, every query
//! answers "disconnected" and every mutator does nothing.
//!
//! [`ScopedConnection`] owns the disconnect responsibility instead and
//! disconnects the slot when it goes out of scope.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::slot::{SignalId, SlotKey};
use crate::threading::{SingleThreaded, ThreadingModel};

/// Observable state of a connected slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Connected and invoked by emissions.
    Active,
    /// Connected but skipped by emissions.
    Blocked,
    /// Disconnected for good.
    Disconnected,
}

impl SlotState {
    /// Whether the slot still counts as connected.
    pub fn is_connected(&self) -> bool {
        !matches!(self, SlotState::Disconnected)
    }
}

/// Erased view of a signal core, as seen from connection handles and
/// trackables.
///
/// Implemented by every signal. Connections and trackables only ever hold it
/// weakly.
pub trait SlotOwner {
    /// Current state of one slot. Stale keys report `Disconnected`.
    fn slot_state(&self, key: SlotKey) -> SlotState;

    /// Block or unblock one slot, returning the previous blocked flag.
    fn set_blocked(&self, key: SlotKey, blocked: bool) -> Option<bool>;

    /// Disconnect one slot. Returns `false` if it was already disconnected.
    fn disconnect(&self, key: SlotKey) -> bool;

    /// The owning signal's ID.
    fn signal_id(&self) -> SignalId;
}

/// Weak handle to a connected slot.
///
/// Handles compare, order and hash by the slot they refer to, so they can be
/// kept in sets and maps. An empty handle (from [`Connection::default`])
/// refers to nothing and reports "disconnected".
///
/// # Example
///
/// ```
/// use switchboard_core::{Signal, OptionalLastValue};
///
/// let signal: Signal<(), i32, OptionalLastValue> = Signal::with_combiner(OptionalLastValue);
/// let conn = signal.connect(|_: &()| 7);
///
/// conn.block();
/// assert_eq!(signal.emit(&()), None);
///
/// conn.unblock();
/// assert_eq!(signal.emit(&()), Some(7));
///
/// conn.disconnect();
/// assert!(!conn.is_connected());
/// ```
pub struct Connection<T: ThreadingModel = SingleThreaded> {
    owner: Option<Weak<T::Owner>>,
    key: SlotKey,
}

impl<T: ThreadingModel> Connection<T> {
    pub(crate) fn new(owner: Weak<T::Owner>, key: SlotKey) -> Self {
        Self {
            owner: Some(owner),
            key,
        }
    }

    fn owner(&self) -> Option<Arc<T::Owner>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    /// Current state of the slot.
    pub fn state(&self) -> SlotState {
        self.owner()
            .map_or(SlotState::Disconnected, |owner| owner.slot_state(self.key))
    }

    /// Whether the slot is still connected (blocked slots count).
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Whether the slot is connected and blocked.
    pub fn is_blocked(&self) -> bool {
        self.state() == SlotState::Blocked
    }

    /// Stop emissions from invoking the slot until [`unblock`](Self::unblock).
    pub fn block(&self) {
        self.set_blocked(true);
    }

    /// Let emissions invoke the slot again.
    pub fn unblock(&self) {
        self.set_blocked(false);
    }

    /// Set the blocked flag. Blocking is not counted: one `unblock` undoes
    /// any number of `block` calls.
    pub fn set_blocked(&self, blocked: bool) {
        if let Some(owner) = self.owner() {
            owner.set_blocked(self.key, blocked);
        }
    }

    /// Block the slot until the returned guard is dropped, then restore the
    /// previous blocked flag.
    #[must_use = "the slot is unblocked again as soon as the guard is dropped"]
    pub fn block_scoped(&self) -> BlockGuard<T> {
        let previous = self
            .owner()
            .and_then(|owner| owner.set_blocked(self.key, true))
            .unwrap_or(false);
        BlockGuard {
            conn: self.clone(),
            previous,
        }
    }

    /// Disconnect the slot. A no-op if it is already disconnected.
    pub fn disconnect(&self) {
        if let Some(owner) = self.owner() {
            owner.disconnect(self.key);
        }
    }

    /// ID of the signal this handle points into, while that signal is alive.
    pub fn signal_id(&self) -> Option<SignalId> {
        self.owner().map(|owner| owner.signal_id())
    }

    /// Exchange the slots two handles refer to.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    fn identity(&self) -> (usize, SlotKey) {
        let addr = self
            .owner
            .as_ref()
            .map_or(0, |owner| owner.as_ptr().cast::<()>() as usize);
        (addr, self.key)
    }
}

impl<T: ThreadingModel> Default for Connection<T> {
    fn default() -> Self {
        Self {
            owner: None,
            key: SlotKey::new(0, 0),
        }
    }
}

impl<T: ThreadingModel> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            key: self.key,
        }
    }
}

impl<T: ThreadingModel> PartialEq for Connection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T: ThreadingModel> Eq for Connection<T> {}

impl<T: ThreadingModel> PartialOrd for Connection<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ThreadingModel> Ord for Connection<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl<T: ThreadingModel> Hash for Connection<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<T: ThreadingModel> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("slot", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

/// Restores a slot's blocked flag when dropped.
///
/// Returned by [`Connection::block_scoped`].
pub struct BlockGuard<T: ThreadingModel = SingleThreaded> {
    conn: Connection<T>,
    previous: bool,
}

impl<T: ThreadingModel> BlockGuard<T> {
    /// The connection this guard blocks.
    pub fn connection(&self) -> &Connection<T> {
        &self.conn
    }
}

impl<T: ThreadingModel> Drop for BlockGuard<T> {
    fn drop(&mut self) {
        self.conn.set_blocked(self.previous);
    }
}

impl<T: ThreadingModel> fmt::Debug for BlockGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockGuard")
            .field("conn", &self.conn)
            .field("previous", &self.previous)
            .finish()
    }
}

/// Connection that disconnects its slot when dropped.
///
/// # Example
///
/// ```
/// use switchboard_core::{ScopedConnection, Signal};
///
/// let signal: Signal<()> = Signal::new();
/// {
///     let _scoped = ScopedConnection::from(signal.connect(|_: &()| {}));
///     assert_eq!(signal.slot_count(), 1);
/// }
/// assert!(signal.is_empty());
/// ```
pub struct ScopedConnection<T: ThreadingModel = SingleThreaded> {
    conn: Connection<T>,
}

impl<T: ThreadingModel> ScopedConnection<T> {
    /// Take over the disconnect responsibility for `conn`.
    pub fn new(conn: Connection<T>) -> Self {
        Self { conn }
    }

    /// Give up the disconnect responsibility, returning a plain handle.
    pub fn release(mut self) -> Connection<T> {
        std::mem::take(&mut self.conn)
    }
}

impl<T: ThreadingModel> Default for ScopedConnection<T> {
    fn default() -> Self {
        Self::new(Connection::default())
    }
}

impl<T: ThreadingModel> From<Connection<T>> for ScopedConnection<T> {
    fn from(conn: Connection<T>) -> Self {
        Self::new(conn)
    }
}

impl<T: ThreadingModel> Deref for ScopedConnection<T> {
    type Target = Connection<T>;

    fn deref(&self) -> &Connection<T> {
        &self.conn
    }
}

impl<T: ThreadingModel> Drop for ScopedConnection<T> {
    fn drop(&mut self) {
        self.conn.disconnect();
    }
}

impl<T: ThreadingModel> fmt::Debug for ScopedConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopedConnection").field(&self.conn).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunAll, Signal};
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    fn counting_signal() -> (Signal<(), (), RunAll>, Rc<Cell<u32>>) {
        (Signal::new(), Rc::new(Cell::new(0)))
    }

    #[test]
    fn empty_connection_is_disconnected() {
        let conn: Connection = Connection::default();

        assert!(!conn.is_connected());
        assert!(!conn.is_blocked());
        assert_eq!(conn.state(), SlotState::Disconnected);
        assert_eq!(conn.signal_id(), None);
        conn.block();
        conn.disconnect();
    }

    #[test]
    fn block_and_unblock() {
        let (signal, calls) = counting_signal();
        let c = Rc::clone(&calls);
        let conn = signal.connect(move |_: &()| c.set(c.get() + 1));

        conn.block();
        conn.block();
        assert!(conn.is_blocked());
        assert!(conn.is_connected());
        signal.emit(&());
        assert_eq!(calls.get(), 0);

        conn.unblock();
        assert_eq!(conn.state(), SlotState::Active);
        signal.emit(&());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn block_scoped_restores_previous_state() {
        let (signal, calls) = counting_signal();
        let c = Rc::clone(&calls);
        let conn = signal.connect(move |_: &()| c.set(c.get() + 1));

        {
            let _guard = conn.block_scoped();
            signal.emit(&());
        }
        assert!(!conn.is_blocked());
        signal.emit(&());
        assert_eq!(calls.get(), 1);

        conn.block();
        drop(conn.block_scoped());
        assert!(conn.is_blocked());
    }

    #[test]
    fn handles_outlive_their_signal() {
        let (signal, _) = counting_signal();
        let conn = signal.connect(|_: &()| {});
        assert_eq!(conn.signal_id(), Some(signal.id()));

        drop(signal);
        assert!(!conn.is_connected());
        conn.unblock();
        conn.disconnect();
    }

    #[test]
    fn equality_follows_slot_identity() {
        let (signal, _) = counting_signal();
        let a = signal.connect(|_: &()| {});
        let b = signal.connect(|_: &()| {});

        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let set: HashSet<_> = [a.clone(), b.clone(), a.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(a.cmp(&b), a.identity().cmp(&b.identity()));
    }

    #[test]
    fn swap_exchanges_targets() {
        let (signal, _) = counting_signal();
        let mut a = signal.connect(|_: &()| {});
        let mut b = Connection::default();
        let original = a.clone();

        a.swap(&mut b);
        assert!(!a.is_connected());
        assert_eq!(b, original);
    }

    #[test]
    fn scoped_connection_disconnects_on_drop() {
        let (signal, _) = counting_signal();
        let conn = signal.connect(|_: &()| {});
        {
            let scoped = ScopedConnection::new(conn.clone());
            assert!(scoped.is_connected());
        }
        assert!(!conn.is_connected());
    }

    #[test]
    fn released_scoped_connection_stays_connected() {
        let (signal, _) = counting_signal();
        let scoped = ScopedConnection::from(signal.connect(|_: &()| {}));

        let conn = scoped.release();
        assert!(conn.is_connected());
        assert_eq!(signal.slot_count(), 1);
    }
}
