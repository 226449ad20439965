//! Shared signal state.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::connection::{SlotOwner, SlotState};
use crate::slot::{GroupOrder, Reaped, SignalId, SlotGroup, SlotKey, SlotTable};
use crate::threading::ThreadingModel;

/// The single shared allocation behind a [`Signal`](crate::Signal).
///
/// Connections and trackables reach it through weak references, and every
/// emission holds a strong one for its whole duration.
pub struct SignalCore<A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    id: SignalId,
    name: Option<String>,
    table: T::Lock<RefCell<SlotTable<A, R, G, T>>>,
}

impl<A, R, G, T> SignalCore<A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    pub(crate) fn new(name: Option<String>, order: GroupOrder<G>) -> Arc<Self> {
        let id = SignalId::new();
        Arc::new_cyclic(|weak| {
            let table = SlotTable::new(id, T::erase_core(weak.clone()), order);
            Self {
                id,
                name,
                table: T::new_lock(RefCell::new(table)),
            }
        })
    }

    pub(crate) fn id(&self) -> SignalId {
        self.id
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Take the call lock. Held by an emission from start to finish.
    pub(crate) fn call_lock(&self) -> T::Guard<'_, RefCell<SlotTable<A, R, G, T>>> {
        T::lock(&self.table)
    }

    /// Read the table under a local lock.
    pub(crate) fn read<O>(&self, f: impl FnOnce(&SlotTable<A, R, G, T>) -> O) -> O {
        let guard = T::lock(&self.table);
        let table = guard.borrow();
        f(&table)
    }

    /// Mutate the table under a local lock.
    ///
    /// Records erased by `f` are dropped after the lock is released, so
    /// destructors of the stored callables may call back into the signal.
    pub(crate) fn update<O>(
        &self,
        f: impl FnOnce(&mut SlotTable<A, R, G, T>, &mut Reaped<A, R, T>) -> O,
    ) -> O {
        let mut reaped = Reaped::new();
        let out = {
            let guard = T::lock(&self.table);
            let mut table = guard.borrow_mut();
            f(&mut table, &mut reaped)
        };
        drop(reaped);
        out
    }
}

impl<A, R, G, T> SlotOwner for SignalCore<A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    fn slot_state(&self, key: SlotKey) -> SlotState {
        self.read(|table| table.state(key))
    }

    fn set_blocked(&self, key: SlotKey, blocked: bool) -> Option<bool> {
        self.update(|table, _| table.set_blocked(key, blocked))
    }

    fn disconnect(&self, key: SlotKey) -> bool {
        self.update(|table, reaped| table.disconnect(key, reaped))
    }

    fn signal_id(&self) -> SignalId {
        self.id
    }
}

impl<A, R, G, T> fmt::Debug for SignalCore<A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("threading", &T::NAME)
            .finish_non_exhaustive()
    }
}

/// Erased weak handle to `core`, as stored in connections.
pub(crate) fn owner_of<A, R, G, T>(core: &Arc<SignalCore<A, R, G, T>>) -> Weak<T::Owner>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    T::erase_core(Arc::downgrade(core))
}
