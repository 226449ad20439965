//! Slot Records
//!
//! One record per connected callable, plus the table that owns all records
//! of one signal and drives their state machine:
//!
//! ```text
//!   connect ──> Active <──block/unblock──> Blocked
//!                  \                          /
//!                   └──── disconnect ────────┘
//!                              │
//!                              v
//!                        Disconnected ── ref_count == 0 ──> erased
//! ```
//!
//! A record starts with one reference held on behalf of the connection.
//! Every in-flight emission cursor parked on it holds one more. Disconnecting
//! drops the connection's reference; whoever drops the last reference tears
//! the record down: it stops tracking its trackables and erases itself from
//! the container.
//!
//! Erased records are handed back to the caller in a [`Reaped`] list rather
//! than dropped in place. Dropping a record drops the user's callable, and a
//! callable's destructor may call back into the signal, so the caller drops
//! the list only after releasing its borrow of the table.

use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use crate::connection::SlotState;
use crate::threading::ThreadingModel;

use super::{
    GroupKey, GroupOrder, Liveness, Position, SignalId, SlotContainer, SlotGroup, SlotKey,
    TrackedList,
};

/// Records erased during one table operation, to be dropped by the caller
/// once the table is no longer borrowed.
pub(crate) type Reaped<A, R, T> = SmallVec<[SlotRecord<A, R, T>; 1]>;

/// State of one connected callable.
pub(crate) struct SlotRecord<A, R, T>
where
    A: 'static,
    R: 'static,
    T: ThreadingModel,
{
    target: Arc<T::Target<A, R>>,
    ref_count: usize,
    blocked: bool,
    disconnected: bool,
    serial: u64,
    tracked: TrackedList<T>,
}

impl<A, R, T> SlotRecord<A, R, T>
where
    A: 'static,
    R: 'static,
    T: ThreadingModel,
{
    pub(crate) fn target(&self) -> &Arc<T::Target<A, R>> {
        &self.target
    }

    pub(crate) fn is_callable(&self) -> bool {
        !self.disconnected && !self.blocked
    }

    pub(crate) fn state(&self) -> SlotState {
        if self.disconnected {
            SlotState::Disconnected
        } else if self.blocked {
            SlotState::Blocked
        } else {
            SlotState::Active
        }
    }

    /// Pins held by emission cursors, excluding the connection's own
    /// reference.
    pub(crate) fn pins(&self) -> usize {
        if self.disconnected {
            self.ref_count
        } else {
            self.ref_count.saturating_sub(1)
        }
    }
}

impl<A, R, T> Liveness for SlotRecord<A, R, T>
where
    A: 'static,
    R: 'static,
    T: ThreadingModel,
{
    fn is_live(&self) -> bool {
        !self.disconnected
    }
}

/// All slot records of one signal.
pub(crate) struct SlotTable<A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    slots: SlotContainer<G, SlotRecord<A, R, T>>,
    serial: u64,
    owner: Weak<T::Owner>,
    signal: SignalId,
}

impl<A, R, G, T> SlotTable<A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    pub(crate) fn new(signal: SignalId, owner: Weak<T::Owner>, order: GroupOrder<G>) -> Self {
        Self {
            slots: SlotContainer::new(order),
            serial: 0,
            owner,
            signal,
        }
    }

    /// Serial of the most recent connect. Records with a larger serial were
    /// connected after this value was read.
    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// Store a new record and start tracking its trackables.
    ///
    /// If any trackable is already gone or being torn down, the record is
    /// disconnected straight away; the returned key is then already stale.
    pub(crate) fn connect<F>(
        &mut self,
        group: GroupKey<G>,
        at: Position,
        tracked: TrackedList<T>,
        make: F,
        reaped: &mut Reaped<A, R, T>,
    ) -> SlotKey
    where
        F: FnOnce(SlotKey) -> Arc<T::Target<A, R>>,
    {
        self.serial += 1;
        let serial = self.serial;
        let key = self.slots.insert_with(group, at, |key| SlotRecord {
            target: make(key),
            ref_count: 1,
            blocked: false,
            disconnected: false,
            serial,
            tracked,
        });

        let mut expired = false;
        if let Some(record) = self.slots.get(key) {
            for weak in &record.tracked {
                match weak.upgrade() {
                    Some(inner) if inner.add_back_reference(self.owner.clone(), key) => {}
                    _ => expired = true,
                }
            }
        }

        tracing::debug!(signal = %self.signal, slot = %key, expired, "slot connected");

        if expired {
            self.disconnect(key, reaped);
        }
        key
    }

    /// Pin a record. Fails once the record has been torn down.
    pub(crate) fn acquire(&mut self, key: SlotKey) -> bool {
        match self.slots.get_mut(key) {
            Some(record) if record.ref_count != 0 => {
                record.ref_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Drop one reference; the last one tears the record down.
    pub(crate) fn release(&mut self, key: SlotKey, reaped: &mut Reaped<A, R, T>) {
        let Some(record) = self.slots.get_mut(key) else {
            return;
        };
        debug_assert!(record.ref_count > 0, "release of unpinned slot {key}");
        record.ref_count = record.ref_count.saturating_sub(1);
        if record.ref_count > 0 {
            return;
        }
        debug_assert!(record.disconnected, "slot {key} released to zero while connected");

        let tracked = std::mem::take(&mut record.tracked);
        for weak in tracked {
            if let Some(inner) = weak.upgrade() {
                inner.remove_back_reference(&self.owner, key);
            }
        }

        if let Some(record) = self.slots.erase(key) {
            tracing::trace!(signal = %self.signal, slot = %key, "slot record erased");
            reaped.push(record);
        }
    }

    /// Mark a record disconnected and drop the connection's reference.
    ///
    /// Returns `false` if the record was already disconnected or is gone.
    pub(crate) fn disconnect(&mut self, key: SlotKey, reaped: &mut Reaped<A, R, T>) -> bool {
        match self.slots.get_mut(key) {
            Some(record) if !record.disconnected => record.disconnected = true,
            _ => return false,
        }
        tracing::debug!(signal = %self.signal, slot = %key, "slot disconnected");
        self.release(key, reaped);
        true
    }

    /// Set the blocked flag, returning the previous value.
    pub(crate) fn set_blocked(&mut self, key: SlotKey, blocked: bool) -> Option<bool> {
        let record = self.slots.get_mut(key)?;
        let previous = std::mem::replace(&mut record.blocked, blocked);
        if previous != blocked {
            tracing::trace!(
                signal = %self.signal,
                slot = %key,
                blocked,
                "slot block state changed"
            );
        }
        Some(previous)
    }

    pub(crate) fn state(&self, key: SlotKey) -> SlotState {
        self.slots
            .get(key)
            .map_or(SlotState::Disconnected, SlotRecord::state)
    }

    pub(crate) fn get(&self, key: SlotKey) -> Option<&SlotRecord<A, R, T>> {
        self.slots.get(key)
    }

    /// First record after `from` (or from the start) that is callable and
    /// was connected no later than `horizon`.
    pub(crate) fn next_callable(&self, from: Option<SlotKey>, horizon: u64) -> Option<SlotKey> {
        let mut cursor = match from {
            Some(key) => self.slots.next(key),
            None => self.slots.first(),
        };
        while let Some(key) = cursor {
            if let Some(record) = self.slots.get(key) {
                if record.is_callable() && record.serial <= horizon {
                    return Some(key);
                }
            }
            cursor = self.slots.next(key);
        }
        None
    }

    /// Keys of every record not yet disconnected, in emission order.
    pub(crate) fn connected_keys(&self) -> Vec<SlotKey> {
        self.keys_where(|_| true)
    }

    /// Keys of every connected record of one named group.
    pub(crate) fn group_keys(&self, group: &G) -> Vec<SlotKey> {
        self.slots
            .group_range(group)
            .into_iter()
            .filter(|key| self.slots.get(*key).is_some_and(|record| !record.disconnected))
            .collect()
    }

    /// Keys of every connected record whose record satisfies `predicate`.
    pub(crate) fn keys_where<P>(&self, mut predicate: P) -> Vec<SlotKey>
    where
        P: FnMut(&SlotRecord<A, R, T>) -> bool,
    {
        self.slots
            .iter()
            .filter(|(_, record)| !record.disconnected && predicate(record))
            .map(|(key, _)| key)
            .collect()
    }

    pub(crate) fn connected_len(&self) -> usize {
        self.slots.live_len()
    }

    pub(crate) fn stored_len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn blocked_len(&self) -> usize {
        self.slots
            .iter()
            .filter(|(_, record)| !record.disconnected && record.blocked)
            .count()
    }

    pub(crate) fn pinned_len(&self) -> usize {
        self.slots.iter().filter(|(_, record)| record.pins() > 0).count()
    }

    pub(crate) fn group_count(&self) -> usize {
        self.slots.named_group_count()
    }
}

impl<A, R, G, T> Drop for SlotTable<A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert_eq!(
                self.pinned_len(),
                0,
                "slot table dropped while records are pinned"
            );
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
