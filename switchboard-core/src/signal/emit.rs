//! Emission Engine
//!
//! One emission walks the slot table with a [`PinnedCursor`] and hands the
//! combiner a lazy [`SlotCalls`] sequence.
//!
//! # Pinning
//!
//! The cursor holds one reference on the record it is parked on. A slot
//! that disconnects itself (or is disconnected by a trackable dropped
//! during its own call) therefore stays in storage until the cursor moves
//! on, and the cursor can always find the record's successor. Moving on
//! pins the next callable record first and only then releases the current
//! one.
//!
//! # Visibility
//!
//! The emission notes the table's connect serial when it starts. Records
//! connected later are never visited by it, wherever they were inserted.
//! Records disconnected or blocked before the cursor reaches them are
//! skipped; that check is repeated right before each call.

use std::iter::FusedIterator;
use std::sync::Arc;

use crate::slot::{SlotFn, SlotGroup, SlotKey};
use crate::threading::ThreadingModel;

use super::context::EmissionContext;
use super::shared::SignalCore;

/// Reference-counted position in a slot table.
pub(crate) struct PinnedCursor<'e, A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    core: &'e SignalCore<A, R, G, T>,
    horizon: u64,
    current: Option<SlotKey>,
}

impl<'e, A, R, G, T> PinnedCursor<'e, A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    /// Park on the first callable record.
    pub(crate) fn new(core: &'e SignalCore<A, R, G, T>) -> Self {
        let (horizon, current) = core.update(|table, _| {
            let horizon = table.serial();
            let first = table.next_callable(None, horizon);
            let pinned = first.filter(|key| table.acquire(*key));
            (horizon, pinned)
        });
        Self { core, horizon, current }
    }

    pub(crate) fn current(&self) -> Option<SlotKey> {
        self.current
    }

    /// Pin the next callable record, then release the current one.
    pub(crate) fn advance(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        let horizon = self.horizon;
        self.current = self.core.update(|table, reaped| {
            let next = table
                .next_callable(Some(current), horizon)
                .filter(|key| table.acquire(*key));
            table.release(current, reaped);
            next
        });
    }

    /// The current record's callable, if it may still be called.
    fn callable_target(&self) -> Option<Arc<T::Target<A, R>>> {
        let key = self.current?;
        self.core.read(|table| {
            table
                .get(key)
                .filter(|record| record.is_callable())
                .map(|record| Arc::clone(record.target()))
        })
    }
}

impl<A, R, G, T> Drop for PinnedCursor<'_, A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    fn drop(&mut self) {
        if let Some(current) = self.current.take() {
            self.core.update(|table, reaped| table.release(current, reaped));
        }
    }
}

/// Lazy sequence of slot results for one emission.
///
/// A slot is invoked only when the sequence is advanced onto it (or
/// [`peek`](Self::peek)ed), and at most once. Dropping the sequence early
/// leaves the remaining slots uncalled.
pub struct SlotCalls<'e, A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    cursor: PinnedCursor<'e, A, R, G, T>,
    args: &'e A,
    cached: Option<R>,
    invoked: usize,
}

impl<'e, A, R, G, T> SlotCalls<'e, A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    pub(crate) fn new(core: &'e SignalCore<A, R, G, T>, args: &'e A) -> Self {
        Self {
            cursor: PinnedCursor::new(core),
            args,
            cached: None,
            invoked: 0,
        }
    }

    /// Invoke the current slot if that has not happened yet and borrow its
    /// result, without advancing.
    pub fn peek(&mut self) -> Option<&R> {
        if self.cached.is_none() {
            self.cached = self.invoke_current();
        }
        self.cached.as_ref()
    }

    /// Number of slots invoked so far by this sequence.
    pub fn invoked(&self) -> usize {
        self.invoked
    }

    /// Call the current record, skipping forward past records that stopped
    /// being callable since they were pinned.
    fn invoke_current(&mut self) -> Option<R> {
        loop {
            let key = self.cursor.current()?;
            match self.cursor.callable_target() {
                Some(target) => {
                    let _frame = EmissionContext::enter(self.cursor.core.id(), key);
                    tracing::trace!(slot = %key, depth = EmissionContext::depth(), "invoking slot");
                    self.invoked += 1;
                    return Some(target.invoke(self.args));
                }
                None => self.cursor.advance(),
            }
        }
    }
}

impl<A, R, G, T> Iterator for SlotCalls<'_, A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    type Item = R;

    fn next(&mut self) -> Option<R> {
        let result = match self.cached.take() {
            Some(result) => Some(result),
            None => self.invoke_current(),
        };
        if result.is_some() {
            self.cursor.advance();
        }
        result
    }
}

impl<A, R, G, T> FusedIterator for SlotCalls<'_, A, R, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
}
