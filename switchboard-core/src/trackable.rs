//! Trackable Objects
//!
//! A [`Trackable`] is a field any domain object can embed so that slots
//! depending on it are disconnected automatically when it is dropped.
//!
//! # Teardown
//!
//! Each trackable keeps a list of back-references `(signal, slot key)` to
//! the records that track it. On drop it first marks itself dying and takes
//! the list out from under its lock, then disconnects every referenced slot.
//! A disconnect tears the record down, and teardown tries to remove the
//! back-reference again; that call sees the dying flag and returns without
//! touching the list being walked.
//!
//! The trackable's lock is never held while a signal's lock is acquired, so
//! a signal tearing down a record and a trackable being dropped on another
//! thread cannot deadlock.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use crate::connection::SlotOwner;
use crate::slot::SlotKey;
use crate::threading::{SingleThreaded, ThreadingModel};

struct BackRef<T: ThreadingModel> {
    owner: Weak<T::Owner>,
    key: SlotKey,
}

impl<T: ThreadingModel> BackRef<T> {
    fn points_to(&self, owner: &Weak<T::Owner>, key: SlotKey) -> bool {
        self.key == key && same_owner::<T>(&self.owner, owner)
    }
}

fn same_owner<T: ThreadingModel>(a: &Weak<T::Owner>, b: &Weak<T::Owner>) -> bool {
    a.as_ptr().cast::<()>() == b.as_ptr().cast::<()>()
}

struct TrackState<T: ThreadingModel> {
    back_refs: SmallVec<[BackRef<T>; 4]>,
    dying: bool,
}

/// Shared state of a trackable. Slot records hold it weakly.
pub(crate) struct TrackableInner<T: ThreadingModel> {
    state: T::Lock<RefCell<TrackState<T>>>,
}

impl<T: ThreadingModel> TrackableInner<T> {
    fn new() -> Self {
        Self {
            state: T::new_lock(RefCell::new(TrackState {
                back_refs: SmallVec::new(),
                dying: false,
            })),
        }
    }

    /// Record that slot `key` of `owner` tracks this object.
    ///
    /// Refused once teardown has started.
    pub(crate) fn add_back_reference(&self, owner: Weak<T::Owner>, key: SlotKey) -> bool {
        let guard = T::lock(&self.state);
        let mut state = guard.borrow_mut();
        if state.dying {
            return false;
        }
        state.back_refs.push(BackRef { owner, key });
        true
    }

    /// Forget slot `key` of `owner`. A no-op while the object is dying.
    pub(crate) fn remove_back_reference(&self, owner: &Weak<T::Owner>, key: SlotKey) {
        let guard = T::lock(&self.state);
        let mut state = guard.borrow_mut();
        if state.dying {
            return;
        }
        if let Some(pos) = state.back_refs.iter().position(|r| r.points_to(owner, key)) {
            state.back_refs.swap_remove(pos);
        }
    }

    fn len(&self) -> usize {
        let guard = T::lock(&self.state);
        let len = guard.borrow().back_refs.len();
        len
    }
}

/// Embeddable lifetime token for automatic disconnection.
///
/// Slots built with [`Slot::track`](crate::Slot::track) are disconnected as
/// soon as any object they track is dropped. Cloning a `Trackable` produces
/// a fresh token with no slots attached: copying an object does not copy its
/// connections.
///
/// # Example
///
/// ```
/// use switchboard_core::{Signal, Slot, Trackable};
///
/// struct Listener {
///     tracker: Trackable,
/// }
///
/// let signal: Signal<()> = Signal::new();
/// let listener = Listener { tracker: Trackable::new() };
/// let conn = signal.connect_slot(Slot::new(|_: &()| {}).track(&listener.tracker));
///
/// drop(listener);
/// assert!(!conn.is_connected());
/// ```
pub struct Trackable<T: ThreadingModel = SingleThreaded> {
    inner: Arc<TrackableInner<T>>,
}

impl<T: ThreadingModel> Trackable<T> {
    /// Create a trackable with no slots attached.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackableInner::new()),
        }
    }

    /// Number of connected slots currently tracking this object.
    pub fn tracked_count(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn downgrade(&self) -> Weak<TrackableInner<T>> {
        Arc::downgrade(&self.inner)
    }
}

impl<T: ThreadingModel> Default for Trackable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ThreadingModel> Clone for Trackable<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: ThreadingModel> fmt::Debug for Trackable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trackable")
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

impl<T: ThreadingModel> Drop for Trackable<T> {
    fn drop(&mut self) {
        let guard = T::lock(&self.inner.state);
        let back_refs = {
            let mut state = guard.borrow_mut();
            state.dying = true;
            std::mem::take(&mut state.back_refs)
        };
        drop(guard);

        if back_refs.is_empty() {
            return;
        }
        tracing::debug!(slots = back_refs.len(), "trackable dropped, disconnecting slots");

        for back_ref in back_refs {
            if let Some(owner) = back_ref.owner.upgrade() {
                owner.disconnect(back_ref.key);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SlotState;
    use crate::slot::SignalId;
    use std::cell::RefCell as StdRefCell;

    /// Owner that records disconnect calls and tries to remove the
    /// back-reference again, like a real teardown does.
    struct RecordingOwner {
        disconnected: StdRefCell<Vec<SlotKey>>,
        inner: StdRefCell<Option<Weak<TrackableInner<SingleThreaded>>>>,
        me: StdRefCell<Weak<dyn SlotOwner>>,
    }

    impl SlotOwner for RecordingOwner {
        fn slot_state(&self, _key: SlotKey) -> SlotState {
            SlotState::Active
        }
        fn set_blocked(&self, _key: SlotKey, _blocked: bool) -> Option<bool> {
            None
        }
        fn disconnect(&self, key: SlotKey) -> bool {
            self.disconnected.borrow_mut().push(key);
            let inner = self.inner.borrow().as_ref().and_then(Weak::upgrade);
            if let Some(inner) = inner {
                inner.remove_back_reference(&self.me.borrow(), key);
            }
            true
        }
        fn signal_id(&self) -> SignalId {
            SignalId::default()
        }
    }

    fn owner() -> Arc<RecordingOwner> {
        let owner = Arc::new(RecordingOwner {
            disconnected: StdRefCell::new(Vec::new()),
            inner: StdRefCell::new(None),
            me: StdRefCell::new(Weak::<RecordingOwner>::new() as Weak<dyn SlotOwner>),
        });
        let erased: Arc<dyn SlotOwner> = owner.clone();
        *owner.me.borrow_mut() = Arc::downgrade(&erased);
        owner
    }

    fn weak(owner: &Arc<RecordingOwner>) -> Weak<dyn SlotOwner> {
        owner.me.borrow().clone()
    }

    #[test]
    fn back_references_are_counted() {
        let owner = owner();
        let t: Trackable = Trackable::new();

        assert!(t.inner.add_back_reference(weak(&owner), SlotKey::new(0, 0)));
        assert!(t.inner.add_back_reference(weak(&owner), SlotKey::new(1, 0)));
        assert_eq!(t.tracked_count(), 2);

        t.inner.remove_back_reference(&weak(&owner), SlotKey::new(0, 0));
        assert_eq!(t.tracked_count(), 1);
    }

    #[test]
    fn remove_matches_owner_and_key() {
        let a = owner();
        let b = owner();
        let t: Trackable = Trackable::new();
        let key = SlotKey::new(0, 0);

        t.inner.add_back_reference(weak(&a), key);
        t.inner.remove_back_reference(&weak(&b), key);
        assert_eq!(t.tracked_count(), 1);

        t.inner.remove_back_reference(&weak(&a), key);
        assert_eq!(t.tracked_count(), 0);
    }

    #[test]
    fn drop_disconnects_every_back_reference() {
        let owner = owner();
        let t: Trackable = Trackable::new();
        *owner.inner.borrow_mut() = Some(t.downgrade());

        t.inner.add_back_reference(weak(&owner), SlotKey::new(0, 0));
        t.inner.add_back_reference(weak(&owner), SlotKey::new(3, 1));
        drop(t);

        assert_eq!(
            *owner.disconnected.borrow(),
            vec![SlotKey::new(0, 0), SlotKey::new(3, 1)]
        );
    }

    #[test]
    fn dying_object_refuses_new_back_references() {
        let owner = owner();
        let t: Trackable = Trackable::new();
        let inner = t.downgrade();
        t.inner.add_back_reference(weak(&owner), SlotKey::new(0, 0));

        // Keep the inner alive past the drop to observe the dying flag.
        let strong = inner.upgrade();
        drop(t);

        let strong = strong.expect("inner kept alive");
        assert!(!strong.add_back_reference(weak(&owner), SlotKey::new(1, 0)));
        assert_eq!(strong.len(), 0);
    }

    #[test]
    fn clone_starts_empty() {
        let owner = owner();
        let t: Trackable = Trackable::new();
        t.inner.add_back_reference(weak(&owner), SlotKey::new(0, 0));

        let copy = t.clone();
        assert_eq!(copy.tracked_count(), 0);
        assert_eq!(t.tracked_count(), 1);
    }

    #[test]
    fn gone_owner_is_skipped() {
        let owner = owner();
        let t: Trackable = Trackable::new();
        t.inner.add_back_reference(weak(&owner), SlotKey::new(0, 0));

        drop(owner);
        drop(t);
    }
}
