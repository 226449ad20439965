//! Threading Policy
//!
//! Every signal picks one of two threading models through a type parameter:
//!
//! - [`SingleThreaded`]: no locking at all. The signal is `!Send`/`!Sync`,
//!   slots may capture `Rc` and `RefCell`, and the only reentrancy is a slot
//!   calling back into the signal on the same stack.
//!
//! - [`MultiThreaded`]: all mutation and emission go through one
//!   **recursive** mutex per signal. The same thread may re-enter (recursive
//!   emission, or a slot that connects/disconnects on its own signal) while
//!   other threads block until the lock is released. Slots must be
//!   `Send + Sync`.
//!
//! # Two Lock Flavors
//!
//! Both models are driven through the same entry point, [`ThreadingModel::lock`].
//! A *local* lock is taken and dropped around one container operation. A
//! *call* lock is taken at the start of an emission and held until the
//! combiner returns; the emission also holds a strong reference to the signal
//! core, so the core's storage outlives the call even if the owning `Signal`
//! is dropped by another thread.
//!
//! Mutable state behind either lock lives in a `RefCell`. Borrows of that
//! cell are always short and are never held across a slot invocation, which
//! is what makes same-thread reentrancy legal.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::connection::{Connection, SlotOwner};
use crate::signal::SignalCore;
use crate::slot::{SlotFn, SlotGroup};

mod sealed {
    pub trait Sealed {}
}

/// Lock and sharing strategy for one signal and everything attached to it.
///
/// This trait is sealed; [`SingleThreaded`] and [`MultiThreaded`] are the
/// only implementations.
pub trait ThreadingModel: sealed::Sealed + Sized + 'static {
    /// Storage wrapper guarding a piece of shared state.
    type Lock<S>;

    /// Guard granting access to the state inside a [`Self::Lock`].
    type Guard<'a, S: 'a>: Deref<Target = S>;

    /// Type-erased view of a signal core, as held by connections and
    /// trackables.
    type Owner: ?Sized + SlotOwner;

    /// Type-erased stored callable.
    type Target<A: 'static, R: 'static>: ?Sized + SlotFn<A, R>;

    /// Name used in log fields.
    const NAME: &'static str;

    /// Wrap state in this model's lock.
    fn new_lock<S>(state: S) -> Self::Lock<S>;

    /// Acquire the lock. Reentrant on the owning thread.
    fn lock<'a, S: 'a>(lock: &'a Self::Lock<S>) -> Self::Guard<'a, S>;

    #[doc(hidden)]
    fn erase_core<A, R, G>(core: Weak<SignalCore<A, R, G, Self>>) -> Weak<Self::Owner>
    where
        A: 'static,
        R: 'static,
        G: SlotGroup;
}

/// No locking. Signals, connections and trackables stay on one thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleThreaded;

impl sealed::Sealed for SingleThreaded {}

impl ThreadingModel for SingleThreaded {
    type Lock<S> = S;
    type Guard<'a, S: 'a> = &'a S;
    type Owner = dyn SlotOwner;
    type Target<A: 'static, R: 'static> = dyn SlotFn<A, R>;

    const NAME: &'static str = "single_threaded";

    fn new_lock<S>(state: S) -> S {
        state
    }

    fn lock<'a, S: 'a>(lock: &'a S) -> &'a S {
        lock
    }

    fn erase_core<A, R, G>(core: Weak<SignalCore<A, R, G, Self>>) -> Weak<dyn SlotOwner>
    where
        A: 'static,
        R: 'static,
        G: SlotGroup,
    {
        core
    }
}

/// One recursive mutex per signal; slots and handles may cross threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiThreaded;

impl sealed::Sealed for MultiThreaded {}

impl ThreadingModel for MultiThreaded {
    type Lock<S> = ReentrantMutex<S>;
    type Guard<'a, S: 'a> = ReentrantMutexGuard<'a, S>;
    type Owner = dyn SlotOwner + Send + Sync;
    type Target<A: 'static, R: 'static> = dyn SlotFn<A, R> + Send + Sync;

    const NAME: &'static str = "multi_threaded";

    fn new_lock<S>(state: S) -> ReentrantMutex<S> {
        ReentrantMutex::new(state)
    }

    fn lock<'a, S: 'a>(lock: &'a ReentrantMutex<S>) -> ReentrantMutexGuard<'a, S> {
        lock.lock()
    }

    fn erase_core<A, R, G>(
        core: Weak<SignalCore<A, R, G, Self>>,
    ) -> Weak<dyn SlotOwner + Send + Sync>
    where
        A: 'static,
        R: 'static,
        G: SlotGroup,
    {
        core
    }
}

/// Conversion of a callable into the stored form of a threading model.
///
/// Implemented for every `Fn(&A) -> R + 'static` under [`SingleThreaded`]
/// and for every `Fn(&A) -> R + Send + Sync + 'static` under
/// [`MultiThreaded`].
pub trait IntoSlot<T: ThreadingModel, A: 'static, R: 'static> {
    /// Box the callable for storage in a slot record.
    fn into_target(self) -> Arc<T::Target<A, R>>;
}

impl<A, R, F> IntoSlot<SingleThreaded, A, R> for F
where
    A: 'static,
    R: 'static,
    F: Fn(&A) -> R + 'static,
{
    fn into_target(self) -> Arc<dyn SlotFn<A, R>> {
        Arc::new(self)
    }
}

impl<A, R, F> IntoSlot<MultiThreaded, A, R> for F
where
    A: 'static,
    R: 'static,
    F: Fn(&A) -> R + Send + Sync + 'static,
{
    fn into_target(self) -> Arc<dyn SlotFn<A, R> + Send + Sync> {
        Arc::new(self)
    }
}

/// Conversion of a callable that receives its own [`Connection`] into the
/// stored form of a threading model.
///
/// Backs [`Signal::connect_extended`](crate::Signal::connect_extended).
pub trait IntoExtendedSlot<T: ThreadingModel, A: 'static, R: 'static> {
    /// Bind the callable to its connection and box it.
    fn into_extended_target(self, conn: Connection<T>) -> Arc<T::Target<A, R>>;
}

impl<A, R, F> IntoExtendedSlot<SingleThreaded, A, R> for F
where
    A: 'static,
    R: 'static,
    F: Fn(&Connection<SingleThreaded>, &A) -> R + 'static,
{
    fn into_extended_target(self, conn: Connection<SingleThreaded>) -> Arc<dyn SlotFn<A, R>> {
        Arc::new(move |args: &A| self(&conn, args))
    }
}

impl<A, R, F> IntoExtendedSlot<MultiThreaded, A, R> for F
where
    A: 'static,
    R: 'static,
    F: Fn(&Connection<MultiThreaded>, &A) -> R + Send + Sync + 'static,
{
    fn into_extended_target(
        self,
        conn: Connection<MultiThreaded>,
    ) -> Arc<dyn SlotFn<A, R> + Send + Sync> {
        Arc::new(move |args: &A| self(&conn, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn single_threaded_lock_is_transparent() {
        let lock = SingleThreaded::new_lock(RefCell::new(1));
        *SingleThreaded::lock(&lock).borrow_mut() += 1;
        assert_eq!(*SingleThreaded::lock(&lock).borrow(), 2);
    }

    #[test]
    fn multi_threaded_lock_is_reentrant() {
        let lock = MultiThreaded::new_lock(RefCell::new(0));
        let outer = MultiThreaded::lock(&lock);
        {
            let inner = MultiThreaded::lock(&lock);
            *inner.borrow_mut() += 1;
        }
        *outer.borrow_mut() += 1;
        assert_eq!(*outer.borrow(), 2);
    }

    #[test]
    fn multi_threaded_lock_excludes_other_threads() {
        let lock = Arc::new(MultiThreaded::new_lock(RefCell::new(0)));
        let entered = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let guard = MultiThreaded::lock(&*lock);
        let handle = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                ready_tx.send(()).ok();
                let _guard = MultiThreaded::lock(&*lock);
                entered.store(true, Ordering::SeqCst);
            })
        };

        ready_rx.recv().ok();
        thread::sleep(Duration::from_millis(20));
        assert!(!entered.load(Ordering::SeqCst));

        drop(guard);
        handle.join().ok();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn into_slot_boxes_callables() {
        let single = IntoSlot::<SingleThreaded, i32, i32>::into_target(|x: &i32| x + 1);
        let multi = IntoSlot::<MultiThreaded, i32, i32>::into_target(|x: &i32| x * 2);

        assert_eq!(single.invoke(&1), 2);
        assert_eq!(multi.invoke(&4), 8);
    }
}
