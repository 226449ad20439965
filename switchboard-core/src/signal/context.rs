//! Emission Context
//!
//! Tracks which slots are currently executing on this thread.
//!
//! # Implementation
//!
//! A thread-local stack holds one frame per slot invocation in progress.
//! The emission engine pushes a frame right before calling a slot and the
//! returned guard pops it afterwards, even if the slot panics. Recursive
//! emissions simply stack further frames, so the stack depth is the current
//! nesting level of slot calls.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::slot::{SignalId, SlotKey};

thread_local! {
    static EMISSION_STACK: RefCell<Vec<EmissionFrame>> = const { RefCell::new(Vec::new()) };
}

/// One slot invocation in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmissionFrame {
    /// Signal being emitted.
    pub signal: SignalId,
    /// Slot being invoked.
    pub slot: SlotKey,
}

/// Guard that pops its frame when dropped.
///
/// Only the emission engine creates these; the associated functions let any
/// code ask whether it runs inside a slot.
///
/// # Example
///
/// ```
/// use switchboard_core::{EmissionContext, RunAll, Signal};
///
/// let signal: Signal<(), (), RunAll> = Signal::new();
/// let id = signal.id();
/// signal.connect(move |_: &()| {
///     assert!(EmissionContext::is_emitting());
///     assert_eq!(EmissionContext::current().map(|f| f.signal), Some(id));
/// });
///
/// signal.emit(&());
/// assert!(!EmissionContext::is_emitting());
/// ```
#[derive(Debug)]
pub struct EmissionContext {
    frame: EmissionFrame,
    // Frames belong to the thread that pushed them.
    _not_send: PhantomData<*const ()>,
}

impl EmissionContext {
    pub(crate) fn enter(signal: SignalId, slot: SlotKey) -> Self {
        let frame = EmissionFrame { signal, slot };
        EMISSION_STACK.with(|stack| stack.borrow_mut().push(frame));
        Self {
            frame,
            _not_send: PhantomData,
        }
    }

    /// Whether a slot is executing on this thread.
    pub fn is_emitting() -> bool {
        EMISSION_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Number of nested slot invocations on this thread.
    pub fn depth() -> usize {
        EMISSION_STACK.with(|stack| stack.borrow().len())
    }

    /// The innermost slot invocation, if any.
    pub fn current() -> Option<EmissionFrame> {
        EMISSION_STACK.with(|stack| stack.borrow().last().copied())
    }

    /// Whether any slot of `signal` is executing on this thread.
    pub fn is_emitting_signal(signal: SignalId) -> bool {
        EMISSION_STACK.with(|stack| stack.borrow().iter().any(|frame| frame.signal == signal))
    }
}

impl Drop for EmissionContext {
    fn drop(&mut self) {
        EMISSION_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame, self.frame,
                    "EmissionContext mismatch: expected {:?}, got {:?}",
                    self.frame, frame
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_current_slot() {
        let signal = SignalId::new();
        let slot = SlotKey::new(2, 0);

        assert!(!EmissionContext::is_emitting());
        assert!(EmissionContext::current().is_none());

        {
            let _ctx = EmissionContext::enter(signal, slot);

            assert!(EmissionContext::is_emitting());
            assert_eq!(EmissionContext::current(), Some(EmissionFrame { signal, slot }));
            assert!(EmissionContext::is_emitting_signal(signal));
        }

        assert!(!EmissionContext::is_emitting());
        assert!(!EmissionContext::is_emitting_signal(signal));
    }

    #[test]
    fn nested_contexts() {
        let outer = SignalId::new();
        let inner = SignalId::new();

        {
            let _ctx1 = EmissionContext::enter(outer, SlotKey::new(0, 0));
            assert_eq!(EmissionContext::depth(), 1);

            {
                let _ctx2 = EmissionContext::enter(inner, SlotKey::new(1, 0));
                assert_eq!(EmissionContext::depth(), 2);
                assert_eq!(EmissionContext::current().map(|f| f.signal), Some(inner));
                assert!(EmissionContext::is_emitting_signal(outer));
            }

            // After inner context drops, outer should be current
            assert_eq!(EmissionContext::current().map(|f| f.signal), Some(outer));
        }

        assert_eq!(EmissionContext::depth(), 0);
    }
}
