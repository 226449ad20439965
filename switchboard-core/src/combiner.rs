//! Combiners
//!
//! A combiner turns the lazy sequence of slot results produced by one
//! emission into the signal's return value. The sequence invokes a slot only
//! when the combiner advances to it, so a combiner that stops early leaves
//! the remaining slots uncalled.
//!
//! Any closure taking the boxed result sequence ([`BoxedResults`]) is a
//! combiner:
//!
//! ```
//! use switchboard_core::{BoxedResults, Signal};
//!
//! let first_big = |mut results: BoxedResults<'_, i32>| results.find(|r| *r > 50);
//! let signal: Signal<(), i32, _> = Signal::with_combiner(first_big);
//!
//! for i in 0..100 {
//!     signal.connect(move |_: &()| i);
//! }
//! assert_eq!(signal.emit(&()), Some(51));
//! ```

use crate::error::SignalError;

/// Reduces the results of one emission to a single value.
pub trait Combiner<R> {
    /// What an emission returns.
    type Output;

    /// Consume as much of `results` as needed and produce the output.
    fn combine<I>(&self, results: I) -> Self::Output
    where
        I: Iterator<Item = R>;
}

/// Result sequence as seen by a closure combiner.
pub type BoxedResults<'a, R> = Box<dyn Iterator<Item = R> + 'a>;

impl<R, O, F> Combiner<R> for F
where
    F: Fn(BoxedResults<'_, R>) -> O,
{
    type Output = O;

    fn combine<I>(&self, results: I) -> O
    where
        I: Iterator<Item = R>,
    {
        self(Box::new(results))
    }
}

/// Runs every slot and returns the last result.
///
/// Fails with [`SignalError::NoSlotsConnected`] when no slot was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastValue;

impl<R> Combiner<R> for LastValue {
    type Output = Result<R, SignalError>;

    fn combine<I>(&self, results: I) -> Self::Output
    where
        I: Iterator<Item = R>,
    {
        results.last().ok_or(SignalError::NoSlotsConnected)
    }
}

/// Runs every slot and returns the last result, or `None` if no slot was
/// called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionalLastValue;

impl<R> Combiner<R> for OptionalLastValue {
    type Output = Option<R>;

    fn combine<I>(&self, results: I) -> Option<R>
    where
        I: Iterator<Item = R>,
    {
        results.last()
    }
}

/// Runs every slot and discards the results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunAll;

impl<R> Combiner<R> for RunAll {
    type Output = ();

    fn combine<I>(&self, results: I)
    where
        I: Iterator<Item = R>,
    {
        results.for_each(drop);
    }
}

/// Runs every slot and collects the results in slot order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectAll;

impl<R> Combiner<R> for CollectAll {
    type Output = Vec<R>;

    fn combine<I>(&self, results: I) -> Vec<R>
    where
        I: Iterator<Item = R>,
    {
        results.collect()
    }
}

/// Runs every slot and returns the greatest result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Maximum;

impl<R: Ord> Combiner<R> for Maximum {
    type Output = Option<R>;

    fn combine<I>(&self, results: I) -> Option<R>
    where
        I: Iterator<Item = R>,
    {
        results.max()
    }
}
