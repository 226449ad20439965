//! Signal configuration.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::combiner::LastValue;
use crate::slot::{GroupOrder, SlotGroup};
use crate::threading::{SingleThreaded, ThreadingModel};

use super::shared::SignalCore;
use super::Signal;

/// Builder for signals that need a name, a custom combiner or a custom
/// group ordering.
///
/// # Example
///
/// ```
/// use switchboard_core::{CollectAll, Position, SignalBuilder};
///
/// // Higher priority runs first.
/// let signal = SignalBuilder::<(), &str, CollectAll, u8>::new()
///     .name("shutdown")
///     .group_order(|a: &u8, b: &u8| b.cmp(a))
///     .build();
///
/// signal.connect_group(1, |_: &()| "low");
/// signal.connect_group(9, |_: &()| "high");
///
/// assert_eq!(signal.name(), Some("shutdown"));
/// assert_eq!(signal.emit(&()), vec!["high", "low"]);
/// ```
pub struct SignalBuilder<A, R = (), C = LastValue, G = (), T = SingleThreaded>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    name: Option<String>,
    combiner: C,
    order: GroupOrder<G>,
    _marker: PhantomData<fn(&A) -> (R, T)>,
}

impl<A, R, C, G, T> SignalBuilder<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    C: Default,
    G: SlotGroup + Ord,
    T: ThreadingModel,
{
    /// Start from the default combiner and the natural group order.
    pub fn new() -> Self {
        Self::ordered_by(|a: &G, b: &G| a.cmp(b))
    }
}

impl<A, R, C, G, T> Default for SignalBuilder<A, R, C, G, T>
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

impl<A, R, C, G, T> SignalBuilder<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    C: Default,
    G: SlotGroup,
    T: ThreadingModel,
{
    /// Start from the default combiner and the given group order, for group
    /// keys without a natural order.
    pub fn ordered_by<F>(order: F) -> Self
    where
        F: Fn(&G, &G) -> Ordering + Send + Sync + 'static,
    {
        Self {
            name: None,
            combiner: C::default(),
            order: Arc::new(order),
            _marker: PhantomData,
        }
    }
}

impl<A, R, C, G, T> SignalBuilder<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    G: SlotGroup,
    T: ThreadingModel,
{
    /// Name shown in logs and in [`SignalStats`](crate::SignalStats).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the combiner, possibly with one of another type.
    pub fn combiner<C2>(self, combiner: C2) -> SignalBuilder<A, R, C2, G, T> {
        SignalBuilder {
            name: self.name,
            combiner,
            order: self.order,
            _marker: PhantomData,
        }
    }

    /// Order named groups with `order` instead of the default.
    pub fn group_order<F>(mut self, order: F) -> Self
    where
        F: Fn(&G, &G) -> Ordering + Send + Sync + 'static,
    {
        self.order = Arc::new(order);
        self
    }

    /// Create the signal.
    pub fn build(self) -> Signal<A, R, C, G, T> {
        let core = SignalCore::new(self.name, self.order);
        tracing::debug!(
            signal = %core.id(),
            name = core.name(),
            threading = T::NAME,
            "signal created"
        );
        Signal::from_parts(core, self.combiner)
    }
}

impl<A, R, C, G, T> fmt::Debug for SignalBuilder<A, R, C, G, T>
where
    A: 'static,
    R: 'static,
    C: fmt::Debug,
    G: SlotGroup,
    T: ThreadingModel,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBuilder")
            .field("name", &self.name)
            .field("combiner", &self.combiner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectAll, OptionalLastValue};

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum Phase {
        Late,
        Early,
    }

    #[test]
    fn builder_sets_name_and_combiner() {
        let signal = SignalBuilder::<i32, i32>::new()
            .name("counter")
            .combiner(OptionalLastValue)
            .build();
        signal.connect(|x: &i32| x + 1);

        assert_eq!(signal.name(), Some("counter"));
        assert_eq!(signal.emit(&1), Some(2));
        assert_eq!(signal.stats().name.as_deref(), Some("counter"));
    }

    #[test]
    fn ordered_by_supports_unordered_group_keys() {
        let rank = |p: &Phase| match p {
            Phase::Early => 0,
            Phase::Late => 1,
        };
        let signal = SignalBuilder::<(), &str, CollectAll, Phase>::ordered_by(move |a, b| {
            rank(a).cmp(&rank(b))
        })
        .build();

        signal.connect_group(Phase::Late, |_: &()| "late");
        signal.connect_group(Phase::Early, |_: &()| "early");

        assert_eq!(signal.emit(&()), vec!["early", "late"]);
    }

    #[test]
    fn comparator_equivalent_keys_form_one_group() {
        let signal = SignalBuilder::<(), &str, CollectAll, u32>::ordered_by(|a, b| {
            (a / 10).cmp(&(b / 10))
        })
        .build();

        signal.connect_group(11, |_: &()| "11a");
        signal.connect_group(12, |_: &()| "12");
        signal.connect_group(11, |_: &()| "11b");

        assert_eq!(signal.emit(&()), vec!["11a", "12", "11b"]);
        assert_eq!(signal.stats().groups, 1);
        assert_eq!(signal.disconnect_group(&15), 3);
        assert!(signal.is_empty());
    }
}
