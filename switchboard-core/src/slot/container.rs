//! Slot Container
//!
//! Ordered, optionally grouped storage of slot records.
//!
//! # Layout
//!
//! Records live in an arena of generation-tagged cells. On top of the arena
//! runs a single doubly linked list that holds every record in emission
//! order, so a cursor parked on one record can always find its successor,
//! whatever was inserted or erased around it in the meantime.
//!
//! Groups are contiguous runs of that list. The group table maps each group
//! key to the first and last record of its run and is kept sorted:
//!
//! ```text
//!   [Front] [Named(a)] [Named(b)] ... [Back]
//!      |        |          |             |
//!      v        v          v             v
//!   head <-> ... <-> ... <-> ... <-> ... <-> tail
//! ```
//!
//! The `Front` and `Back` pseudo-groups always exist; named groups are
//! created on first insert and dropped once their last record is erased.
//! Named groups are ordered by a user-supplied comparator, and two keys the
//! comparator calls equal name the same group.

use std::cmp::Ordering;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

use super::key::SlotKey;

/// Ordering predicate for named slot groups.
pub type GroupOrder<G> = Arc<dyn Fn(&G, &G) -> Ordering + Send + Sync>;

/// Where a slot goes relative to the other slots of its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    /// Before every slot already in the group.
    Front,
    /// After every slot already in the group.
    #[default]
    Back,
}

/// Internal group key. Ungrouped slots go to the `Front` or `Back`
/// pseudo-group depending on their [`Position`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum GroupKey<G> {
    Front,
    Named(G),
    Back,
}

impl<G> GroupKey<G> {
    /// The pseudo-group an ungrouped insert lands in.
    pub(crate) fn ungrouped(at: Position) -> Self {
        match at {
            Position::Front => GroupKey::Front,
            Position::Back => GroupKey::Back,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            GroupKey::Front => 0,
            GroupKey::Named(_) => 1,
            GroupKey::Back => 2,
        }
    }

    pub(crate) fn is_named(&self) -> bool {
        matches!(self, GroupKey::Named(_))
    }
}

/// Values stored in the container report whether they still count as
/// connected.
pub(crate) trait Liveness {
    fn is_live(&self) -> bool;
}

/// First and last arena index of one group's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Span {
    first: Option<usize>,
    last: Option<usize>,
}

impl Span {
    fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

struct Node<G, V> {
    value: V,
    group: GroupKey<G>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Cell<G, V> {
    generation: u32,
    node: Option<Node<G, V>>,
}

/// Arena-backed, group-ordered slot storage.
pub(crate) struct SlotContainer<G, V> {
    cells: Vec<Cell<G, V>>,
    free: Vec<usize>,
    groups: IndexMap<GroupKey<G>, Span>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    order: GroupOrder<G>,
}

impl<G, V> SlotContainer<G, V>
where
    G: Clone + Hash + Eq,
{
    /// Create an empty container with the given named-group ordering.
    pub(crate) fn new(order: GroupOrder<G>) -> Self {
        let mut groups = IndexMap::new();
        groups.insert(GroupKey::Front, Span::default());
        groups.insert(GroupKey::Back, Span::default());

        Self {
            cells: Vec::new(),
            free: Vec::new(),
            groups,
            head: None,
            tail: None,
            len: 0,
            order,
        }
    }

    /// Insert an ungrouped value at the front or back of the whole container.
    #[cfg(test)]
    pub(crate) fn insert(&mut self, value: V, at: Position) -> SlotKey {
        self.insert_with(GroupKey::ungrouped(at), at, |_| value)
    }

    /// Insert a value into a named group.
    #[cfg(test)]
    pub(crate) fn insert_grouped(&mut self, value: V, group: G, at: Position) -> SlotKey {
        self.insert_with(GroupKey::Named(group), at, |_| value)
    }

    /// Insert a value built from its own key.
    ///
    /// The key is reserved before `make` runs, so the value may embed a handle
    /// to itself.
    pub(crate) fn insert_with<F>(&mut self, group: GroupKey<G>, at: Position, make: F) -> SlotKey
    where
        F: FnOnce(SlotKey) -> V,
    {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.cells.push(Cell {
                    generation: 0,
                    node: None,
                });
                self.cells.len() - 1
            }
        };
        let key = SlotKey::new(index as u32, self.cells[index].generation);
        let value = make(key);

        let group_index = self.group_index_or_insert(&group);
        self.cells[index].node = Some(Node {
            value,
            group,
            prev: None,
            next: None,
        });

        let span = self.groups[group_index];
        match (at, span.first, span.last) {
            (Position::Front, Some(first), _) => self.link_before(index, first),
            (Position::Back, _, Some(last)) => self.link_after(index, last),
            _ => {
                // Empty group: attach next to the closest non-empty neighbour.
                let before = (0..group_index).rev().find_map(|i| self.groups[i].last);
                let after = (group_index + 1..self.groups.len()).find_map(|i| self.groups[i].first);
                match (before, after) {
                    (Some(prev), _) => self.link_after(index, prev),
                    (None, Some(next)) => self.link_before(index, next),
                    (None, None) => {
                        self.head = Some(index);
                        self.tail = Some(index);
                    }
                }
            }
        }

        let span = &mut self.groups[group_index];
        match at {
            Position::Front => {
                span.first = Some(index);
                span.last.get_or_insert(index);
            }
            Position::Back => {
                span.last = Some(index);
                span.first.get_or_insert(index);
            }
        }

        self.len += 1;
        key
    }

    /// Physically remove a value.
    ///
    /// Removing the last value of a named group also removes the group.
    /// Returns `None` if the key is stale.
    pub(crate) fn erase(&mut self, key: SlotKey) -> Option<V> {
        let index = self.resolve(key)?;
        let cell = &mut self.cells[index];
        let node = cell.node.take()?;
        cell.generation = cell.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;

        match node.prev {
            Some(prev) => self.set_next(prev, node.next),
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.set_prev(next, node.prev),
            None => self.tail = node.prev,
        }

        if let Some(group_index) = self.find_group(&node.group) {
            let span = &mut self.groups[group_index];
            if span.first == Some(index) && span.last == Some(index) {
                *span = Span::default();
            } else {
                if span.first == Some(index) {
                    span.first = node.next;
                }
                if span.last == Some(index) {
                    span.last = node.prev;
                }
            }
            if span.is_empty() && node.group.is_named() {
                self.groups.shift_remove_index(group_index);
            }
        }

        Some(node.value)
    }

    /// Look up a live value.
    pub(crate) fn get(&self, key: SlotKey) -> Option<&V> {
        let index = self.resolve(key)?;
        self.cells[index].node.as_ref().map(|node| &node.value)
    }

    /// Look up a live value mutably.
    pub(crate) fn get_mut(&mut self, key: SlotKey) -> Option<&mut V> {
        let index = self.resolve(key)?;
        self.cells[index].node.as_mut().map(|node| &mut node.value)
    }

    /// Group a live value belongs to.
    #[cfg(test)]
    pub(crate) fn group_of(&self, key: SlotKey) -> Option<&GroupKey<G>> {
        let index = self.resolve(key)?;
        self.cells[index].node.as_ref().map(|node| &node.group)
    }

    /// Key of the first value in storage order.
    pub(crate) fn first(&self) -> Option<SlotKey> {
        self.head.map(|index| self.key_at(index))
    }

    /// Key of the value after `key` in storage order.
    pub(crate) fn next(&self, key: SlotKey) -> Option<SlotKey> {
        let index = self.resolve(key)?;
        let next = self.cells[index].node.as_ref()?.next?;
        Some(self.key_at(next))
    }

    /// Iterate every stored value in storage order, live or not.
    pub(crate) fn iter(&self) -> Iter<'_, G, V> {
        Iter {
            container: self,
            cursor: self.head,
        }
    }

    /// Keys of one named group, in storage order.
    pub(crate) fn group_range(&self, group: &G) -> Vec<SlotKey> {
        let mut keys = Vec::new();
        let Some(index) = self.find_group(&GroupKey::Named(group.clone())) else {
            return keys;
        };
        let span = self.groups[index];

        let mut cursor = span.first;
        while let Some(index) = cursor {
            keys.push(self.key_at(index));
            if Some(index) == span.last {
                break;
            }
            cursor = self.cells[index].node.as_ref().and_then(|node| node.next);
        }
        keys
    }

    /// Number of physically stored values, including disconnected ones that
    /// are still pinned.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Number of named groups currently holding at least one value.
    pub(crate) fn named_group_count(&self) -> usize {
        self.groups.len() - 2
    }

    fn key_at(&self, index: usize) -> SlotKey {
        SlotKey::new(index as u32, self.cells[index].generation)
    }

    fn resolve(&self, key: SlotKey) -> Option<usize> {
        let cell = self.cells.get(key.index())?;
        (cell.generation == key.generation() && cell.node.is_some()).then_some(key.index())
    }

    fn compare(&self, lhs: &GroupKey<G>, rhs: &GroupKey<G>) -> Ordering {
        match (lhs, rhs) {
            (GroupKey::Named(a), GroupKey::Named(b)) => (self.order)(a, b),
            _ => lhs.rank().cmp(&rhs.rank()),
        }
    }

    /// Index of the first group not ordered before `group`.
    fn lower_bound(&self, group: &GroupKey<G>) -> usize {
        self.groups
            .partition_point(|existing, _| self.compare(existing, group) == Ordering::Less)
    }

    /// Index of the group `group` belongs to, matched by the comparator.
    fn find_group(&self, group: &GroupKey<G>) -> Option<usize> {
        let index = self.lower_bound(group);
        match self.groups.get_index(index) {
            Some((existing, _)) if self.compare(existing, group) == Ordering::Equal => Some(index),
            // Comparator disagrees with `Eq`; fall back to the stored key.
            _ => self.groups.get_index_of(group),
        }
    }

    fn group_index_or_insert(&mut self, group: &GroupKey<G>) -> usize {
        if let Some(index) = self.find_group(group) {
            return index;
        }
        let index = self.lower_bound(group);
        self.groups.shift_insert(index, group.clone(), Span::default());
        index
    }

    fn link_after(&mut self, index: usize, prev: usize) {
        let next = self.cells[prev].node.as_ref().and_then(|node| node.next);
        if let Some(node) = self.cells[index].node.as_mut() {
            node.prev = Some(prev);
            node.next = next;
        }
        self.set_next(prev, Some(index));
        match next {
            Some(next) => self.set_prev(next, Some(index)),
            None => self.tail = Some(index),
        }
    }

    fn link_before(&mut self, index: usize, next: usize) {
        let prev = self.cells[next].node.as_ref().and_then(|node| node.prev);
        if let Some(node) = self.cells[index].node.as_mut() {
            node.prev = prev;
            node.next = Some(next);
        }
        self.set_prev(next, Some(index));
        match prev {
            Some(prev) => self.set_next(prev, Some(index)),
            None => self.head = Some(index),
        }
    }

    fn set_next(&mut self, index: usize, next: Option<usize>) {
        debug_assert!(self.cells[index].node.is_some(), "linked cell {index} is vacant");
        if let Some(node) = self.cells[index].node.as_mut() {
            node.next = next;
        }
    }

    fn set_prev(&mut self, index: usize, prev: Option<usize>) {
        debug_assert!(self.cells[index].node.is_some(), "linked cell {index} is vacant");
        if let Some(node) = self.cells[index].node.as_mut() {
            node.prev = prev;
        }
    }
}

impl<G, V> SlotContainer<G, V>
where
    G: Clone + Hash + Eq,
    V: Liveness,
{
    /// Number of values that still count as connected.
    pub(crate) fn live_len(&self) -> usize {
        self.iter().filter(|(_, value)| value.is_live()).count()
    }
}

/// Storage-order iterator over `(key, value)` pairs.
pub(crate) struct Iter<'a, G, V> {
    container: &'a SlotContainer<G, V>,
    cursor: Option<usize>,
}

impl<'a, G, V> Iterator for Iter<'a, G, V>
where
    G: Clone + Hash + Eq,
{
    type Item = (SlotKey, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = self.container.cells[index].node.as_ref()?;
        self.cursor = node.next;
        Some((self.container.key_at(index), &node.value))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
