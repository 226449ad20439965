//! Identifiers for signals and slot records.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a signal.
///
/// Each signal gets a process-wide unique ID when it is built. The ID shows up
/// in log fields and in [`EmissionContext`](crate::EmissionContext) entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(u64);

impl SignalId {
    /// Generate a new unique signal ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig#{}", self.0)
    }
}

/// Stable handle to a slot record inside one signal's arena.
///
/// The index names an arena cell; the generation distinguishes successive
/// records that reuse the same cell. A key whose generation no longer matches
/// the cell is expired, so every lookup through a stale
/// [`Connection`](crate::Connection) is an O(1) miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_ids_are_unique() {
        let id1 = SignalId::new();
        let id2 = SignalId::new();
        let id3 = SignalId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn slot_keys_differ_by_generation() {
        let old = SlotKey::new(3, 0);
        let reused = SlotKey::new(3, 1);

        assert_eq!(old.index(), reused.index());
        assert_ne!(old, reused);
        assert_eq!(reused.to_string(), "3v1");
    }
}
