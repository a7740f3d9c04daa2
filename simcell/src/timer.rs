//! Per-node virtual timers.
//!
//! A timer is one-shot: `Pending -> Fired` (removed, callback invoked once)
//! or `Pending -> Destroyed` (removed, callback never invoked). The table
//! only tracks pending entries; the global event queue carries the matching
//! `TimerFired` events, and an event whose entry has already been taken is
//! stale and skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::module::TimerCallback;

/// Identifies a timer within its owning node.
///
/// Ids are handed out monotonically per node and never reused, so an id is
/// unique among the node's pending timers for the node's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl TimerId {
    /// Placeholder id passed to callbacks not fired by a timer, such as the
    /// loop-exit callback. Never allocated to a real timer.
    pub const NONE: TimerId = TimerId(0);
}

/// A pending timer: absolute expiry, callback, and the opaque argument word
/// handed back to the callback on expiry.
#[derive(Debug, Clone, Copy)]
pub struct TimerEntry {
    /// Absolute simulated time at which the timer expires.
    pub expires_at: Duration,
    /// Invoked once when the timer fires.
    pub callback: TimerCallback,
    /// Opaque argument passed through to the callback.
    pub arg: u64,
}

/// The pending timers of one virtual node.
#[derive(Debug, Default)]
pub struct TimerTable {
    next_id: u64,
    pending: BTreeMap<TimerId, TimerEntry>,
}

impl TimerTable {
    /// Inserts a fresh pending entry and returns its id.
    pub fn create(&mut self, expires_at: Duration, callback: TimerCallback, arg: u64) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.pending.insert(
            id,
            TimerEntry {
                expires_at,
                callback,
                arg,
            },
        );
        id
    }

    /// Removes a pending entry.
    ///
    /// Returns `false` when the id is unknown or the timer already fired;
    /// both are defined no-ops, never errors, so plugin cleanup paths stay
    /// simple. Self-cancellation from inside the timer's own callback lands
    /// here too, since the entry is taken before the callback runs.
    pub fn destroy(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Takes a pending entry out of the table for firing.
    ///
    /// Returns `None` for destroyed or already-fired timers, which is how
    /// stale queue events are recognized.
    pub fn take(&mut self, id: TimerId) -> Option<TimerEntry> {
        self.pending.remove(&id)
    }

    /// Returns `true` if the timer is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of pending timers.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PluginCtx;

    fn noop(_ctx: &mut PluginCtx<'_>, _timer: TimerId, _arg: u64) {}

    #[test]
    fn ids_are_fresh_and_never_none() {
        let mut table = TimerTable::default();
        let first = table.create(Duration::from_millis(1), noop, 0);
        let second = table.create(Duration::from_millis(1), noop, 0);
        assert_ne!(first, TimerId::NONE);
        assert_ne!(first, second);
    }

    #[test]
    fn destroy_is_idempotent_and_scoped() {
        let mut table = TimerTable::default();
        let keep = table.create(Duration::from_millis(5), noop, 1);
        let drop = table.create(Duration::from_millis(5), noop, 2);

        assert!(table.destroy(drop));
        // Destroying again, or destroying an id that never existed, is a no-op.
        assert!(!table.destroy(drop));
        assert!(!table.destroy(TimerId(999)));

        // Other pending timers are unaffected.
        assert!(table.is_pending(keep));
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn take_removes_the_entry() {
        let mut table = TimerTable::default();
        let id = table.create(Duration::from_millis(5), noop, 42);

        let entry = table.take(id).expect("pending entry");
        assert_eq!(entry.arg, 42);
        assert_eq!(entry.expires_at, Duration::from_millis(5));

        assert!(table.take(id).is_none());
        assert!(!table.destroy(id));
    }
}
