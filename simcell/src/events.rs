use std::{cmp::Ordering, collections::BinaryHeap, time::Duration};

use crate::node::NodeId;
use crate::sockets::SocketId;
use crate::timer::TimerId;

/// Events that can be scheduled on the host's global queue.
///
/// An event names what must happen and for whom; the callback it may trigger
/// is looked up in the owning node's tables when the event is processed. An
/// event whose timer, socket, or node has been removed in the meantime is
/// stale and is skipped silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A virtual timer reached its expiry time.
    TimerFired {
        /// The node that owns the timer.
        node: NodeId,
        /// The timer that expired.
        timer: TimerId,
    },

    /// A virtual socket's readiness flags change, as decided by the
    /// transport simulation.
    SocketStatus {
        /// The node that owns the socket.
        node: NodeId,
        /// The socket whose flags change.
        socket: SocketId,
        /// New readable flag.
        readable: bool,
        /// New writable flag.
        writable: bool,
    },

    /// Ask the dispatch loop to exit, firing the loop-exit callback.
    Shutdown,
}

/// An event scheduled for execution at a specific simulated time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    time: Duration,
    event: Event,
    sequence: u64, // For deterministic ordering
}

impl ScheduledEvent {
    /// Creates a new scheduled event.
    pub fn new(time: Duration, event: Event, sequence: u64) -> Self {
        Self {
            time,
            event,
            sequence,
        }
    }

    /// Returns the scheduled execution time.
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Returns a reference to the event.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Consumes the scheduled event and returns the event.
    pub fn into_event(self) -> Event {
        self.event
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap, but we want earliest time first,
        // so the time comparison is reversed. Events at equal times fall
        // back to sequence numbers (also reversed), which is what gives
        // same-timestamp events their FIFO creation-order guarantee.
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// A priority queue scheduling events in chronological order.
///
/// Events are processed in time order, with sequence numbers breaking ties
/// deterministically so identical inputs replay identically.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
}

impl EventQueue {
    /// Creates a new empty event queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Schedules an event for execution.
    pub fn schedule(&mut self, event: ScheduledEvent) {
        self.heap.push(event);
    }

    /// Removes and returns the earliest scheduled event.
    pub fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    /// Returns a reference to the earliest scheduled event without removing it.
    pub fn peek_earliest(&self) -> Option<&ScheduledEvent> {
        self.heap.peek()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the number of events in the queue.
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_queue_ordering() {
        let mut queue = EventQueue::new();
        let node = NodeId(1);

        // Schedule events out of time order
        queue.schedule(ScheduledEvent::new(
            Duration::from_millis(300),
            Event::TimerFired {
                node,
                timer: TimerId(3),
            },
            2,
        ));
        queue.schedule(ScheduledEvent::new(
            Duration::from_millis(100),
            Event::TimerFired {
                node,
                timer: TimerId(1),
            },
            0,
        ));
        queue.schedule(ScheduledEvent::new(
            Duration::from_millis(200),
            Event::TimerFired {
                node,
                timer: TimerId(2),
            },
            1,
        ));

        let first = queue.pop_earliest().expect("event");
        assert_eq!(first.time(), Duration::from_millis(100));
        assert_eq!(
            first.event(),
            &Event::TimerFired {
                node,
                timer: TimerId(1)
            }
        );

        let second = queue.pop_earliest().expect("event");
        assert_eq!(second.time(), Duration::from_millis(200));

        let third = queue.pop_earliest().expect("event");
        assert_eq!(third.time(), Duration::from_millis(300));

        assert!(queue.is_empty());
    }

    #[test]
    fn same_time_fires_in_creation_order() {
        let mut queue = EventQueue::new();
        let expiry = Duration::from_millis(100);

        // Timers owned by different nodes, all expiring at the same instant.
        // Sequence numbers are handed out at creation, so creation order wins.
        for (sequence, node) in [(2u64, NodeId(3)), (0, NodeId(1)), (1, NodeId(2))] {
            queue.schedule(ScheduledEvent::new(
                expiry,
                Event::TimerFired {
                    node,
                    timer: TimerId(sequence + 1),
                },
                sequence,
            ));
        }

        let order: Vec<NodeId> = std::iter::from_fn(|| queue.pop_earliest())
            .map(|scheduled| match scheduled.into_event() {
                Event::TimerFired { node, .. } => node,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();

        assert_eq!(order, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn shutdown_sorts_with_timers() {
        let mut queue = EventQueue::new();
        queue.schedule(ScheduledEvent::new(
            Duration::from_millis(50),
            Event::Shutdown,
            1,
        ));
        queue.schedule(ScheduledEvent::new(
            Duration::from_millis(10),
            Event::TimerFired {
                node: NodeId(1),
                timer: TimerId(1),
            },
            0,
        ));

        assert_eq!(
            queue.pop_earliest().map(ScheduledEvent::into_event),
            Some(Event::TimerFired {
                node: NodeId(1),
                timer: TimerId(1)
            })
        );
        assert_eq!(
            queue.pop_earliest().map(ScheduledEvent::into_event),
            Some(Event::Shutdown)
        );
    }
}
