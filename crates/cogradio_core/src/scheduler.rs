//! Discrete-event scheduling.
//!
//! Managers never block: "waiting" for a phase to finish means handing a
//! callback to a [`Scheduler`] and returning. The surrounding simulation owns
//! the scheduler; [`EventQueue`] is the single-threaded reference
//! implementation used by scenarios and tests.
//!
//! Events fire in timestamp order. Events sharing a timestamp fire in the
//! order they were scheduled.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use crate::time::SimTime;

/// Handle returned by [`Scheduler::schedule`], usable for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

/// A deferred action. Receives the scheduler so it can schedule follow-ups.
pub type Callback = Box<dyn FnOnce(&mut dyn Scheduler)>;

/// Simulated clock plus "call me back after D".
pub trait Scheduler {
    /// Current simulated time
    fn now(&self) -> SimTime;

    /// Run `callback` once `delay` has elapsed on the simulated clock
    fn schedule(&mut self, delay: Duration, callback: Callback) -> EventId;

    /// Drop a pending event. Unknown or already-fired ids are ignored.
    fn cancel(&mut self, id: EventId);
}

// =============================================================================
// Event Queue
// =============================================================================

struct PendingEvent {
    time: SimTime,
    id: EventId,
    callback: Callback,
}

impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for PendingEvent {}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap: earliest time first, then lowest id (FIFO)
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Min-heap discrete-event scheduler
pub struct EventQueue {
    now: SimTime,
    next_id: u64,
    heap: BinaryHeap<PendingEvent>,
    cancelled: HashSet<EventId>,
    executed: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_id: 0,
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            executed: 0,
        }
    }

    /// Number of events still queued (cancelled ones included until popped)
    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    /// Total callbacks executed so far
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Time of the earliest queued event
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|e| e.time)
    }

    /// Pop and run the next live event. Returns `false` when the queue is empty.
    pub fn step(&mut self) -> bool {
        while let Some(event) = self.heap.pop() {
            if self.cancelled.remove(&event.id) {
                continue;
            }
            self.now = event.time;
            self.executed += 1;
            (event.callback)(self);
            return true;
        }
        false
    }

    /// Run every event with timestamp `<= horizon`, then advance the clock
    /// to `horizon`. Returns the number of callbacks executed.
    pub fn run_until(&mut self, horizon: SimTime) -> u64 {
        let start = self.executed;
        while let Some(t) = self.peek_time() {
            if t > horizon {
                break;
            }
            self.step();
        }
        if horizon > self.now {
            self.now = horizon;
        }
        self.executed - start
    }

    /// Run at most `n` events. Returns how many ran.
    pub fn run_steps(&mut self, n: usize) -> usize {
        (0..n).take_while(|_| self.step()).count()
    }
}

impl Scheduler for EventQueue {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, delay: Duration, callback: Callback) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.heap.push(PendingEvent {
            time: self.now + delay,
            id,
            callback,
        });
        id
    }

    fn cancel(&mut self, id: EventId) {
        if id.0 < self.next_id {
            self.cancelled.insert(id);
        }
    }
}
