use std::{cmp::Reverse, collections::BinaryHeap, time::Duration};

/// Monotonic show clock. Real deployments advance it from wall-clock deltas,
/// the command line simulation and tests advance it explicitly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackClock {
    now: Duration,
}

impl PlaybackClock {
    /// Creates a clock at zero.
    pub fn start() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn reset(&mut self) {
        self.now = Duration::ZERO;
    }

    /// Moves the clock forward by `delta`, saturating at the maximum.
    pub fn advance(&mut self, delta: Duration) {
        self.now = self.now.saturating_add(delta);
    }

    /// Moves the clock forward to `time`; earlier instants are ignored.
    pub fn advance_to(&mut self, time: Duration) {
        self.now = self.now.max(time);
    }
}

/// Index of a layer inside a show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub usize);

/// Identifies one armed rotation. A token is only honoured while its
/// generation matches the scheduler's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RotationToken {
    pub layer: LayerId,
    pub generation: u64,
}

/// A rotation that has been armed but has not fired yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRotation {
    pub token: RotationToken,
    pub due: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry<T> {
    due: Duration,
    sequence: u64,
    payload: T,
}

/// Min-heap of timed payloads.
///
/// Entries are never cancelled: whoever pops a payload decides whether it is
/// still current. Entries due at the same instant pop in insertion order.
#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<TimerEntry<T>>>,
    sequence: u64,
}

impl<T: Ord> TimerQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence: 0,
        }
    }

    /// Queues `payload` to become due at `due`.
    pub fn schedule(&mut self, due: Duration, payload: T) {
        let sequence = self.sequence;
        self.sequence += 1;
        self.heap.push(Reverse(TimerEntry {
            due,
            sequence,
            payload,
        }));
    }

    /// Pops the earliest entry due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        if self.heap.peek()?.0.due > now {
            return None;
        }
        self.heap.pop().map(|Reverse(entry)| (entry.due, entry.payload))
    }

    /// Returns the earliest due instant still queued.
    pub fn next_due(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(entry)| entry.due)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Returns the number of queued entries, stale ones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T: Ord> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a duration as `m:ss`, the way the timer overlay shows it.
pub fn format_countdown(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
