//! Timed actions and clock sources
//!
//! Reconnection retries and firmware chunk transfers are cooperative: instead
//! of sleeping inside a task they schedule an action and return. The client
//! loop sleeps until the earliest deadline and hands due actions back to their
//! owner, one at a time.
//!
//! Time comes from an injected [`Clock`] so tests can step it explicitly.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now()`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that follows tokio's time source
///
/// Matches `tokio::time::sleep_until`, including when time is paused in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Handle to a scheduled action, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Entry<A> {
    due: Instant,
    id: TimerId,
    action: A,
}

/// Queue of pending timed actions
///
/// Entries are kept sorted by due time; entries with the same due time fire
/// in scheduling order.
pub struct Scheduler<A> {
    entries: Vec<Entry<A>>,
    next_id: u64,
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule `action` to fire at `due`
    pub fn schedule_at(&mut self, due: Instant, action: A) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let pos = self.entries.partition_point(|e| e.due <= due);
        self.entries.insert(pos, Entry { due, id, action });
        id
    }

    /// Cancel a pending action. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    /// Due time of the earliest pending action
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.due)
    }

    /// Remove and return every action due at or before `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<A> {
        let split = self.entries.partition_point(|e| e.due <= now);
        self.entries.drain(..split).map(|e| e.action).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Earliest of two optional deadlines
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
