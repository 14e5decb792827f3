//! Cancellable one-shot timers
//!
//! Device machines never sleep. They start timers through a [`Scheduler`]
//! and receive them back as events. A fired timer is only acted on if
//! [`Scheduler::complete`] accepts it, which gives every timer fire-once
//! semantics even when a cancel races the firing task.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle for a started timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Start, cancel and fire-once bookkeeping for timers carrying a `T`
pub trait Scheduler<T> {
    /// Start a timer that fires once after `delay`
    fn start(&mut self, delay: Duration, timer: T) -> TimerId;

    /// Cancel a pending timer
    ///
    /// Returns false if it already fired or was cancelled.
    fn cancel(&mut self, id: TimerId) -> bool;

    /// Claim a fired timer
    ///
    /// Returns true exactly once per started timer, and never for a
    /// cancelled one.
    fn complete(&mut self, id: TimerId) -> bool;
}

/// A timer delivered back to the owning event loop
#[derive(Debug)]
pub struct Fired<T> {
    pub id: TimerId,
    pub timer: T,
}

/// Scheduler backed by tokio sleep tasks
///
/// Each fired timer is posted on the channel given at construction.
pub struct TokioScheduler<T> {
    next: u64,
    tx: mpsc::UnboundedSender<Fired<T>>,
    live: HashMap<TimerId, JoinHandle<()>>,
}

impl<T> TokioScheduler<T> {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Fired<T>>) -> Self {
        Self {
            next: 0,
            tx,
            live: HashMap::new(),
        }
    }

    /// Channel pair plus scheduler, for a device loop
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Fired<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Number of timers started but not yet completed or cancelled
    #[must_use]
    pub fn pending(&self) -> usize {
        self.live.len()
    }
}

impl<T: Send + 'static> Scheduler<T> for TokioScheduler<T> {
    fn start(&mut self, delay: Duration, timer: T) -> TimerId {
        self.next += 1;
        let id = TimerId(self.next);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the loop is shutting down
            let _ = tx.send(Fired { id, timer });
        });
        self.live.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        self.live.remove(&id).is_some_and(|handle| {
            handle.abort();
            true
        })
    }

    fn complete(&mut self, id: TimerId) -> bool {
        self.live.remove(&id).is_some()
    }
}

impl<T> Drop for TokioScheduler<T> {
    fn drop(&mut self) {
        for (_, handle) in self.live.drain() {
            handle.abort();
        }
    }
}

/// Scheduler on a virtual clock
///
/// Nothing fires on its own; the driver pulls due timers with
/// [`ManualScheduler::pop_due`] and feeds them to the machine.
#[derive(Debug)]
pub struct ManualScheduler<T> {
    now: Duration,
    next: u64,
    queue: BTreeMap<(Duration, TimerId), T>,
    live: HashSet<TimerId>,
}

impl<T> Default for ManualScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ManualScheduler<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next: 0,
            queue: BTreeMap::new(),
            live: HashSet::new(),
        }
    }

    /// Current virtual time
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Timers queued and not yet popped
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Deadline of the earliest queued timer
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Pop the earliest timer due at or before `until`
    ///
    /// The clock moves forward to that timer's deadline.
    pub fn pop_due(&mut self, until: Duration) -> Option<(TimerId, T)> {
        let key = *self.queue.keys().next()?;
        if key.0 > until {
            return None;
        }
        let timer = self.queue.remove(&key)?;
        self.now = self.now.max(key.0);
        Some((key.1, timer))
    }

    /// Move the clock forward without firing anything
    pub fn advance_to(&mut self, at: Duration) {
        self.now = self.now.max(at);
    }
}

impl<T> Scheduler<T> for ManualScheduler<T> {
    fn start(&mut self, delay: Duration, timer: T) -> TimerId {
        self.next += 1;
        let id = TimerId(self.next);
        self.queue.insert((self.now + delay, id), timer);
        self.live.insert(id);
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        self.queue.retain(|(_, queued), _| *queued != id);
        self.live.remove(&id)
    }

    fn complete(&mut self, id: TimerId) -> bool {
        self.live.remove(&id)
    }
}
