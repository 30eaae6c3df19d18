// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cancellable one-shot timers over an explicit millisecond clock.
//!
//! Nothing here sleeps or spawns. The host owns the clock and asks for due
//! work with [`Scheduler::pop_due`]; deadlines that tie fire in the order
//! they were armed.
//!
//! ```
//! use understory_popup::timer::Scheduler;
//!
//! let mut timers: Scheduler<&str> = Scheduler::new();
//! let open = timers.schedule(200, "open");
//! let close = timers.schedule(100, "close");
//!
//! // Arming the competing timer cancels the other.
//! timers.cancel(open);
//!
//! assert_eq!(timers.pop_due(150), Some((close, "close")));
//! assert_eq!(timers.pop_due(1_000), None);
//! ```

use alloc::collections::BTreeMap;
use core::fmt;

use hashbrown::HashMap;

/// Handle to an armed timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Deadline-ordered set of pending one-shot tasks.
pub struct Scheduler<T> {
    next_seq: u64,
    queue: BTreeMap<(u64, u64), T>,
    deadlines: HashMap<TimerId, u64>,
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.queue.len())
            .field("next_deadline", &self.next_deadline())
            .finish_non_exhaustive()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Arm a task to fire at the absolute time `at` (milliseconds).
    pub fn schedule(&mut self, at: u64, task: T) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = TimerId(seq);
        self.queue.insert((at, seq), task);
        self.deadlines.insert(id, at);
        id
    }

    /// Disarm a timer, returning its task if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let at = self.deadlines.remove(&id)?;
        self.queue.remove(&(at, id.0))
    }

    /// Whether the timer is still armed.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Remove and return the earliest task whose deadline is `<= now`.
    pub fn pop_due(&mut self, now: u64) -> Option<(TimerId, T)> {
        let (&(at, seq), _) = self.queue.first_key_value()?;
        if at > now {
            return None;
        }
        let task = self.queue.remove(&(at, seq))?;
        let id = TimerId(seq);
        self.deadlines.remove(&id);
        Some((id, task))
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.keys().next().map(|&(at, _)| at)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no timers are armed.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
