//! # Outstanding events: dispatched, not yet fully processed.
//!
//! A `BTreeMap` ordered by [`EventKey`] (event timestamp, then dispatch sequence)
//! behind a `tokio::sync::Mutex`. The dispatcher inserts; the tracker checks out
//! the pending tasks of the oldest entry, polls them **without holding the
//! lock**, then either retires the entry or checks the tasks back in. The entry
//! itself stays in the map meanwhile, so it keeps counting as outstanding and
//! keeps its place at the head.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::core::pool::{DispatchTask, TaskPoll};
use crate::events::DomainEvent;

/// Ordering key of an outstanding entry.
///
/// Events sharing a timestamp are ordered by dispatch sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
    /// Dispatch sequence number.
    pub seq: u64,
}

/// One dispatched event and its still-pending tasks.
#[derive(Debug)]
pub struct OutstandingEntry {
    event: Arc<DomainEvent>,
    pending: VecDeque<DispatchTask>,
    since: Instant,
}

impl OutstandingEntry {
    pub(crate) fn new(event: Arc<DomainEvent>, tasks: Vec<DispatchTask>) -> Self {
        Self {
            event,
            pending: tasks.into(),
            since: Instant::now(),
        }
    }

    /// The dispatched event.
    pub fn event(&self) -> &Arc<DomainEvent> {
        &self.event
    }

    /// Plugins whose task has not reported yet.
    pub fn pending_plugins(&self) -> Vec<&str> {
        self.pending.iter().map(DispatchTask::plugin).collect()
    }

    /// Time since the event was dispatched.
    pub fn age(&self) -> Duration {
        self.since.elapsed()
    }

    /// Moves the pending tasks into a detached copy, leaving this entry empty.
    fn detach(&mut self) -> Self {
        Self {
            event: Arc::clone(&self.event),
            pending: std::mem::take(&mut self.pending),
            since: self.since,
        }
    }

    /// Polls pending tasks in order, each with a bounded wait.
    ///
    /// Finished tasks (success or failure) are removed; the first one still
    /// running stops the poll. Returns `true` once nothing is pending.
    pub(crate) async fn drain(&mut self, wait: Duration) -> bool {
        while let Some(task) = self.pending.front_mut() {
            match task.poll_for(wait).await {
                TaskPoll::Done(Ok(())) => {}
                TaskPoll::Done(Err(err)) => {
                    warn!(plugin = task.plugin(), event = %self.event, error = %err, "dispatch task failed");
                }
                TaskPoll::Pending => return false,
            }
            self.pending.pop_front();
        }
        true
    }
}

/// Outstanding entries ordered by [`EventKey`].
#[derive(Debug, Default)]
pub struct Outstanding {
    entries: Mutex<BTreeMap<EventKey, OutstandingEntry>>,
}

impl Outstanding {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, key: EventKey, entry: OutstandingEntry) {
        self.entries.lock().await.insert(key, entry);
    }

    /// Checks out the pending tasks of the oldest entry.
    ///
    /// The entry stays in the map. Only one walker may hold a checkout at a
    /// time; the tracker serializes its cycles for that.
    pub(crate) async fn checkout_first(&self) -> Option<(EventKey, OutstandingEntry)> {
        let mut entries = self.entries.lock().await;
        let mut first = entries.first_entry()?;
        let key = *first.key();
        Some((key, first.get_mut().detach()))
    }

    /// Returns tasks still pending after a [`checkout_first`](Self::checkout_first).
    pub(crate) async fn checkin(&self, key: EventKey, entry: OutstandingEntry) {
        if let Some(slot) = self.entries.lock().await.get_mut(&key) {
            slot.pending = entry.pending;
        }
    }

    /// Removes a fully processed entry.
    pub(crate) async fn retire(&self, key: &EventKey) {
        self.entries.lock().await.remove(key);
    }

    /// Number of outstanding entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True if nothing is outstanding.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
