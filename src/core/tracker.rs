//! # Completion tracker: retires outstanding events, advances the watermark.
//!
//! Runs every [`Config::tracker_interval`](crate::Config::tracker_interval),
//! independent of dispatch.
//!
//! ## Cycle
//! ```text
//! loop:
//!   (key, tasks) = outstanding.checkout_first()   ── none → done
//!   tasks.drain(poll_timeout)
//!     ├─ drained  → retire(key); watermark = max(watermark, key.timestamp); continue
//!     └─ pending  → staleness check; outstanding.checkin(key, tasks); stop
//! pressure check on outstanding.len()
//! ```
//!
//! ## Rules
//! - Entries are walked in ascending (timestamp, sequence) order and the walk
//!   stops at the **first** incomplete entry: a later event that already
//!   completed is not reflected until every earlier one is done.
//! - A failed task counts as done; failures never block retirement.
//! - The watermark only moves forward.
//! - Cycles never overlap: a second caller waits for the running walk.
//! - Nothing is ever evicted; pressure and staleness only raise notifications,
//!   once per crossing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::outstanding::{EventKey, Outstanding, OutstandingEntry};
use crate::notify::{Notification, NotifierRef};

/// Watermark value: `None` until the first event is fully processed.
pub type Watermark = Option<DateTime<Utc>>;

/// What one tracker cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    /// Entries retired this cycle.
    pub retired: usize,
    /// Key of the entry that stopped the walk, if any.
    pub blocked_at: Option<EventKey>,
}

/// Periodic completion tracker.
pub struct CompletionTracker {
    outstanding: Arc<Outstanding>,
    watermark: watch::Sender<Watermark>,
    poll_timeout: Duration,
    outstanding_alarm: Option<usize>,
    stale_alarm: Option<Duration>,
    notifier: NotifierRef,
    pressure_raised: AtomicBool,
    /// Sequence of the last entry reported as stale, plus one (`0` = none).
    stale_reported: AtomicU64,
    walk: Mutex<()>,
}

impl CompletionTracker {
    pub(crate) fn new(
        outstanding: Arc<Outstanding>,
        poll_timeout: Duration,
        outstanding_alarm: Option<usize>,
        stale_alarm: Option<Duration>,
        notifier: NotifierRef,
    ) -> Self {
        let (watermark, _) = watch::channel(None);
        Self {
            outstanding,
            watermark,
            poll_timeout,
            outstanding_alarm,
            stale_alarm,
            notifier,
            pressure_raised: AtomicBool::new(false),
            stale_reported: AtomicU64::new(0),
            walk: Mutex::new(()),
        }
    }

    /// Timestamp of the most recent event known to be fully processed.
    pub fn last_fully_processed(&self) -> Watermark {
        *self.watermark.borrow()
    }

    /// Receiver notified every time the watermark advances.
    pub fn subscribe(&self) -> watch::Receiver<Watermark> {
        self.watermark.subscribe()
    }

    /// Runs cycles every `interval` until `token` is cancelled.
    pub async fn run(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    if report.retired > 0 {
                        debug!(retired = report.retired, watermark = ?self.last_fully_processed(), "tracker cycle");
                    }
                }
            }
        }
        debug!("completion tracker stopped");
    }

    /// Runs one walk over the outstanding entries.
    pub async fn run_cycle(&self) -> CycleReport {
        let _walk = self.walk.lock().await;
        let mut report = CycleReport::default();
        while let Some((key, mut entry)) = self.outstanding.checkout_first().await {
            if entry.drain(self.poll_timeout).await {
                debug!(event = %entry.event(), "all processing of event complete");
                self.outstanding.retire(&key).await;
                self.advance(key.timestamp);
                report.retired += 1;
            } else {
                self.check_stale(&key, &entry);
                self.outstanding.checkin(key, entry).await;
                report.blocked_at = Some(key);
                break;
            }
        }
        self.check_pressure().await;
        report
    }

    fn advance(&self, timestamp: DateTime<Utc>) {
        self.watermark.send_if_modified(|current| match current {
            Some(mark) if *mark >= timestamp => false,
            _ => {
                *current = Some(timestamp);
                true
            }
        });
    }

    fn check_stale(&self, key: &EventKey, entry: &OutstandingEntry) {
        let Some(limit) = self.stale_alarm else {
            return;
        };
        let age = entry.age();
        if age <= limit {
            return;
        }
        let marker = key.seq + 1;
        if self.stale_reported.swap(marker, Ordering::AcqRel) == marker {
            return;
        }
        let pending = entry.pending_plugins().join(", ");
        warn!(event = %entry.event(), ?age, %pending, "oldest outstanding event is stale");
        self.notifier.notify(Notification::message(format!(
            "event {} outstanding for {:?}; still waiting on: {}",
            entry.event(),
            age,
            pending
        )));
    }

    async fn check_pressure(&self) {
        let Some(limit) = self.outstanding_alarm else {
            return;
        };
        let len = self.outstanding.len().await;
        if len > limit {
            if !self.pressure_raised.swap(true, Ordering::AcqRel) {
                warn!(outstanding = len, limit, "outstanding events above limit");
                self.notifier.notify(Notification::message(format!(
                    "{len} events outstanding, above the limit of {limit}"
                )));
            }
        } else {
            self.pressure_raised.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::WorkerPool;
    use crate::error::HandlerError;
    use crate::events::{DomainEvent, EventPayload, VmDetails};
    use crate::notify::recording::RecordingNotifier;
    use chrono::TimeZone;
    use tokio::sync::oneshot;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(secs: i64) -> Arc<DomainEvent> {
        Arc::new(DomainEvent::new(
            at(secs),
            EventPayload::DeployVm(VmDetails::new(format!("vm{secs}"))),
        ))
    }

    struct Harness {
        pool: WorkerPool,
        outstanding: Arc<Outstanding>,
        tracker: CompletionTracker,
        notifier: Arc<RecordingNotifier>,
        seq: u64,
    }

    impl Harness {
        fn new(alarm: Option<usize>, stale: Option<Duration>) -> Self {
            let outstanding = Arc::new(Outstanding::new());
            let notifier = Arc::new(RecordingNotifier::new());
            let tracker = CompletionTracker::new(
                Arc::clone(&outstanding),
                Duration::from_millis(5),
                alarm,
                stale,
                notifier.clone(),
            );
            Self {
                pool: WorkerPool::new(None),
                outstanding,
                tracker,
                notifier,
                seq: 0,
            }
        }

        /// Tracks an event whose `n` tasks finish when the returned senders fire.
        async fn track(&mut self, secs: i64, n: usize) -> Vec<oneshot::Sender<Result<(), HandlerError>>> {
            let mut senders = Vec::new();
            let mut tasks = Vec::new();
            for i in 0..n {
                let (tx, rx) = oneshot::channel();
                senders.push(tx);
                tasks.push(self.pool.submit(Arc::from(format!("p{i}")), async move {
                    rx.await.unwrap_or(Err(HandlerError::Cancelled))
                }));
            }
            let key = EventKey {
                timestamp: at(secs),
                seq: self.seq,
            };
            self.seq += 1;
            self.outstanding
                .insert(key, OutstandingEntry::new(event(secs), tasks))
                .await;
            senders
        }
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_watermark_waits_for_every_task() {
        let mut h = Harness::new(None, None);
        let mut senders = h.track(10, 3).await;

        senders.remove(0).send(Ok(())).unwrap();
        senders.remove(0).send(Err(HandlerError::fail("boom"))).unwrap();
        settle().await;
        let report = h.tracker.run_cycle().await;
        assert_eq!(report.retired, 0);
        assert_eq!(h.tracker.last_fully_processed(), None);
        assert_eq!(h.outstanding.len().await, 1);

        senders.remove(0).send(Ok(())).unwrap();
        settle().await;
        let report = h.tracker.run_cycle().await;
        assert_eq!(report.retired, 1);
        assert_eq!(h.tracker.last_fully_processed(), Some(at(10)));
        assert!(h.outstanding.is_empty().await);
    }

    #[tokio::test]
    async fn test_earlier_incomplete_event_blocks_later_one() {
        let mut h = Harness::new(None, None);
        let mut a = h.track(1, 1).await;
        let mut b = h.track(2, 1).await;

        b.remove(0).send(Ok(())).unwrap();
        settle().await;
        let report = h.tracker.run_cycle().await;
        assert_eq!(report.retired, 0);
        assert_eq!(report.blocked_at.map(|k| k.timestamp), Some(at(1)));
        assert_eq!(h.tracker.last_fully_processed(), None);

        a.remove(0).send(Ok(())).unwrap();
        settle().await;
        let report = h.tracker.run_cycle().await;
        assert_eq!(report.retired, 2);
        assert_eq!(h.tracker.last_fully_processed(), Some(at(2)));
    }

    #[tokio::test]
    async fn test_concurrent_cycles_do_not_skip_blocked_entry() {
        let mut h = Harness::new(None, None);
        let _a = h.track(1, 1).await;
        let mut b = h.track(2, 1).await;
        b.remove(0).send(Ok(())).unwrap();
        settle().await;

        let (first, second) = tokio::join!(h.tracker.run_cycle(), h.tracker.run_cycle());
        assert_eq!(first.retired + second.retired, 0);
        assert_eq!(first.blocked_at.map(|k| k.timestamp), Some(at(1)));
        assert_eq!(second.blocked_at.map(|k| k.timestamp), Some(at(1)));
        assert_eq!(h.tracker.last_fully_processed(), None);
        assert_eq!(h.outstanding.len().await, 2);
    }

    #[tokio::test]
    async fn test_entry_under_poll_still_counts_as_outstanding() {
        let mut h = Harness::new(None, None);
        let _pending = h.track(1, 1).await;

        let (report, len_during_poll) = tokio::join!(h.tracker.run_cycle(), async {
            tokio::task::yield_now().await;
            h.outstanding.len().await
        });
        assert_eq!(report.retired, 0);
        assert_eq!(len_during_poll, 1);
        assert_eq!(h.outstanding.len().await, 1);
    }

    #[tokio::test]
    async fn test_watermark_never_moves_backwards() {
        let mut h = Harness::new(None, None);
        let mut rx = h.tracker.subscribe();

        let mut late = h.track(50, 1).await;
        late.remove(0).send(Ok(())).unwrap();
        settle().await;
        h.tracker.run_cycle().await;
        assert_eq!(*rx.borrow_and_update(), Some(at(50)));

        // An older event dispatched afterwards retires without pulling the mark back.
        let mut early = h.track(5, 1).await;
        early.remove(0).send(Ok(())).unwrap();
        settle().await;
        assert_eq!(h.tracker.run_cycle().await.retired, 1);
        assert_eq!(h.tracker.last_fully_processed(), Some(at(50)));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_pressure_alarm_once_per_crossing() {
        let mut h = Harness::new(Some(1), None);
        let _a = h.track(1, 1).await;
        let _b = h.track(2, 1).await;

        h.tracker.run_cycle().await;
        h.tracker.run_cycle().await;
        assert_eq!(h.notifier.len(), 1);
        assert!(h.notifier.texts()[0].starts_with("2 events outstanding"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_alarm_names_pending_plugins() {
        let mut h = Harness::new(None, Some(Duration::from_secs(60)));
        let _pending = h.track(1, 2).await;

        h.tracker.run_cycle().await;
        assert_eq!(h.notifier.len(), 0);

        time::advance(Duration::from_secs(61)).await;
        h.tracker.run_cycle().await;
        h.tracker.run_cycle().await;
        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("p0, p1"), "{}", texts[0]);
    }
}
