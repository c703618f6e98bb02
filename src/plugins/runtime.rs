//! # Per-plugin runtime: inbound queue plus one worker.
//!
//! ## Architecture
//! ```text
//! Dispatcher::dispatch(ev)
//!     │ enqueue(Delivery { event, ack })
//!     ▼
//! [inbound queue] ──► worker (run) ──► HandlerTable::resolve(type)(event)
//!  (bounded or          │                   ├─ Ok    → ack(Ok)
//!   unbounded)          │                   ├─ Err   → notify, ack(Err)
//!                       │                   └─ panic → notify, ack(Err(Panicked))
//!                       └─ timeout(poll_interval) → re-check cancellation
//! ```
//!
//! ## Rules
//! - **Exactly one worker** per plugin; events are handled in enqueue order.
//! - **Non-blocking admission**: [`PluginRuntime::enqueue`] uses `try_send`; a full
//!   or closed queue settles the delivery as [`HandlerError::Rejected`].
//! - **Isolation**: a failing or panicking handler is reported and the worker
//!   moves on to the next event.
//! - **Cooperative cancellation**: an in-flight handler always completes; events
//!   still queued after cancellation are settled as [`HandlerError::Cancelled`].
//!
//! **Warning**: `AssertUnwindSafe` is used, so a handler that panics while holding
//! a lock on shared state may leave that state inconsistent.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, oneshot};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HandlerError, QueueError};
use crate::events::{DomainEvent, EventType};
use crate::notify::{Notification, NotifierRef};
use crate::plugins::handlers::{Capabilities, HandlerTable};
use crate::plugins::plugin::PluginRef;
use crate::queue::{self, QueueReceiver, QueueSender};

/// One event handed to one plugin, with the channel its outcome is reported on.
pub struct Delivery {
    event: Arc<DomainEvent>,
    ack: oneshot::Sender<Result<(), HandlerError>>,
}

impl Delivery {
    /// Creates a delivery and the receiver its outcome will arrive on.
    pub fn new(event: Arc<DomainEvent>) -> (Self, oneshot::Receiver<Result<(), HandlerError>>) {
        let (ack, outcome) = oneshot::channel();
        (Self { event, ack }, outcome)
    }

    /// The delivered event.
    pub fn event(&self) -> &Arc<DomainEvent> {
        &self.event
    }

    fn settle(self, outcome: Result<(), HandlerError>) {
        // Receiver gone means nobody tracks this delivery any more.
        let _ = self.ack.send(outcome);
    }
}

/// Lifecycle of a plugin worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PluginState {
    /// Registered, worker not started.
    Registered = 0,
    /// Worker running the startup hook.
    Started = 1,
    /// Worker polling its queue.
    Running = 2,
    /// Worker stopped after cancellation.
    Cancelled = 3,
}

impl PluginState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PluginState::Registered,
            1 => PluginState::Started,
            2 => PluginState::Running,
            _ => PluginState::Cancelled,
        }
    }
}

/// Runtime wrapper around one registered plugin.
pub struct PluginRuntime {
    name: Arc<str>,
    plugin: PluginRef,
    table: HandlerTable,
    sender: QueueSender<Delivery>,
    receiver: Mutex<Option<QueueReceiver<Delivery>>>,
    state: AtomicU8,
    cancel: CancellationToken,
    poll_interval: Duration,
    notifier: NotifierRef,
}

impl PluginRuntime {
    /// Builds the runtime: asks the plugin for its handler table and creates
    /// its inbound queue (`capacity = None` → unbounded).
    ///
    /// The cancellation token should be a child of the relay's token.
    pub fn new(
        plugin: PluginRef,
        capacity: Option<usize>,
        poll_interval: Duration,
        cancel: CancellationToken,
        notifier: NotifierRef,
    ) -> Result<Self, crate::error::RegistryError> {
        let table = Arc::clone(&plugin).handlers()?;
        let (sender, receiver) = queue::channel(capacity);
        Ok(Self {
            name: Arc::from(plugin.name()),
            plugin,
            table,
            sender,
            receiver: Mutex::new(Some(receiver)),
            state: AtomicU8::new(PluginState::Registered as u8),
            cancel,
            poll_interval,
            notifier,
        })
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// True if the plugin has a handler for this type.
    pub fn handles(&self, event_type: EventType) -> bool {
        self.table.handles(event_type)
    }

    /// Capability summary of the plugin's handler table.
    pub fn capabilities(&self) -> &Capabilities {
        self.table.capabilities()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PluginState {
        PluginState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PluginState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The wrapped plugin.
    pub fn plugin(&self) -> &PluginRef {
        &self.plugin
    }

    /// Admits a delivery into the inbound queue without waiting.
    ///
    /// - Unhandled type: ignored, settled as done.
    /// - Queue full or closed: settled as [`HandlerError::Rejected`] and notified.
    pub fn enqueue(&self, delivery: Delivery) {
        let event_type = delivery.event.event_type();
        if !self.handles(event_type) {
            debug!(plugin = %self.name, event = %delivery.event, "no handler for event type, ignored");
            delivery.settle(Ok(()));
            return;
        }
        if let Err((err, delivery)) = self.sender.try_send(delivery) {
            let reason = err.as_label();
            warn!(plugin = %self.name, event = %delivery.event, reason, "plugin queue refused event");
            let rejected = HandlerError::from(err);
            self.notifier.notify(Notification::cause(
                format!("plugin '{}' refused event {}", self.name, delivery.event),
                rejected.clone(),
            ));
            delivery.settle(Err(rejected));
        }
    }

    /// Requests the worker to stop after its current event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Worker loop. Returns once cancelled.
    ///
    /// Only the first call runs; later calls return immediately.
    pub async fn run(self: Arc<Self>) {
        let Some(mut rx) = self.receiver.lock().await.take() else {
            warn!(plugin = %self.name, "worker already started");
            return;
        };

        self.set_state(PluginState::Started);
        if let Err(err) = self.plugin.startup().await {
            self.notifier.notify(Notification::cause(
                format!("plugin '{}' failed to start up", self.name),
                err,
            ));
        }
        self.set_state(PluginState::Running);
        debug!(plugin = %self.name, "worker running");

        while !self.cancel.is_cancelled() {
            let polled = tokio::select! {
                _ = self.cancel.cancelled() => break,
                polled = time::timeout(self.poll_interval, rx.recv()) => polled,
            };
            match polled {
                Ok(Some(delivery)) => self.process(delivery).await,
                Ok(None) => break,
                Err(_elapsed) => continue,
            }
        }

        rx.close();
        let mut dropped = 0usize;
        while let Some(delivery) = rx.try_recv() {
            delivery.settle(Err(HandlerError::Cancelled));
            dropped += 1;
        }
        self.set_state(PluginState::Cancelled);
        info!(plugin = %self.name, dropped, "worker cancelled");
    }

    async fn process(&self, delivery: Delivery) {
        let event = Arc::clone(&delivery.event);
        let Some(handler) = self.table.resolve(event.event_type()) else {
            delivery.settle(Ok(()));
            return;
        };

        debug!(plugin = %self.name, event = %event, "handling event");
        let invocation = async { handler(Arc::clone(&event)).await };
        let outcome = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Panicked {
                info: panic_message(panic.as_ref()),
            }),
        };

        if let Err(err) = &outcome {
            warn!(plugin = %self.name, event = %event, error = %err, "handler failed");
            self.notifier.notify(Notification::cause(
                format!("plugin '{}' failed to process event {}", self.name, event),
                err.clone(),
            ));
        }
        delivery.settle(outcome);
    }
}

impl std::fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl From<QueueError> for HandlerError {
    fn from(err: QueueError) -> Self {
        HandlerError::Rejected {
            reason: err.as_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::events::{EventPayload, VmDetails};
    use crate::notify::recording::RecordingNotifier;
    use crate::plugins::plugin::Plugin;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    /// Records the `seq` field of every generic event it sees.
    #[derive(Default)]
    struct Sequencer {
        seen: std::sync::Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Plugin for Sequencer {
        fn name(&self) -> &str {
            "sequencer"
        }

        fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
            HandlerTable::builder("sequencer")
                .on(EventType::Generic, move |ev| {
                    let me = Arc::clone(&self);
                    async move {
                        if let EventPayload::Generic(map) = &ev.payload {
                            let seq = map.get("seq").and_then(Value::as_u64).unwrap_or_default();
                            if seq == 3 {
                                panic!("seq 3 is cursed");
                            }
                            if seq == 5 {
                                return Err(HandlerError::fail("seq 5 rejected"));
                            }
                            me.seen.lock().unwrap().push(seq);
                        }
                        Ok(())
                    }
                })
                .build()
        }
    }

    fn generic(seq: u64) -> Arc<DomainEvent> {
        let mut map = Map::new();
        map.insert("seq".into(), Value::from(seq));
        Arc::new(DomainEvent::now(EventPayload::Generic(map)))
    }

    fn runtime(
        plugin: Arc<dyn Plugin>,
        capacity: Option<usize>,
        notifier: Arc<RecordingNotifier>,
    ) -> Arc<PluginRuntime> {
        Arc::new(
            PluginRuntime::new(
                plugin,
                capacity,
                Duration::from_millis(50),
                CancellationToken::new(),
                notifier,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fifo_order_and_failure_isolation() {
        let plugin = Arc::new(Sequencer::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let rt = runtime(plugin.clone(), None, notifier.clone());
        let worker = tokio::spawn(Arc::clone(&rt).run());

        let mut outcomes = Vec::new();
        for seq in 0..8 {
            let (delivery, outcome) = Delivery::new(generic(seq));
            rt.enqueue(delivery);
            outcomes.push(outcome);
        }
        let mut results = Vec::new();
        for outcome in outcomes {
            results.push(outcome.await.unwrap());
        }

        assert_eq!(*plugin.seen.lock().unwrap(), vec![0, 1, 2, 4, 6, 7]);
        assert!(matches!(results[3], Err(HandlerError::Panicked { ref info }) if info == "seq 3 is cursed"));
        assert_eq!(results[5], Err(HandlerError::fail("seq 5 rejected")));
        assert_eq!(notifier.len(), 2);
        assert_eq!(rt.state(), PluginState::Running);

        rt.cancel();
        worker.await.unwrap();
        assert_eq!(rt.state(), PluginState::Cancelled);
    }

    #[tokio::test]
    async fn test_unhandled_type_is_settled_without_queueing() {
        let notifier = Arc::new(RecordingNotifier::new());
        let rt = runtime(Arc::new(Sequencer::default()), Some(1), notifier.clone());
        let event = Arc::new(DomainEvent::now(EventPayload::DeployVm(VmDetails::new("vm1"))));

        let (delivery, outcome) = Delivery::new(event);
        rt.enqueue(delivery);
        assert_eq!(outcome.await.unwrap(), Ok(()));
        assert_eq!(notifier.len(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::new());
        let rt = runtime(Arc::new(Sequencer::default()), Some(1), notifier.clone());

        let (first, _first_outcome) = Delivery::new(generic(0));
        rt.enqueue(first);
        let (second, second_outcome) = Delivery::new(generic(1));
        rt.enqueue(second);

        assert_eq!(
            second_outcome.await.unwrap(),
            Err(HandlerError::Rejected { reason: "full" })
        );
        assert_eq!(notifier.len(), 1);
        assert!(notifier.texts()[0].contains("sequencer"));
    }

    #[tokio::test]
    async fn test_cancel_settles_backlog_as_cancelled() {
        let notifier = Arc::new(RecordingNotifier::new());
        let rt = runtime(Arc::new(Sequencer::default()), None, notifier);

        let (delivery, outcome) = Delivery::new(generic(1));
        rt.enqueue(delivery);
        rt.cancel();
        Arc::clone(&rt).run().await;

        assert_eq!(outcome.await.unwrap(), Err(HandlerError::Cancelled));
        assert_eq!(rt.state(), PluginState::Cancelled);
    }

    struct Grumpy;

    #[async_trait]
    impl Plugin for Grumpy {
        fn name(&self) -> &str {
            "grumpy"
        }

        fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
            HandlerTable::builder("grumpy")
                .on_any(|_| async { Ok(()) })
                .build()
        }

        async fn startup(&self) -> Result<(), HandlerError> {
            Err(HandlerError::fail("no coffee"))
        }
    }

    #[tokio::test]
    async fn test_startup_failure_is_notified_and_worker_still_runs() {
        let notifier = Arc::new(RecordingNotifier::new());
        let rt = runtime(Arc::new(Grumpy), None, notifier.clone());
        let worker = tokio::spawn(Arc::clone(&rt).run());

        let (delivery, outcome) = Delivery::new(generic(9));
        rt.enqueue(delivery);
        assert_eq!(outcome.await.unwrap(), Ok(()));
        assert_eq!(notifier.texts(), vec!["plugin 'grumpy' failed to start up"]);

        rt.cancel();
        worker.await.unwrap();
    }
}
