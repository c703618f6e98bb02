//! # Relay: event dispatch, completion tracking and result reconciliation.
//!
//! The [`Relay`] owns the frozen plugin registry, the dispatcher, the completion
//! tracker and the background loops. It is assembled by
//! [`RelayBuilder`](crate::RelayBuilder).
//!
//! ## High-level architecture
//! ```text
//! Relay::dispatch(ev) ──► Dispatcher
//!                           ├─► PluginRuntime[0].enqueue ──► worker 0 ──► handler
//!                           ├─► PluginRuntime[1].enqueue ──► worker 1 ──► handler
//!                           └─► WorkerPool: one DispatchTask per plugin (awaits ack)
//!                                   │
//!                                   ▼
//!                           Outstanding { (ts, seq) → tasks }
//!                                   │ every tracker_interval
//!                                   ▼
//!                           CompletionTracker ──► watermark (watch channel)
//!
//! ResultSource[i] ──(every results_interval)──► ResultSinks ──► ReconcileWriter ──► MetadataStore
//!
//! Shutdown path:
//!   runtime_token.cancel()  → plugin workers, tracker, pollers, writer
//!   pool.close()            → dispatch tasks waiting for a slot finish as cancelled
//!   join loops within grace → Ok | RuntimeError::GraceExceeded { stuck }
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use relayvisor::{
//!     Config, DomainEvent, EventPayload, EventType, HandlerError, HandlerTable, Plugin,
//!     RegistryError, Relay, VmDetails,
//! };
//!
//! struct Inventory;
//!
//! #[async_trait::async_trait]
//! impl Plugin for Inventory {
//!     fn name(&self) -> &str { "inventory" }
//!
//!     fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
//!         HandlerTable::builder("inventory")
//!             .on(EventType::DeployVm, |_ev| async { Ok::<_, HandlerError>(()) })
//!             .build()
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = Relay::builder(Config::default())
//!         .with_plugin(Arc::new(Inventory))
//!         .build()?;
//!
//!     let routed = relay
//!         .dispatch(DomainEvent::now(EventPayload::DeployVm(VmDetails::new("vm1"))))
//!         .await;
//!     assert_eq!(routed, 1);
//!
//!     relay.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::builder::RelayBuilder;
use crate::core::config::Config;
use crate::core::dispatcher::Dispatcher;
use crate::core::outstanding::Outstanding;
use crate::core::registry::PluginRegistry;
use crate::core::tracker::{CompletionTracker, CycleReport, Watermark};
use crate::error::RuntimeError;
use crate::events::DomainEvent;
use crate::results::ResultSinks;

/// A named background loop owned by the relay.
pub(crate) struct LoopHandle {
    pub(crate) name: String,
    pub(crate) join: JoinHandle<()>,
}

/// The assembled relay runtime.
pub struct Relay {
    cfg: Config,
    registry: Arc<PluginRegistry>,
    dispatcher: Dispatcher,
    outstanding: Arc<Outstanding>,
    tracker: Arc<CompletionTracker>,
    sinks: Option<ResultSinks>,
    runtime_token: CancellationToken,
    loops: Mutex<Vec<LoopHandle>>,
}

impl Relay {
    /// Starts building a relay with the given configuration.
    pub fn builder(cfg: Config) -> RelayBuilder {
        RelayBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        registry: Arc<PluginRegistry>,
        dispatcher: Dispatcher,
        outstanding: Arc<Outstanding>,
        tracker: Arc<CompletionTracker>,
        sinks: Option<ResultSinks>,
        runtime_token: CancellationToken,
        loops: Vec<LoopHandle>,
    ) -> Self {
        Self {
            cfg,
            registry,
            dispatcher,
            outstanding,
            tracker,
            sinks,
            runtime_token,
            loops: Mutex::new(loops),
        }
    }

    /// Hands an event to every interested plugin without waiting for them.
    ///
    /// Returns how many plugins received it; `0` means it was dropped and is
    /// not tracked.
    pub async fn dispatch(&self, event: DomainEvent) -> usize {
        if self.runtime_token.is_cancelled() {
            warn!(event = %event, "relay is shutting down, event dropped");
            return 0;
        }
        self.dispatcher.dispatch(event).await
    }

    /// Timestamp of the most recent event every interested plugin has finished with.
    pub fn last_fully_processed(&self) -> Watermark {
        self.tracker.last_fully_processed()
    }

    /// Receiver that observes every watermark advance.
    pub fn watch_watermark(&self) -> watch::Receiver<Watermark> {
        self.tracker.subscribe()
    }

    /// Number of dispatched events not yet retired by the tracker.
    pub async fn outstanding(&self) -> usize {
        self.outstanding.len().await
    }

    /// Runs one tracker walk now, outside the periodic schedule.
    pub async fn track_now(&self) -> CycleReport {
        self.tracker.run_cycle().await
    }

    /// The frozen plugin registry.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Result queues, if a metadata store was configured.
    ///
    /// Lets code outside the plugins publish results too.
    pub fn result_sinks(&self) -> Option<ResultSinks> {
        self.sinks.clone()
    }

    /// Configuration the relay was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Stops every loop and waits up to [`Config::grace`] for them.
    ///
    /// In-flight handlers complete; events still queued are settled as cancelled.
    /// Calling it again after a successful shutdown is a no-op.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        info!("relay shutdown requested");
        self.runtime_token.cancel();
        self.dispatcher.pool().close();

        let mut loops = self.loops.lock().await;
        let grace = self.cfg.grace;
        let done = async {
            while let Some(handle) = loops.first_mut() {
                if let Err(err) = (&mut handle.join).await {
                    warn!(name = %handle.name, error = %err, "loop ended abnormally");
                }
                loops.remove(0);
            }
        };
        let outcome = tokio::time::timeout(grace, done).await;
        match outcome {
            Ok(()) => {
                debug!("all loops stopped within grace");
                Ok(())
            }
            Err(_) => {
                let stuck: Vec<String> = loops
                    .iter()
                    .filter(|h| !h.join.is_finished())
                    .map(|h| h.name.clone())
                    .collect();
                warn!(?grace, ?stuck, "shutdown grace exceeded");
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HandlerError, RegistryError};
    use crate::events::{EventPayload, EventType, VmDetails};
    use crate::notify::recording::RecordingNotifier;
    use crate::plugins::{HandlerTable, Plugin};
    use crate::results::{ResultEnvelope, ResultSource, ResultSourceRef, ResultStatus, SubResult};
    use crate::store::{MemoryStore, Metadata};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;
    use tokio::sync::Notify as Gate;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn deploy(secs: i64) -> DomainEvent {
        DomainEvent::new(at(secs), EventPayload::DeployVm(VmDetails::new(format!("vm{secs}"))))
    }

    fn fast_config() -> Config {
        Config {
            tracker_interval: Duration::from_secs(3600),
            tracker_poll_timeout: Duration::from_millis(5),
            plugin_poll_interval: Duration::from_millis(20),
            grace: Duration::from_secs(2),
            ..Config::default()
        }
    }

    /// Handles deploys; waits for the gate when `gated` is set.
    struct Deployer {
        name: &'static str,
        gate: Option<Arc<Gate>>,
        exclusive: bool,
    }

    impl Deployer {
        fn open(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                gate: None,
                exclusive: false,
            })
        }

        fn gated(name: &'static str, gate: Arc<Gate>) -> Arc<Self> {
            Arc::new(Self {
                name,
                gate: Some(gate),
                exclusive: false,
            })
        }
    }

    #[async_trait]
    impl Plugin for Deployer {
        fn name(&self) -> &str {
            self.name
        }

        fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
            let gate = self.gate.clone();
            let handler = move |_ev: Arc<DomainEvent>| {
                let gate = gate.clone();
                async move {
                    if let Some(gate) = gate {
                        gate.notified().await;
                    }
                    Ok::<_, HandlerError>(())
                }
            };
            let table = HandlerTable::builder(self.name);
            if self.exclusive {
                table.on_exclusive(EventType::DeployVm, handler).build()
            } else {
                table.on(EventType::DeployVm, handler).build()
            }
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_event_without_consumers_is_not_tracked() {
        let relay = Relay::builder(fast_config())
            .with_plugin(Deployer::open("deployer"))
            .build()
            .unwrap();

        let ev = DomainEvent::new(at(1), EventPayload::UndeployVm(VmDetails::new("vm1")));
        assert_eq!(relay.dispatch(ev).await, 0);
        assert_eq!(relay.outstanding().await, 0);
        relay.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_watermark_waits_for_all_consumers() {
        let gate = Arc::new(Gate::new());
        let relay = Relay::builder(fast_config())
            .with_plugin(Deployer::open("fast"))
            .with_plugin(Deployer::gated("slow", Arc::clone(&gate)))
            .build()
            .unwrap();

        assert_eq!(relay.dispatch(deploy(10)).await, 2);
        settle().await;
        relay.track_now().await;
        assert_eq!(relay.last_fully_processed(), None);
        assert_eq!(relay.outstanding().await, 1);

        gate.notify_one();
        settle().await;
        let report = relay.track_now().await;
        assert_eq!(report.retired, 1);
        assert_eq!(relay.last_fully_processed(), Some(at(10)));
        assert_eq!(relay.outstanding().await, 0);

        relay.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_conflict_fails_build() {
        let owner = Arc::new(Deployer {
            name: "owner",
            gate: None,
            exclusive: true,
        });
        let err = Relay::builder(fast_config())
            .with_plugin(owner)
            .with_plugin(Deployer::open("intruder"))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "runtime_registry");
    }

    #[tokio::test]
    async fn test_shutdown_reports_stuck_plugin() {
        let gate = Arc::new(Gate::new());
        let cfg = Config {
            grace: Duration::from_millis(50),
            ..fast_config()
        };
        let relay = Relay::builder(cfg)
            .with_plugin(Deployer::gated("stuck", gate))
            .build()
            .unwrap();
        relay.dispatch(deploy(1)).await;
        settle().await;

        match relay.shutdown().await {
            Err(RuntimeError::GraceExceeded { stuck, .. }) => {
                assert_eq!(stuck, vec!["plugin:stuck".to_string()]);
            }
            other => panic!("expected GraceExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_is_dropped() {
        let relay = Relay::builder(fast_config())
            .with_plugin(Deployer::open("deployer"))
            .build()
            .unwrap();
        relay.shutdown().await.unwrap();
        assert_eq!(relay.dispatch(deploy(1)).await, 0);
        relay.shutdown().await.unwrap();
    }

    /// Publishes one fixed envelope per collection.
    struct BackupReporter;

    #[async_trait]
    impl ResultSource for BackupReporter {
        fn name(&self) -> &str {
            "backups"
        }

        async fn collect(&self, sinks: &crate::results::ResultSinks) -> Result<(), HandlerError> {
            let envelope = ResultEnvelope::new(
                "vm1",
                vec![
                    SubResult::new(at(1), ResultStatus::Done).with_size(100),
                    SubResult::new(at(2), ResultStatus::Failed),
                ],
            );
            sinks
                .publish(envelope)
                .await
                .map_err(|e| HandlerError::fail(e.to_string()))
        }
    }

    struct BackupPlugin;

    #[async_trait]
    impl Plugin for BackupPlugin {
        fn name(&self) -> &str {
            "backup"
        }

        fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
            HandlerTable::builder("backup")
                .on_exclusive(EventType::BackupVm, |_| async { Ok(()) })
                .build()
        }

        fn result_source(self: Arc<Self>) -> Result<Option<ResultSourceRef>, HandlerError> {
            Ok(Some(Arc::new(BackupReporter)))
        }
    }

    #[tokio::test]
    async fn test_result_source_feeds_store() {
        let store = Arc::new(MemoryStore::new("mem://api"));
        store
            .insert(
                "vm1",
                Metadata::from_value(serde_json::json!({ "metadata": {} })).unwrap(),
            )
            .await;
        let notifier = Arc::new(RecordingNotifier::new());
        let relay = Relay::builder(fast_config())
            .with_plugin(Arc::new(BackupPlugin))
            .with_store(store.clone())
            .with_notifier(notifier.clone())
            .build()
            .unwrap();

        let mut written = 0;
        for _ in 0..100 {
            settle().await;
            written = store.writes();
            if written > 0 {
                break;
            }
        }
        assert_eq!(written, 1);
        let doc = store.metadata("vm1").await.unwrap().to_value();
        let results = doc["metadata"]["backupResults"]["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1]["status"], "failed");
        assert!(relay.result_sinks().is_some());
        assert_eq!(notifier.len(), 0);

        relay.shutdown().await.unwrap();
    }
}
