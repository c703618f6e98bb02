//! # relayvisor
//!
//! **Relayvisor** relays domain events to plugins and keeps track of which
//! events every interested plugin has finished with.
//!
//! Events come in one at a time. Each is handed to every plugin whose handler
//! table covers its type; every plugin consumes its own queue on its own worker.
//! A periodic tracker walks the dispatched events in order and publishes a
//! **watermark**: the timestamp of the latest event such that it, and every
//! event before it, has been processed by all interested plugins. Plugins may
//! also produce results asynchronously; those are reconciled into an external
//! metadata store.
//!
//! ## Architecture
//! ```text
//!                       DomainEvent
//!                            │
//!                            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Relay                                                            │
//! │  - PluginRegistry (event type → interested plugins, frozen)       │
//! │  - Dispatcher     (enqueue per plugin, one DispatchTask each)     │
//! │  - WorkerPool     (semaphore-bounded dispatch tasks)              │
//! │  - Outstanding    ((timestamp, seq) → pending tasks, BTreeMap)    │
//! └──────┬──────────────────┬──────────────────┬──────────────────┬───┘
//!        ▼                  ▼                  ▼                  │
//!  [queue] worker 0   [queue] worker 1   [queue] worker N         │
//!   handler(ev)        handler(ev)        handler(ev)             │
//!        │ ack              │ ack              │ ack               │
//!        └──────────────────┴──────────────────┴──► DispatchTask ──┘
//!                                                        │
//!                                                        ▼
//!                                  CompletionTracker (every tracker_interval)
//!                                          │ first incomplete entry stops the walk
//!                                          ▼
//!                                  watermark (tokio::sync::watch)
//!
//! ResultSource ──► ResultSinks ──► ReconcileWriter ──► MetadataStore
//!                                        └──► Notify (non-fatal problems)
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Events**        | Typed domain events with VM details.                     | [`DomainEvent`], [`EventPayload`]           |
//! | **Plugins**       | Explicit handler tables, one worker per plugin.          | [`Plugin`], [`HandlerTable`], [`PluginRuntime`] |
//! | **Relay**         | Dispatch, completion tracking, watermark, shutdown.      | [`Relay`], [`RelayBuilder`]                 |
//! | **Results**       | Periodic result sources, reconciliation into the store.  | [`ResultSource`], [`ResultEnvelope`]        |
//! | **Store**         | Metadata store contract and in-memory implementation.    | [`store::MetadataStore`], [`store::MemoryStore`] |
//! | **Notifications** | Non-fatal problems routed to the host application.       | [`Notify`], [`Notification`]                |
//! | **Errors**        | Typed errors for registration, handlers, store, runtime. | [`RegistryError`], [`HandlerError`], [`RuntimeError`] |
//! | **Configuration** | Centralized runtime settings.                            | [`Config`]                                  |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relayvisor::{
//!     Config, DomainEvent, EventPayload, EventType, HandlerError, HandlerTable, Plugin,
//!     RegistryError, Relay, VmDetails,
//! };
//!
//! struct Provisioner;
//!
//! #[async_trait::async_trait]
//! impl Plugin for Provisioner {
//!     fn name(&self) -> &str { "provisioner" }
//!
//!     fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
//!         HandlerTable::builder("provisioner")
//!             .on(EventType::DeployVm, |ev| async move {
//!                 let _vm = ev.vm().map(|vm| vm.name.clone());
//!                 Ok::<_, HandlerError>(())
//!             })
//!             .build()
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.tracker_interval = Duration::from_millis(50);
//!
//!     let relay = Relay::builder(cfg).with_plugin(Arc::new(Provisioner)).build()?;
//!
//!     let event = DomainEvent::now(EventPayload::DeployVm(VmDetails::new("vm1")));
//!     let ts = event.timestamp;
//!     relay.dispatch(event).await;
//!
//!     let mut watermark = relay.watch_watermark();
//!     watermark.wait_for(|mark| *mark >= Some(ts)).await?;
//!     assert_eq!(relay.last_fully_processed(), Some(ts));
//!
//!     relay.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod notify;
mod plugins;
mod policies;
mod queue;
mod results;

pub mod store;

// ---- Public re-exports ----

pub use crate::core::{
    Config, CycleReport, DispatchTask, EventKey, PluginRegistry, Relay, RelayBuilder, TaskPoll,
    Watermark,
};
pub use error::{HandlerError, QueueError, RegistryError, RuntimeError, StoreError};
pub use events::{DomainEvent, EventPayload, EventType, VmDetails};
pub use notify::{Notification, NotifierRef, Notify, TracingNotifier};
pub use plugins::{
    Capabilities, Delivery, HandlerFn, HandlerFuture, HandlerTable, HandlerTableBuilder, Plugin,
    PluginRef, PluginRuntime, PluginState,
};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use results::{
    ReconcileOutcome, ReconcileWriter, RestoreEnvelope, RestoreOutcome, ResultEnvelope,
    ResultSinks, ResultSource, ResultSourceRef, ResultStatus, SubResult, merge,
};
