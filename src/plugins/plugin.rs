//! # Core plugin trait
//!
//! `Plugin` is the extension point for consumers of domain events. Each plugin is
//! driven by a dedicated worker loop fed by its own inbound queue, owned by a
//! [`PluginRuntime`](crate::PluginRuntime).
//!
//! ## Contract
//! - Handlers may be slow (I/O, retries); they do **not** block dispatch nor
//!   other plugins.
//! - The handler table is requested once, at registration, and never changes.
//! - A plugin producing results for the metadata store exposes a
//!   [`ResultSource`](crate::ResultSource) through [`Plugin::result_source`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use relayvisor::{DomainEvent, EventType, HandlerError, HandlerTable, Plugin, RegistryError};
//!
//! struct Audit;
//!
//! impl Audit {
//!     async fn on_deploy(&self, ev: Arc<DomainEvent>) -> Result<(), HandlerError> {
//!         let _ = ev.vm();
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl Plugin for Audit {
//!     fn name(&self) -> &str { "audit" }
//!
//!     fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
//!         HandlerTable::builder("audit")
//!             .on(EventType::DeployVm, move |ev| {
//!                 let me = Arc::clone(&self);
//!                 async move { me.on_deploy(ev).await }
//!             })
//!             .build()
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HandlerError, RegistryError};
use crate::plugins::handlers::HandlerTable;
use crate::results::ResultSourceRef;

/// Contract for event-consuming plugins.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique plugin name (for logs, notifications and registry checks).
    fn name(&self) -> &str;

    /// Builds the plugin's handler table.
    ///
    /// Takes `Arc<Self>` so handler closures can keep the plugin alive.
    fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError>;

    /// Runs once in the worker before the first event is taken.
    ///
    /// A failure is notified; the worker keeps running.
    async fn startup(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Capacity of this plugin's inbound queue.
    ///
    /// `None` uses [`Config::plugin_queue_capacity`](crate::Config::plugin_queue_capacity);
    /// `Some(0)` forces an unbounded queue.
    fn queue_capacity(&self) -> Option<usize> {
        None
    }

    /// Result producer polled at [`Config::results_interval`](crate::Config::results_interval).
    ///
    /// An error is notified and the plugin runs without a result source.
    fn result_source(self: Arc<Self>) -> Result<Option<ResultSourceRef>, HandlerError> {
        Ok(None)
    }
}

/// Shared handle to a plugin.
pub type PluginRef = Arc<dyn Plugin>;
