//! Event-consuming plugins.
//!
//! ## Contents
//! - [`Plugin`] the trait implemented by consumers
//! - [`HandlerTable`] explicit event type → handler bindings, built once per plugin
//! - [`PluginRuntime`] a plugin's inbound queue and its single worker
//!
//! ```text
//! Plugin::handlers() ──► HandlerTable ──► PluginRuntime { queue, worker }
//!                                              ▲
//!                         Dispatcher::dispatch ┘ enqueue(Delivery)
//! ```

mod handlers;
mod plugin;
mod runtime;

pub use handlers::{Capabilities, HandlerFn, HandlerFuture, HandlerTable, HandlerTableBuilder};
pub use plugin::{Plugin, PluginRef};
pub use runtime::{Delivery, PluginRuntime, PluginState};
