//! Runtime core: dispatch, completion tracking and lifecycle.
//!
//! The public entry point is [`Relay`], assembled through [`RelayBuilder`].
//!
//! Internal modules:
//! - [`registry`]: plugins indexed by the event types they handle;
//! - [`dispatcher`]: fans each event out and records it as outstanding;
//! - [`pool`]: semaphore-bounded dispatch tasks;
//! - [`outstanding`]: ordered map of events still being processed;
//! - [`tracker`]: periodic walk that retires events and advances the watermark;
//! - [`relay`]: owns all of the above plus the background loops, handles shutdown.

mod builder;
mod config;
mod dispatcher;
mod outstanding;
mod pool;
mod registry;
mod relay;
mod tracker;

pub use builder::RelayBuilder;
pub use config::Config;
pub use outstanding::EventKey;
pub use pool::{DispatchTask, TaskPoll};
pub use registry::PluginRegistry;
pub use relay::Relay;
pub use tracker::{CycleReport, Watermark};
