//! # TracingNotifier: default notification sink
//!
//! Renders each [`Notification`] as a `tracing` event at `WARN` level, with the
//! shape-specific details as structured fields.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! WARN relayvisor: plugin 'audit' failed to process DeployVm ts:... vm:web-1
//! WARN relayvisor: failed to update backup status of vm1 cause=transport: refused
//! WARN relayvisor: failed to retrieve current metadata locator="http://api/vm1/metadata" status=404
//! ```

use tracing::warn;

use super::notification::{Notification, Notify};

/// Notification sink that writes to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl TracingNotifier {
    /// Construct a new [`TracingNotifier`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Notify for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Message(message) => {
                warn!(target: "relayvisor", "{message}");
            }
            Notification::Cause { message, cause } => {
                warn!(target: "relayvisor", cause = %cause, "{message}");
            }
            Notification::Http {
                message,
                locator,
                status,
            } => {
                warn!(target: "relayvisor", locator = %locator, status = %status, "{message}");
            }
        }
    }
}
