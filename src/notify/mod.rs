//! # Observability sink for non-fatal problems.
//!
//! ## Architecture
//! ```text
//! Dispatcher ────────┐
//! PluginRuntime(s) ──┼──► Notify::notify(Notification) ──► host application
//! CompletionTracker ─┤                                  └─► TracingNotifier (default)
//! ReconcileWriter ───┘
//! ```
//!
//! Implement [`Notify`] to route notifications to alerts or a UI; otherwise the
//! relay falls back to [`TracingNotifier`].

mod log;
mod notification;

pub use log::TracingNotifier;
pub use notification::{Notification, NotifierRef, Notify};

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::{Notification, Notify};

    /// Test double that keeps every notification it receives.
    #[derive(Default)]
    pub struct RecordingNotifier {
        seen: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn all(&self) -> Vec<Notification> {
            self.seen.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.all().iter().map(|n| n.text().to_string()).collect()
        }

        pub fn len(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Notify for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.seen.lock().unwrap().push(notification);
        }
    }
}
