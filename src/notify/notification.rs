//! # Notifications: non-fatal problems surfaced to the host application.
//!
//! The relay never stops a loop because of a failed handler, a store error or a
//! stalled plugin. It reports the problem through a [`Notify`] sink and carries on.
//!
//! Three shapes are supported:
//! - [`Notification::Message`] plain message;
//! - [`Notification::Cause`] message plus the error that caused it;
//! - [`Notification::Http`] message plus the resource locator and the status it returned.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::store::StatusCode;

/// A non-fatal problem reported by the dispatcher, a plugin runtime or the writer.
#[derive(Clone, Debug)]
pub enum Notification {
    /// Plain message.
    Message(String),
    /// Message with the underlying cause.
    Cause {
        /// What was being attempted.
        message: String,
        /// The error that made it fail.
        cause: Arc<dyn Error + Send + Sync>,
    },
    /// Message about a store request that returned a non-success status.
    Http {
        /// What was being attempted.
        message: String,
        /// Resource locator of the request.
        locator: String,
        /// Status returned by the store.
        status: StatusCode,
    },
}

impl Notification {
    /// Creates a [`Notification::Message`].
    pub fn message(message: impl Into<String>) -> Self {
        Notification::Message(message.into())
    }

    /// Creates a [`Notification::Cause`].
    pub fn cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Notification::Cause {
            message: message.into(),
            cause: Arc::new(cause),
        }
    }

    /// Creates a [`Notification::Http`].
    pub fn http(message: impl Into<String>, locator: impl Into<String>, status: StatusCode) -> Self {
        Notification::Http {
            message: message.into(),
            locator: locator.into(),
            status,
        }
    }

    /// Returns the message part, whatever the shape.
    pub fn text(&self) -> &str {
        match self {
            Notification::Message(message)
            | Notification::Cause { message, .. }
            | Notification::Http { message, .. } => message,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Message(message) => f.write_str(message),
            Notification::Cause { message, cause } => write!(f, "{message}: {cause}"),
            Notification::Http {
                message,
                locator,
                status,
            } => write!(f, "request to {locator} returned status {status}. {message}"),
        }
    }
}

/// Sink for [`Notification`]s.
///
/// Called inline from relay loops, so implementations must not block for long;
/// hand the notification off to a channel if delivery is slow.
pub trait Notify: Send + Sync + 'static {
    /// Delivers one notification.
    fn notify(&self, notification: Notification);
}

/// Shared handle to a notification sink.
pub type NotifierRef = Arc<dyn Notify>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;

    #[test]
    fn test_display_per_shape() {
        assert_eq!(Notification::message("hello").to_string(), "hello");
        assert_eq!(
            Notification::cause("plugin failed", HandlerError::fail("boom")).to_string(),
            "plugin failed: handler failed: boom"
        );
        assert_eq!(
            Notification::http("update failed", "http://api/vm1/metadata", StatusCode(503))
                .to_string(),
            "request to http://api/vm1/metadata returned status 503. update failed"
        );
    }

    #[test]
    fn test_text_ignores_details() {
        let n = Notification::http("update failed", "loc", StatusCode(500));
        assert_eq!(n.text(), "update failed");
    }
}
