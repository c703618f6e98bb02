//! Error types used by the relay runtime, plugins and the metadata store.
//!
//! This module defines the following error enums:
//!
//! - [`RegistryError`]: rejected plugin registrations (raised at startup, never at dispatch).
//! - [`HandlerError`]: failures of a single plugin handler invocation.
//! - [`StoreError`]: transport/decoding failures of the external metadata store.
//! - [`QueueError`]: a bounded queue refused an item.
//! - [`RuntimeError`]: errors raised by the relay runtime itself.
//!
//! All of them provide `as_label` (stable snake_case label for logs/metrics) and
//! `as_message` helpers.

use std::time::Duration;
use thiserror::Error;

use crate::events::EventType;

/// # Errors produced while registering plugins.
///
/// Every variant is detected eagerly, when the plugin's handler table is built
/// or when the plugin is added to the registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler table binds the same event type more than once.
    #[error("plugin '{plugin}' binds {binding} more than once")]
    DuplicateBinding {
        /// Plugin whose table is ambiguous.
        plugin: String,
        /// The binding that appeared twice (`BackupVm`, `any`, ...).
        binding: String,
    },

    /// Two plugins handle an event type that one of them claims exclusively.
    #[error("event type {event_type} is owned exclusively by '{owner}'; '{plugin}' cannot handle it")]
    ExclusiveConflict {
        /// The contested event type.
        event_type: EventType,
        /// Plugin that already owns (or also handles) the type.
        owner: String,
        /// Plugin being registered.
        plugin: String,
    },

    /// A plugin with the same name is already registered.
    #[error("plugin '{plugin}' is already registered")]
    DuplicatePlugin {
        /// The duplicated plugin name.
        plugin: String,
    },

    /// The plugin declared no handlers at all.
    #[error("plugin '{plugin}' declares no handlers")]
    NoBindings {
        /// Plugin with an empty handler table.
        plugin: String,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relayvisor::RegistryError;
    ///
    /// let err = RegistryError::NoBindings { plugin: "audit".into() };
    /// assert_eq!(err.as_label(), "registry_no_bindings");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::DuplicateBinding { .. } => "registry_duplicate_binding",
            RegistryError::ExclusiveConflict { .. } => "registry_exclusive_conflict",
            RegistryError::DuplicatePlugin { .. } => "registry_duplicate_plugin",
            RegistryError::NoBindings { .. } => "registry_no_bindings",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced by a plugin handler invocation.
///
/// All of them are contained by the plugin runtime: they are reported through the
/// notification sink and the dispatch task is counted as done.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler returned an error.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler panicked; the worker caught the panic and kept running.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The plugin was cancelled before the event was handled.
    #[error("plugin cancelled before handling the event")]
    Cancelled,

    /// The plugin's inbound queue refused the event.
    #[error("event rejected by plugin queue: {reason}")]
    Rejected {
        /// Why the event was refused (`full`, `closed`).
        reason: &'static str,
    },
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relayvisor::HandlerError;
    ///
    /// assert_eq!(HandlerError::fail("boom").as_label(), "handler_failed");
    /// assert_eq!(HandlerError::Cancelled.as_label(), "handler_cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Panicked { .. } => "handler_panicked",
            HandlerError::Cancelled => "handler_cancelled",
            HandlerError::Rejected { .. } => "handler_rejected",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            HandlerError::Fail { error } => format!("error: {error}"),
            HandlerError::Panicked { info } => format!("panic: {info}"),
            HandlerError::Cancelled => "plugin cancelled".to_string(),
            HandlerError::Rejected { reason } => format!("rejected: {reason}"),
        }
    }
}

/// # Errors produced by a [`MetadataStore`](crate::store::MetadataStore) call.
///
/// These are transport-level problems; an HTTP-like non-success status is not an
/// error here but a [`StatusCode`](crate::store::StatusCode) in the response.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The request could not be performed.
    #[error("store transport failed: {error}")]
    Transport {
        /// The underlying error message.
        error: String,
    },

    /// The response body could not be decoded into metadata.
    #[error("store response could not be decoded: {error}")]
    Decode {
        /// The underlying error message.
        error: String,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Transport { .. } => "store_transport",
            StoreError::Decode { .. } => "store_decode",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StoreError::Transport { error } => format!("transport: {error}"),
            StoreError::Decode { error } => format!("decode: {error}"),
        }
    }
}

/// Error returned when a queue refuses an item.
///
/// Produced by [`ResultSinks`](crate::ResultSinks) publishing and plugin queue
/// admission.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Bounded queue is full (try again later or use the async variant).
    #[error("queue full")]
    Full,

    /// Receiving side is gone (consumer stopped).
    #[error("queue closed")]
    Closed,
}

impl QueueError {
    /// Returns `"full"` or `"closed"`.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Full => "full",
            QueueError::Closed => "closed",
        }
    }
}

/// # Errors produced by the relay runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The relay could not be assembled because a plugin registration was rejected.
    #[error("plugin registration rejected: {0}")]
    Registry(#[from] RegistryError),

    /// Shutdown grace period was exceeded; some workers were still busy.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the loops/plugins that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relayvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Registry(_) => "runtime_registry",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Registry(e) => format!("registry: {}", e.as_message()),
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck={stuck:?}")
            }
        }
    }
}
