//! Domain events: the data model routed by the dispatcher.
//!
//! ## Contents
//! - [`DomainEvent`] immutable timestamped event
//! - [`EventPayload`], [`VmDetails`] typed payloads
//! - [`EventType`] the type tag plugins declare interest in
//!
//! See the crate root for the system-level wiring diagram.

mod event;

pub use event::{DomainEvent, EventPayload, EventType, VmDetails};
