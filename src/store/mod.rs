//! External metadata store: contract and in-memory implementation.
//!
//! ## Contents
//! - [`MetadataStore`] the read/write contract used by the reconciliation writer
//! - [`Metadata`], [`StatusCode`], [`StoreResponse`] wire-level types
//! - [`MemoryStore`] map-backed store for tests and demos

mod memory;
mod contract;

pub use memory::MemoryStore;
pub use contract::{Metadata, MetadataStore, StatusCode, StoreRef, StoreResponse};
