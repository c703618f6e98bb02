//! # External metadata store contract.
//!
//! The reconciliation writer performs a read-modify-write cycle against the
//! store that holds each entity's metadata document. The store is a collaborator:
//! in production it is an HTTP API, in tests an in-memory map.
//!
//! ## Contract
//! - [`MetadataStore::locate`] resolves an entity name to a resource locator;
//!   entities without a locator are skipped.
//! - Reads and writes answer with an HTTP-like [`StatusCode`]; anything outside
//!   `2xx` is a failure. [`StoreError`] is reserved for requests that could not be
//!   performed at all.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// HTTP-like status code returned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// `200 OK`.
    pub const OK: StatusCode = StatusCode(200);
    /// `404 Not Found`.
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// `500 Internal Server Error`.
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);

    /// True for any `2xx` status.
    #[inline]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata document of one entity (a JSON object).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub Map<String, Value>);

impl Metadata {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a document from a JSON value; only objects are accepted.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::Decode {
                error: format!("expected a JSON object, got {other}"),
            }),
        }
    }

    /// Returns the document as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Borrows the top-level map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrows the top-level map.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }
}

/// Response of a store read.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreResponse<T> {
    /// Status returned by the store.
    pub status: StatusCode,
    /// Decoded body, when the store returned one.
    pub body: Option<T>,
}

impl<T> StoreResponse<T> {
    /// Successful response carrying `body`.
    pub fn ok(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    /// Response with a status and no body.
    pub fn status(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    /// Returns the body only when the status is a success.
    pub fn into_success(self) -> Option<T> {
        if self.status.is_success() {
            self.body
        } else {
            None
        }
    }
}

/// External store holding entity metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Resolves the resource locator of an entity's metadata, if the entity is known.
    async fn locate(&self, entity: &str) -> Option<String>;

    /// Reads the metadata document at `locator`.
    async fn read_metadata(&self, locator: &str) -> Result<StoreResponse<Metadata>, StoreError>;

    /// Replaces the metadata document at `locator`.
    async fn write_metadata(
        &self,
        locator: &str,
        metadata: &Metadata,
    ) -> Result<StatusCode, StoreError>;
}

/// Shared handle to a metadata store.
pub type StoreRef = Arc<dyn MetadataStore>;
