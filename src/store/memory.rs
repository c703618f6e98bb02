//! # In-memory metadata store.
//!
//! [`MemoryStore`] keeps documents in a map keyed by locator
//! (`<base>/<entity>/metadata`). Status overrides let callers simulate a store
//! that rejects reads or writes, which is how the writer's failure paths are
//! exercised.
//!
//! ## Example
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use relayvisor::store::{MemoryStore, Metadata, MetadataStore};
//!
//! let store = MemoryStore::new("mem://vms");
//! store.insert("vm1", Metadata::new()).await;
//!
//! assert_eq!(store.locate("vm1").await.as_deref(), Some("mem://vms/vm1/metadata"));
//! assert!(store.locate("unknown").await.is_none());
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::contract::{Metadata, MetadataStore, StatusCode, StoreResponse};
use crate::error::StoreError;

/// Map-backed [`MetadataStore`].
pub struct MemoryStore {
    base: String,
    docs: RwLock<HashMap<String, Metadata>>,
    /// Status forced on reads (`0` = none).
    read_status: AtomicU16,
    /// Status forced on writes (`0` = none).
    write_status: AtomicU16,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store whose locators start with `base`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            docs: RwLock::new(HashMap::new()),
            read_status: AtomicU16::new(0),
            write_status: AtomicU16::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    fn locator_of(&self, entity: &str) -> String {
        format!("{}/{entity}/metadata", self.base)
    }

    /// Adds (or replaces) an entity's document.
    pub async fn insert(&self, entity: &str, metadata: Metadata) {
        let locator = self.locator_of(entity);
        self.docs.write().await.insert(locator, metadata);
    }

    /// Returns a copy of an entity's current document.
    pub async fn metadata(&self, entity: &str) -> Option<Metadata> {
        let locator = self.locator_of(entity);
        self.docs.read().await.get(&locator).cloned()
    }

    /// Forces every read to answer `status` (pass `None` to restore normal reads).
    pub fn force_read_status(&self, status: Option<StatusCode>) {
        self.read_status
            .store(status.map_or(0, |s| s.0), Ordering::SeqCst);
    }

    /// Forces every write to answer `status` without storing anything
    /// (pass `None` to restore normal writes).
    pub fn force_write_status(&self, status: Option<StatusCode>) {
        self.write_status
            .store(status.map_or(0, |s| s.0), Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn forced(slot: &AtomicU16) -> Option<StatusCode> {
        match slot.load(Ordering::SeqCst) {
            0 => None,
            code => Some(StatusCode(code)),
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn locate(&self, entity: &str) -> Option<String> {
        let locator = self.locator_of(entity);
        self.docs
            .read()
            .await
            .contains_key(&locator)
            .then_some(locator)
    }

    async fn read_metadata(&self, locator: &str) -> Result<StoreResponse<Metadata>, StoreError> {
        if let Some(status) = Self::forced(&self.read_status) {
            return Ok(StoreResponse::status(status));
        }
        Ok(match self.docs.read().await.get(locator) {
            Some(doc) => StoreResponse::ok(doc.clone()),
            None => StoreResponse::status(StatusCode::NOT_FOUND),
        })
    }

    async fn write_metadata(
        &self,
        locator: &str,
        metadata: &Metadata,
    ) -> Result<StatusCode, StoreError> {
        if let Some(status) = Self::forced(&self.write_status) {
            return Ok(status);
        }
        let mut docs = self.docs.write().await;
        match docs.get_mut(locator) {
            Some(doc) => {
                *doc = metadata.clone();
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(StatusCode::OK)
            }
            None => Ok(StatusCode::NOT_FOUND),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Metadata {
        Metadata::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_read_write_roundtrip_through_locator() {
        let store = MemoryStore::new("mem://api");
        store.insert("vm1", doc(json!({"metadata": {}}))).await;

        let loc = store.locate("vm1").await.unwrap();
        let updated = doc(json!({"metadata": {"chef": true}}));
        assert_eq!(store.write_metadata(&loc, &updated).await.unwrap(), StatusCode::OK);

        let read = store.read_metadata(&loc).await.unwrap();
        assert_eq!(read.into_success(), Some(updated));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_unknown_locator_is_not_found() {
        let store = MemoryStore::new("mem://api");
        let read = store.read_metadata("mem://api/ghost/metadata").await.unwrap();
        assert_eq!(read.status, StatusCode::NOT_FOUND);
        let status = store
            .write_metadata("mem://api/ghost/metadata", &Metadata::new())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_forced_write_status_keeps_document() {
        let store = MemoryStore::new("mem://api");
        let original = doc(json!({"metadata": {"a": 1}}));
        store.insert("vm1", original.clone()).await;
        store.force_write_status(Some(StatusCode::INTERNAL_ERROR));

        let loc = store.locate("vm1").await.unwrap();
        let status = store.write_metadata(&loc, &Metadata::new()).await.unwrap();
        assert_eq!(status, StatusCode::INTERNAL_ERROR);
        assert_eq!(store.metadata("vm1").await, Some(original));
        assert_eq!(store.writes(), 0);
    }
}
