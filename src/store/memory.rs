//! In-process object store.

use super::{ObjectStore, StoreError, StoreResult, Visibility, validate_key};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object bytes
    pub body: Bytes,
    /// MIME type given at write time
    pub content_type: String,
    /// Visibility given at write time
    pub visibility: Visibility,
}

/// [`ObjectStore`] kept in a map; lists keys in lexicographic order like S3.
#[derive(Debug)]
pub struct MemoryObjectStore {
    name: String,
    base_url: String,
    container_exists: bool,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    rejected: BTreeSet<String>,
    writes: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    /// Empty bucket named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            base_url: format!("https://{}.example.invalid", name),
            name,
            container_exists: true,
            objects: Mutex::new(BTreeMap::new()),
            rejected: BTreeSet::new(),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Report the bucket itself as missing.
    pub fn without_container(mut self) -> Self {
        self.container_exists = false;
        self
    }

    /// Reject every write to `key`.
    pub fn reject_writes_to(mut self, key: impl Into<String>) -> Self {
        self.rejected.insert(key.into());
        self
    }

    /// Seed an object without recording it as a write.
    pub fn with_object(self, key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.lock_objects().insert(
            key.into(),
            StoredObject {
                body: body.into(),
                content_type: "application/octet-stream".to_string(),
                visibility: Visibility::PublicRead,
            },
        );
        self
    }

    /// Object currently stored under `key`.
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock_objects().get(key).cloned()
    }

    /// Keys written through [`ObjectStore::put`], in call order, including
    /// rejected attempts.
    pub fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn container_name(&self) -> &str {
        &self.name
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        Ok(self.container_exists)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        Ok(self.lock_objects().contains_key(key))
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        visibility: Visibility,
    ) -> StoreResult<()> {
        validate_key(key)?;
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.to_string());

        if self.rejected.contains(key) {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                reason: "write rejected by store".to_string(),
            });
        }

        self.lock_objects().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                visibility,
            },
        );
        Ok(())
    }

    async fn list_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock_objects().keys().cloned().collect())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}
