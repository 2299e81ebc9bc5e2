//! In-process [`BlobStore`] with the object-store folder layout.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::blob::{new_object_path, BlobStore, BlobUpload, Listing, StoredBlob};
use crate::error::{Result, StoreError};

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, Bytes>,
    undeletable: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))?;
        f(&mut guard)
    }

    /// Store raw bytes at an explicit path.
    pub fn insert(&self, path: &str, bytes: impl Into<Bytes>) {
        let _ = self.with(|inner| {
            inner.objects.insert(path.to_string(), bytes.into());
            Ok(())
        });
    }

    /// Make deletes of `path` fail, to exercise partial purges.
    pub fn protect(&self, path: &str) {
        let _ = self.with(|inner| {
            inner.undeletable.insert(path.to_string());
            Ok(())
        });
    }

    pub fn paths(&self) -> Vec<String> {
        self.with(|inner| Ok(inner.objects.keys().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.with(|inner| Ok(inner.objects.get(path).cloned()))
            .ok()
            .flatten()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, upload: &BlobUpload) -> Result<StoredBlob> {
        if upload.bytes.is_empty() {
            return Err(StoreError::EmptyBlob);
        }
        let path = new_object_path(upload.kind, &upload.file_name);
        self.with(|inner| {
            inner.objects.insert(path.clone(), upload.bytes.clone());
            Ok(())
        })?;
        debug!(path = %path, size = upload.bytes.len(), "stored blob in memory");
        Ok(StoredBlob {
            url: format!("memory://{path}"),
            id: path,
            resource_type: upload.kind.as_str().to_string(),
            format: None,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Listing> {
        let folder = format!("{}/", prefix.trim_end_matches('/'));
        self.with(|inner| {
            let mut items = Vec::new();
            let mut prefixes = BTreeSet::new();
            for path in inner.objects.keys() {
                let Some(rest) = path.strip_prefix(&folder) else {
                    continue;
                };
                match rest.split_once('/') {
                    Some((sub, _)) => {
                        prefixes.insert(format!("{folder}{sub}"));
                    }
                    None => items.push(path.clone()),
                }
            }
            Ok(Listing {
                items,
                prefixes: prefixes.into_iter().collect(),
            })
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.with(|inner| {
            if inner.undeletable.contains(path) {
                return Err(StoreError::PermissionDenied(format!("cannot delete {path}")));
            }
            inner
                .objects
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(path.to_string()))
        })
    }
}
