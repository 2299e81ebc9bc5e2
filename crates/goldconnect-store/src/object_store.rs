//! Generic object-store backend kept on the local filesystem.
//!
//! Objects live under `uploads/<kind>s/` relative to the store root, and
//! folders map to directories, so the purge can walk the hierarchy.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::blob::{new_object_path, BlobStore, BlobUpload, Listing, StoredBlob};
use crate::error::{Result, StoreError};

/// Turn a store path into a relative filesystem path, rejecting anything
/// that could escape the root.
fn relative_path(path: &str) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => clean.push(c),
            Component::CurDir => {}
            // RootDir, Prefix, ParentDir
            _ => return Err(StoreError::InvalidPath(path.to_string())),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(clean)
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    base_path: PathBuf,
    public_url: Option<String>,
    max_size: usize,
}

impl ObjectStore {
    /// Open the store rooted at `base_path`, creating it if needed.
    ///
    /// With `public_url` set, object URLs are `<public_url>/<path>`;
    /// otherwise they are `file://` URLs.
    pub async fn new(
        base_path: PathBuf,
        public_url: Option<String>,
        max_size: usize,
    ) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;

        info!(path = %base_path.display(), "object store initialized");

        Ok(Self {
            base_path,
            public_url: public_url.map(|u| u.trim_end_matches('/').to_string()),
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(self.base_path.join(relative_path(path)?))
    }

    fn url_for(&self, path: &str, full: &Path) -> String {
        match &self.public_url {
            Some(base) => format!("{base}/{path}"),
            None => format!("file://{}", full.display()),
        }
    }
}

#[async_trait]
impl BlobStore for ObjectStore {
    fn backend_name(&self) -> &'static str {
        "object-store"
    }

    async fn upload(&self, upload: &BlobUpload) -> Result<StoredBlob> {
        if upload.bytes.is_empty() {
            return Err(StoreError::EmptyBlob);
        }
        if upload.bytes.len() > self.max_size {
            return Err(StoreError::BlobTooLarge {
                size: upload.bytes.len(),
                max: self.max_size,
            });
        }

        let path = new_object_path(upload.kind, &upload.file_name);
        let full = self.resolve(&path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, &upload.bytes).await?;

        debug!(path = %path, size = upload.bytes.len(), "stored object");

        Ok(StoredBlob {
            url: self.url_for(&path, &full),
            id: path,
            resource_type: upload.kind.as_str().to_string(),
            format: None,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Listing> {
        let prefix = prefix.trim_end_matches('/');
        let dir = self.resolve(prefix)?;
        if !fs::try_exists(&dir).await? {
            return Ok(Listing::default());
        }

        let mut listing = Listing::default();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let child = format!("{prefix}/{name}");
            if entry.file_type().await?.is_dir() {
                listing.prefixes.push(child);
            } else {
                listing.items.push(child);
            }
        }
        listing.items.sort();
        listing.prefixes.sort();
        Ok(listing)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if !fs::try_exists(&full).await? {
            return Err(StoreError::NotFound(path.to_string()));
        }
        fs::remove_file(&full).await?;
        debug!(path = %path, "deleted object");
        Ok(())
    }
}
