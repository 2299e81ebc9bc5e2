//! The blob store contract.
//!
//! Two interchangeable backends implement it: a media CDN
//! ([`crate::cdn::CdnBlobStore`]) and a generic object store
//! ([`crate::object_store::ObjectStore`]). Only one is active per
//! deployment.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use goldconnect_shared::constants::UPLOADS_ROOT;
use goldconnect_shared::MediaKind;
use uuid::Uuid;

use crate::error::Result;

/// A file ready to be sent to a backend. Name and content type are always
/// known at this point.
#[derive(Debug, Clone)]
pub struct BlobUpload {
    pub file_name: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub bytes: Bytes,
}

/// What a backend reports back after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub url: String,
    /// Opaque id (CDN public id, or the object path).
    pub id: String,
    pub resource_type: String,
    /// Format reported by the backend, if any.
    pub format: Option<String>,
}

/// One level of a folder hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Full paths of objects directly inside the folder.
    pub items: Vec<String>,
    /// Full paths of immediate sub-folders.
    pub prefixes: Vec<String>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.prefixes.is_empty()
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs and errors.
    fn backend_name(&self) -> &'static str;

    async fn upload(&self, upload: &BlobUpload) -> Result<StoredBlob>;

    async fn list(&self, prefix: &str) -> Result<Listing>;

    async fn delete(&self, path: &str) -> Result<()>;
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `uploads/<kind>s/<millis>_<tag>_<sanitized name>`
pub fn object_path(kind: MediaKind, millis: i64, tag: &str, file_name: &str) -> String {
    format!(
        "{UPLOADS_ROOT}/{}s/{millis}_{tag}_{}",
        kind.as_str(),
        sanitize_file_name(file_name)
    )
}

/// Path for a fresh upload. The random tag keeps same-named uploads within
/// one millisecond apart.
pub fn new_object_path(kind: MediaKind, file_name: &str) -> String {
    let tag = Uuid::new_v4().simple().to_string();
    object_path(kind, Utc::now().timestamp_millis(), &tag[..8], file_name)
}
