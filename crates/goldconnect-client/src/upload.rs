//! Upload orchestration.
//!
//! Normalizes an input into a named, typed blob, hands it to the configured
//! backend and turns the backend's answer into a [`MediaDescriptor`].
//! Progress is reported at three fixed milestones, not per byte.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use goldconnect_shared::media::file_extension;
use goldconnect_shared::{MediaDescriptor, MediaKind};
use goldconnect_store::{BlobStore, BlobUpload};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

pub const PROGRESS_SENDING: u8 = 25;
pub const PROGRESS_RECEIVED: u8 = 75;
pub const PROGRESS_DONE: u8 = 100;

/// What the user handed over.
#[derive(Debug, Clone)]
pub enum UploadInput {
    /// Unnamed bytes, e.g. a recorded clip.
    Raw {
        bytes: Bytes,
        content_type: Option<String>,
    },
    /// A file picked from disk.
    File {
        name: String,
        bytes: Bytes,
        content_type: String,
    },
}

impl UploadInput {
    /// Media kind implied by a picked file's content type.
    pub fn kind_for(content_type: &str) -> MediaKind {
        MediaKind::from_mime(content_type)
    }

    /// Name and content type, synthesized where missing.
    fn into_upload(self, kind: MediaKind, millis: i64) -> BlobUpload {
        let (file_name, content_type, bytes) = match self {
            Self::Raw {
                bytes,
                content_type,
            } => (
                kind.synthesized_name(millis),
                content_type.filter(|c| !c.trim().is_empty()),
                bytes,
            ),
            Self::File {
                name,
                bytes,
                content_type,
            } => {
                let name = if name.trim().is_empty() {
                    kind.synthesized_name(millis)
                } else {
                    name
                };
                (name, Some(content_type).filter(|c| !c.trim().is_empty()), bytes)
            }
        };
        BlobUpload {
            file_name,
            content_type: content_type.unwrap_or_else(|| kind.fallback_content_type().to_string()),
            kind,
            bytes,
        }
    }
}

#[derive(Clone)]
pub struct Uploader {
    backend: Arc<dyn BlobStore>,
}

impl Uploader {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub async fn upload(
        &self,
        input: UploadInput,
        kind: MediaKind,
        uploader: &str,
    ) -> Result<MediaDescriptor> {
        self.upload_with_progress(input, kind, uploader, |_| {}).await
    }

    /// Upload and report 25, 75 and 100 percent along the way.
    ///
    /// Any backend failure aborts the call with [`ClientError::Upload`]. The
    /// input is consumed, so callers wanting to retry keep their own copy
    /// (cloning is cheap, the bytes are shared).
    pub async fn upload_with_progress<P>(
        &self,
        input: UploadInput,
        kind: MediaKind,
        uploader: &str,
        on_progress: P,
    ) -> Result<MediaDescriptor>
    where
        P: Fn(u8) + Send + Sync,
    {
        let upload = input.into_upload(kind, Utc::now().timestamp_millis());
        let backend = self.backend.backend_name();

        on_progress(PROGRESS_SENDING);
        debug!(
            backend,
            file = %upload.file_name,
            content_type = %upload.content_type,
            size = upload.bytes.len(),
            "uploading"
        );

        let stored = self.backend.upload(&upload).await.map_err(|source| {
            warn!(backend, file = %upload.file_name, error = %source, "upload failed");
            ClientError::Upload { backend, source }
        })?;
        on_progress(PROGRESS_RECEIVED);

        let format = stored
            .format
            .clone()
            .or_else(|| file_extension(&upload.file_name).map(str::to_lowercase))
            .unwrap_or_else(|| "unknown".to_string());

        let descriptor = MediaDescriptor {
            url: stored.url,
            public_id: stored.id,
            resource_type: stored.resource_type,
            format,
            file_name: upload.file_name,
            file_size: upload.bytes.len() as u64,
            uploaded_by: Some(uploader.to_string()),
            uploaded_at: Some(Utc::now()),
        };
        on_progress(PROGRESS_DONE);

        debug!(backend, id = %descriptor.public_id, "upload complete");
        Ok(descriptor)
    }
}
