//! Third-party media CDN backend.
//!
//! Uploads are unsigned multipart POSTs against an upload preset. The CDN
//! picks its pipeline from the URL (`image`, `video` or `raw`), so the
//! resource kind is derived from the content type before sending.

use async_trait::async_trait;
use goldconnect_shared::ResourceKind;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::blob::{BlobStore, BlobUpload, Listing, StoredBlob};
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnConfig {
    pub base_url: String,
    pub cloud_name: String,
    pub upload_preset: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cloudinary.com/v1_1".to_string(),
            cloud_name: String::new(),
            upload_preset: "chat_media".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    resource_type: String,
    #[serde(default)]
    format: Option<String>,
}

fn parse_upload_response(body: &str) -> Result<StoredBlob> {
    let resp: UploadResponse = serde_json::from_str(body)?;
    Ok(StoredBlob {
        url: resp.secure_url,
        id: resp.public_id,
        resource_type: resp.resource_type,
        format: resp.format.filter(|f| !f.is_empty()),
    })
}

#[derive(Debug, Clone)]
pub struct CdnBlobStore {
    client: reqwest::Client,
    config: CdnConfig,
}

impl CdnBlobStore {
    pub fn new(config: CdnConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: CdnConfig) -> Self {
        Self { client, config }
    }

    pub fn upload_url(&self, resource: ResourceKind) -> String {
        format!(
            "{}/{}/{}/upload",
            self.config.base_url.trim_end_matches('/'),
            self.config.cloud_name,
            resource.as_str()
        )
    }
}

#[async_trait]
impl BlobStore for CdnBlobStore {
    fn backend_name(&self) -> &'static str {
        "cdn"
    }

    async fn upload(&self, upload: &BlobUpload) -> Result<StoredBlob> {
        let resource = ResourceKind::from_mime(&upload.content_type);
        let url = self.upload_url(resource);

        let part = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone())
            .text("cloud_name", self.config.cloud_name.clone());

        debug!(url = %url, size = upload.bytes.len(), "uploading to CDN");

        let resp = self.client.post(&url).multipart(form).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "CDN rejected upload");
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_upload_response(&body)
    }

    async fn list(&self, prefix: &str) -> Result<Listing> {
        // Listing needs the signed admin API; unsigned clients see nothing.
        debug!(prefix, "CDN backend exposes no folder hierarchy");
        Ok(Listing::default())
    }

    async fn delete(&self, _path: &str) -> Result<()> {
        Err(StoreError::Unsupported {
            backend: "cdn",
            operation: "delete",
        })
    }
}
