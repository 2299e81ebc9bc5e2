//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so an embedding shell can start with zero
//! configuration against a local object store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use goldconnect_shared::constants::{MAX_FILE_SIZE, RETENTION_INTERVAL_SECS};
use goldconnect_store::{BlobStore, CdnBlobStore, CdnConfig, ObjectStore};

use crate::error::Result;
use crate::geo::ProviderKind;
use crate::purge::MAX_RETENTION_INTERVAL;

/// Which blob store backend uploads go to. One per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    Cdn,
    Object,
}

impl BlobBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cdn" | "cloudinary" => Some(Self::Cdn),
            "object" | "object-store" | "storage" => Some(Self::Object),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Env: `BLOB_BACKEND` (`cdn` / `object`)
    /// Default: `object`
    pub blob_backend: BlobBackend,

    /// Env: `CDN_BASE_URL`, `CDN_CLOUD_NAME`, `CDN_UPLOAD_PRESET`
    pub cdn: CdnConfig,

    /// Root of the filesystem object store.
    /// Env: `OBJECT_STORE_PATH`
    /// Default: `./blobs`
    pub object_store_path: PathBuf,

    /// Public prefix for object URLs. `file://` URLs when unset.
    /// Env: `OBJECT_STORE_PUBLIC_URL`
    pub object_store_public_url: Option<String>,

    /// Env: `MAX_BLOB_SIZE`
    /// Default: 50 MiB
    pub max_blob_size: usize,

    /// Env: `RETENTION_INTERVAL_SECS`
    /// Default: 2 hours. Values over a year are rejected.
    pub retention_interval: Duration,

    /// Geolocation providers, tried in order.
    /// Env: `GEO_PROVIDERS` (comma separated)
    /// Default: `ipapi.co,ip-api.com`
    pub geo_providers: Vec<ProviderKind>,

    /// Local settings database. Platform data dir when unset.
    /// Env: `SETTINGS_DB_PATH`
    pub settings_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            blob_backend: BlobBackend::Object,
            cdn: CdnConfig::default(),
            object_store_path: PathBuf::from("./blobs"),
            object_store_public_url: None,
            max_blob_size: MAX_FILE_SIZE,
            retention_interval: Duration::from_secs(RETENTION_INTERVAL_SECS),
            geo_providers: vec![ProviderKind::IpApiCo, ProviderKind::IpApiCom],
            settings_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = var("BLOB_BACKEND") {
            match BlobBackend::parse(&value) {
                Some(backend) => config.blob_backend = backend,
                None => tracing::warn!(value = %value, "Invalid BLOB_BACKEND, using default"),
            }
        }

        if let Some(url) = var("CDN_BASE_URL") {
            config.cdn.base_url = url;
        }
        if let Some(name) = var("CDN_CLOUD_NAME") {
            config.cdn.cloud_name = name;
        }
        if let Some(preset) = var("CDN_UPLOAD_PRESET") {
            config.cdn.upload_preset = preset;
        }

        if let Some(path) = var("OBJECT_STORE_PATH") {
            config.object_store_path = PathBuf::from(path);
        }
        if let Some(url) = var("OBJECT_STORE_PUBLIC_URL") {
            if !url.trim().is_empty() {
                config.object_store_public_url = Some(url);
            }
        }

        if let Some(value) = var("MAX_BLOB_SIZE") {
            match value.parse::<usize>() {
                Ok(size) if size > 0 => config.max_blob_size = size,
                _ => tracing::warn!(value = %value, "Invalid MAX_BLOB_SIZE, using default"),
            }
        }

        if let Some(value) = var("RETENTION_INTERVAL_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 && secs <= MAX_RETENTION_INTERVAL.as_secs() => {
                    config.retention_interval = Duration::from_secs(secs)
                }
                _ => tracing::warn!(
                    value = %value,
                    "Invalid RETENTION_INTERVAL_SECS, using default"
                ),
            }
        }

        if let Some(value) = var("GEO_PROVIDERS") {
            let mut providers = Vec::new();
            for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match ProviderKind::parse(name) {
                    Some(kind) => providers.push(kind),
                    None => tracing::warn!(provider = %name, "Unknown geolocation provider, skipped"),
                }
            }
            config.geo_providers = providers;
        }

        if let Some(path) = var("SETTINGS_DB_PATH") {
            config.settings_path = Some(PathBuf::from(path));
        }

        config
    }

    /// Build the configured blob store backend.
    pub async fn build_blob_store(&self) -> Result<Arc<dyn BlobStore>> {
        let store: Arc<dyn BlobStore> = match self.blob_backend {
            BlobBackend::Cdn => Arc::new(CdnBlobStore::new(self.cdn.clone())),
            BlobBackend::Object => Arc::new(
                ObjectStore::new(
                    self.object_store_path.clone(),
                    self.object_store_public_url.clone(),
                    self.max_blob_size,
                )
                .await?,
            ),
        };
        tracing::info!(backend = store.backend_name(), "blob store ready");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> ClientConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = from_map(&[]);
        assert_eq!(config.blob_backend, BlobBackend::Object);
        assert_eq!(config.retention_interval, Duration::from_secs(7200));
        assert_eq!(config.max_blob_size, 50 * 1024 * 1024);
        assert_eq!(
            config.geo_providers,
            [ProviderKind::IpApiCo, ProviderKind::IpApiCom]
        );
        assert_eq!(config.cdn.upload_preset, "chat_media");
        assert!(config.settings_path.is_none());
    }

    #[test]
    fn overrides() {
        let config = from_map(&[
            ("BLOB_BACKEND", "cdn"),
            ("CDN_CLOUD_NAME", "demo"),
            ("RETENTION_INTERVAL_SECS", "60"),
            ("GEO_PROVIDERS", "ip-api.com, nowhere"),
            ("OBJECT_STORE_PUBLIC_URL", "https://files.example"),
        ]);
        assert_eq!(config.blob_backend, BlobBackend::Cdn);
        assert_eq!(config.cdn.cloud_name, "demo");
        assert_eq!(config.retention_interval, Duration::from_secs(60));
        assert_eq!(config.geo_providers, [ProviderKind::IpApiCom]);
        assert_eq!(
            config.object_store_public_url.as_deref(),
            Some("https://files.example")
        );
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = from_map(&[
            ("BLOB_BACKEND", "ftp"),
            ("RETENTION_INTERVAL_SECS", "0"),
            ("MAX_BLOB_SIZE", "lots"),
        ]);
        assert_eq!(config.blob_backend, BlobBackend::Object);
        assert_eq!(config.retention_interval, Duration::from_secs(7200));
        assert_eq!(config.max_blob_size, 50 * 1024 * 1024);

        let config = from_map(&[("RETENTION_INTERVAL_SECS", "18446744073709551615")]);
        assert_eq!(config.retention_interval, Duration::from_secs(7200));
        let year = MAX_RETENTION_INTERVAL.as_secs().to_string();
        let config = from_map(&[("RETENTION_INTERVAL_SECS", year.as_str())]);
        assert_eq!(config.retention_interval, MAX_RETENTION_INTERVAL);
    }

    #[tokio::test]
    async fn builds_object_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            object_store_path: dir.path().join("blobs"),
            ..ClientConfig::default()
        };
        let store = config.build_blob_store().await.unwrap();
        assert_eq!(store.backend_name(), "object-store");
        assert!(dir.path().join("blobs").is_dir());
    }
}
