//! # goldconnect-client
//!
//! Presence-aware messaging engine embedded by the Gold Connect UI shell.
//!
//! [`GoldConnect`] wires the pieces together over one document store and one
//! blob store:
//!
//! - [`conversation::ConversationSync`]: group and private feeds, unread
//!   counters, read marks, sends.
//! - [`presence::PresenceSync`]: the user roster.
//! - [`upload::Uploader`]: media uploads with coarse progress.
//! - [`purge::PurgeScheduler`]: periodic wipe of all data.
//! - [`session::SessionGate`]: login with best-effort geolocation.

pub mod admin;
pub mod config;
pub mod conversation;
pub mod error;
pub mod geo;
pub mod logging;
pub mod presence;
pub mod purge;
pub mod recorder;
pub mod session;
pub mod subscription;
pub mod upload;
pub mod verify;

mod records;

use std::sync::{Arc, Mutex};

use goldconnect_shared::media::check_video_duration;
use goldconnect_shared::{GeoInfo, MediaKind, MessageBody, User, ValidationError};
use goldconnect_store::{BlobStore, Database, DocumentStore};
use tracing::info;

pub use crate::admin::{Admin, Channel, MessageStats};
pub use crate::config::{BlobBackend, ClientConfig};
pub use crate::conversation::{count_unread, ConversationSync, UnreadCounts};
pub use crate::error::{ClientError, Result};
pub use crate::geo::{GeoLocator, GeoProvider, HttpGeoProvider, ProviderKind};
pub use crate::presence::{online_except, PresenceSync};
pub use crate::purge::{PurgeReport, PurgeScheduler, Purger};
pub use crate::recorder::{CaptureDevice, CaptureStream, Clip, Recorder, RecorderState};
pub use crate::session::{ProfileUpdate, SessionGate};
pub use crate::subscription::{SubscriptionHandle, SubscriptionState, ViewScope};
pub use crate::upload::{UploadInput, Uploader};
pub use crate::verify::VerifyBook;

/// Where a message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The shared channel, tagged with the sender's country.
    Group { country: String },
    Private { to: String },
}

/// A picked file about to be sent.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub input: UploadInput,
    pub kind: MediaKind,
    pub caption: String,
    /// Measured by the caller. Required for videos, ignored otherwise.
    pub video_duration_secs: Option<f64>,
}

/// The engine, wired over one document store and one blob store.
#[derive(Clone)]
pub struct GoldConnect {
    conversations: ConversationSync,
    presence: PresenceSync,
    uploader: Uploader,
    session: SessionGate,
    verify: VerifyBook,
    admin: Admin,
    purger: Purger,
    geo: Arc<GeoLocator>,
}

impl GoldConnect {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        geo: GeoLocator,
    ) -> Self {
        Self {
            conversations: ConversationSync::new(store.clone()),
            presence: PresenceSync::new(store.clone()),
            uploader: Uploader::new(blobs.clone()),
            session: SessionGate::new(store.clone()),
            verify: VerifyBook::new(store.clone()),
            admin: Admin::new(store.clone()),
            purger: Purger::new(store, blobs),
            geo: Arc::new(geo),
        }
    }

    /// Build the configured blob backend and geolocation chain around
    /// `store`.
    pub async fn from_config(config: &ClientConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let blobs = config.build_blob_store().await?;
        let geo = GeoLocator::from_kinds(GeoLocator::http_client(), &config.geo_providers);
        Ok(Self::new(store, blobs, geo))
    }

    pub fn conversations(&self) -> &ConversationSync {
        &self.conversations
    }

    pub fn presence(&self) -> &PresenceSync {
        &self.presence
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    pub fn verify(&self) -> &VerifyBook {
        &self.verify
    }

    pub fn admin(&self) -> &Admin {
        &self.admin
    }

    pub fn purger(&self) -> &Purger {
        &self.purger
    }

    /// Locate the caller, then create or refresh their user record.
    pub async fn login(&self, name: &str) -> Result<User> {
        let geo = self.geo.locate().await;
        self.login_with(name, &geo).await
    }

    pub async fn login_with(&self, name: &str, geo: &GeoInfo) -> Result<User> {
        self.session.login_or_refresh(name, geo).await
    }

    /// Start the process-wide retention scheduler against the configured
    /// settings database. Only the first call in a process succeeds.
    pub async fn start_retention(&self, config: &ClientConfig) -> Result<()> {
        let db = match &config.settings_path {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir).map_err(goldconnect_store::StoreError::from)?;
                }
                Database::open_at(path)?
            }
            None => Database::new()?,
        };
        PurgeScheduler::new(
            self.purger.clone(),
            Arc::new(Mutex::new(db)),
            config.retention_interval,
        )
        .init()
        .await
    }

    pub async fn send(&self, sender: &str, to: &Destination, body: MessageBody) -> Result<String> {
        match to {
            Destination::Group { country } => {
                self.conversations.send_group(sender, body, country).await
            }
            Destination::Private { to } => self.conversations.send_private(sender, to, body).await,
        }
    }

    /// Upload a file then send it as a message of its kind.
    ///
    /// Videos longer than the limit, or of unknown length, are rejected
    /// before anything is uploaded. On failure nothing is sent and `file` can be retried.
    pub async fn send_file<P>(
        &self,
        sender: &str,
        to: &Destination,
        file: &OutgoingFile,
        on_progress: P,
    ) -> Result<String>
    where
        P: Fn(u8) + Send + Sync,
    {
        if file.kind == MediaKind::Video {
            let secs = file
                .video_duration_secs
                .ok_or(ValidationError::UnknownVideoDuration)?;
            check_video_duration(secs)?;
        }
        let media = self
            .uploader
            .upload_with_progress(file.input.clone(), file.kind, sender, on_progress)
            .await?;
        let body =
            MessageBody::from_parts(file.kind.into(), file.caption.clone(), Some(media), None)?;
        self.send(sender, to, body).await
    }

    /// Upload a recorded clip as an unnamed `audio/webm` blob and send it as
    /// an audio message carrying its duration.
    pub async fn send_voice_note(&self, sender: &str, to: &Destination, clip: &Clip) -> Result<String> {
        let input = UploadInput::Raw {
            bytes: clip.bytes.clone(),
            content_type: Some(clip.content_type.clone()),
        };
        let media = self.uploader.upload(input, MediaKind::Audio, sender).await?;
        info!(from = %sender, duration = clip.duration_secs, "voice note uploaded");
        self.send(sender, to, MessageBody::audio(media, clip.duration_secs))
            .await
    }
}
