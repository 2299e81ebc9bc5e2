//! Media descriptors and the two media classifications in play: the
//! application's own [`MediaKind`] and the blob store's coarse
//! [`ResourceKind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{AUDIO_CONTENT_TYPE, DEFAULT_CONTENT_TYPE, MAX_VIDEO_DURATION_SECS};
use crate::error::ValidationError;

/// Kind of media a user can attach to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    /// Classify a file picked by the user from its MIME type.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else {
            Self::Document
        }
    }

    /// File name given to an unnamed binary blob of this kind.
    pub fn synthesized_name(&self, millis: i64) -> String {
        match self {
            Self::Audio => format!("audio_{millis}.webm"),
            _ => format!("file_{millis}.bin"),
        }
    }

    /// Content type assumed when an unnamed blob carries none.
    pub fn fallback_content_type(&self) -> &'static str {
        match self {
            Self::Audio => AUDIO_CONTENT_TYPE,
            _ => DEFAULT_CONTENT_TYPE,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The media CDN's upload pipeline selector.
///
/// The CDN has no audio class: audio is stored as `video`. Anything that is
/// not an image or a video/audio stream goes through the `raw` pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Video,
    Raw,
}

impl ResourceKind {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("video/") || mime.starts_with("audio/") {
            Self::Video
        } else if mime.starts_with("image/") {
            Self::Image
        } else {
            Self::Raw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Raw => "raw",
        }
    }
}

/// Normalised result of an upload, embedded in exactly one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    pub url: String,
    /// Opaque storage id (CDN public id or object path).
    pub public_id: String,
    pub resource_type: String,
    pub format: String,
    pub file_name: String,
    pub file_size: u64,
    /// Only known on the uploading side; not persisted in messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// The `mediaInfo` object persisted next to `mediaUrl` in a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaInfo {
    pub public_id: String,
    pub resource_type: String,
    pub format: String,
    pub file_name: String,
    pub file_size: u64,
}

impl MediaDescriptor {
    pub fn info(&self) -> MediaInfo {
        MediaInfo {
            public_id: self.public_id.clone(),
            resource_type: self.resource_type.clone(),
            format: self.format.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size,
        }
    }

    pub fn from_persisted(url: String, info: MediaInfo) -> Self {
        Self {
            url,
            public_id: info.public_id,
            resource_type: info.resource_type,
            format: info.format,
            file_name: info.file_name,
            file_size: info.file_size,
            uploaded_by: None,
            uploaded_at: None,
        }
    }
}

/// Extension of a file name, without the dot.
pub fn file_extension(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Caller-side gate run before a video is handed to the uploader.
pub fn check_video_duration(duration_secs: f64) -> Result<(), ValidationError> {
    if !duration_secs.is_finite() || duration_secs < 0.0 {
        return Err(ValidationError::UnknownVideoDuration);
    }
    if duration_secs > MAX_VIDEO_DURATION_SECS as f64 {
        return Err(ValidationError::VideoTooLong {
            secs: duration_secs.ceil() as u64,
            max: MAX_VIDEO_DURATION_SECS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdn_stores_audio_as_video() {
        assert_eq!(ResourceKind::from_mime("audio/webm"), ResourceKind::Video);
        assert_eq!(ResourceKind::from_mime("video/mp4"), ResourceKind::Video);
        assert_eq!(ResourceKind::from_mime("image/png"), ResourceKind::Image);
        assert_eq!(ResourceKind::from_mime("application/pdf"), ResourceKind::Raw);
        assert_eq!(ResourceKind::from_mime(""), ResourceKind::Raw);
    }

    #[test]
    fn media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/webm"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("audio/ogg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("text/plain"), MediaKind::Document);
    }

    #[test]
    fn synthesized_names() {
        assert_eq!(MediaKind::Audio.synthesized_name(42), "audio_42.webm");
        assert_eq!(MediaKind::Image.synthesized_name(42), "file_42.bin");
        assert_eq!(MediaKind::Audio.fallback_content_type(), "audio/webm");
        assert_eq!(
            MediaKind::Document.fallback_content_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn extensions() {
        assert_eq!(file_extension("photo.png"), Some("png"));
        assert_eq!(file_extension("archive.tar.gz"), Some("gz"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension(".hidden"), None);
    }

    #[test]
    fn video_gate() {
        assert!(check_video_duration(180.0).is_ok());
        assert_eq!(
            check_video_duration(180.5),
            Err(ValidationError::VideoTooLong { secs: 181, max: 180 })
        );
        assert_eq!(
            check_video_duration(f64::NAN),
            Err(ValidationError::UnknownVideoDuration)
        );
        assert_eq!(
            check_video_duration(f64::INFINITY),
            Err(ValidationError::UnknownVideoDuration)
        );
    }

    #[test]
    fn descriptor_wire_shape() {
        let media = MediaDescriptor {
            url: "https://cdn/x.png".into(),
            public_id: "x".into(),
            resource_type: "image".into(),
            format: "png".into(),
            file_name: "x.png".into(),
            file_size: 12,
            uploaded_by: None,
            uploaded_at: None,
        };
        let json = serde_json::to_value(&media).unwrap();
        assert_eq!(json["publicId"], "x");
        assert_eq!(json["fileSize"], 12);
        assert!(json.get("uploadedBy").is_none());

        let back = MediaDescriptor::from_persisted(media.url.clone(), media.info());
        assert_eq!(back, media);
    }
}
