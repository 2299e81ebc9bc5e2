//! Group and private messages.
//!
//! A message body is a tagged variant per kind, so a body that has neither
//! text nor media cannot be constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::media::{MediaDescriptor, MediaKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    /// Parse a stored `type` field. Older clients wrote `file` for documents.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "document" | "file" => Some(Self::Document),
            _ => None,
        }
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::Text => None,
            Self::Image => Some(MediaKind::Image),
            Self::Audio => Some(MediaKind::Audio),
            Self::Video => Some(MediaKind::Video),
            Self::Document => Some(MediaKind::Document),
        }
    }
}

impl From<MediaKind> for MessageKind {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => Self::Image,
            MediaKind::Audio => Self::Audio,
            MediaKind::Video => Self::Video,
            MediaKind::Document => Self::Document,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media payload plus the (usually empty) text sent alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub media: MediaDescriptor,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Image(Attachment),
    Audio {
        attachment: Attachment,
        /// Whole seconds; `None` when unknown or zero.
        duration_secs: Option<u32>,
    },
    Video(Attachment),
    Document(Attachment),
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Result<Self, ValidationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(Self::Text(text))
    }

    pub fn media(kind: MediaKind, media: MediaDescriptor) -> Self {
        let attachment = Attachment {
            media,
            caption: String::new(),
        };
        match kind {
            MediaKind::Image => Self::Image(attachment),
            MediaKind::Audio => Self::Audio {
                attachment,
                duration_secs: None,
            },
            MediaKind::Video => Self::Video(attachment),
            MediaKind::Document => Self::Document(attachment),
        }
    }

    pub fn audio(media: MediaDescriptor, duration_secs: u32) -> Self {
        Self::Audio {
            attachment: Attachment {
                media,
                caption: String::new(),
            },
            duration_secs: (duration_secs > 0).then_some(duration_secs),
        }
    }

    /// Build a body from loosely-typed parts. The kind decides which parts
    /// are required.
    pub fn from_parts(
        kind: MessageKind,
        text: String,
        media: Option<MediaDescriptor>,
        audio_duration: Option<u32>,
    ) -> Result<Self, ValidationError> {
        let Some(media_kind) = kind.media_kind() else {
            return Self::text(text);
        };
        let media = media.ok_or(ValidationError::MissingMedia(kind))?;
        let attachment = Attachment {
            media,
            caption: text,
        };
        Ok(match media_kind {
            MediaKind::Image => Self::Image(attachment),
            MediaKind::Audio => Self::Audio {
                attachment,
                duration_secs: audio_duration.filter(|d| *d > 0),
            },
            MediaKind::Video => Self::Video(attachment),
            MediaKind::Document => Self::Document(attachment),
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text(_) => MessageKind::Text,
            Self::Image(_) => MessageKind::Image,
            Self::Audio { .. } => MessageKind::Audio,
            Self::Video(_) => MessageKind::Video,
            Self::Document(_) => MessageKind::Document,
        }
    }

    pub fn text_content(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Image(a) | Self::Video(a) | Self::Document(a) => &a.caption,
            Self::Audio { attachment, .. } => &attachment.caption,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            Self::Text(_) => None,
            Self::Image(a) | Self::Video(a) | Self::Document(a) => Some(a),
            Self::Audio { attachment, .. } => Some(attachment),
        }
    }

    pub fn media_descriptor(&self) -> Option<&MediaDescriptor> {
        self.attachment().map(|a| &a.media)
    }

    pub fn audio_duration(&self) -> Option<u32> {
        match self {
            Self::Audio { duration_secs, .. } => *duration_secs,
            _ => None,
        }
    }
}

/// Where a message was posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// The single shared channel. `country` is the sender's country name.
    Group { country: String },
    Private { to: String, read: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned opaque id.
    pub id: String,
    pub from: String,
    pub audience: Audience,
    pub body: MessageBody,
    /// Server-assigned; absent on legacy records.
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn recipient(&self) -> Option<&str> {
        match &self.audience {
            Audience::Private { to, .. } => Some(to),
            Audience::Group { .. } => None,
        }
    }

    pub fn is_read(&self) -> bool {
        match self.audience {
            Audience::Private { read, .. } => read,
            Audience::Group { .. } => true,
        }
    }

    /// True for a private message addressed to `name` that was not read yet.
    pub fn is_unread_for(&self, name: &str) -> bool {
        matches!(&self.audience, Audience::Private { to, read: false } if to == name)
    }

    /// True when this private message was exchanged between `a` and `b`,
    /// in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        match self.recipient() {
            Some(to) => (self.from == a && to == b) || (self.from == b && to == a),
            None => false,
        }
    }

    /// True when `name` sent or received this private message.
    pub fn involves(&self, name: &str) -> bool {
        self.from == name || self.recipient() == Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media() -> MediaDescriptor {
        MediaDescriptor {
            url: "https://cdn/a.webm".into(),
            public_id: "a".into(),
            resource_type: "video".into(),
            format: "webm".into(),
            file_name: "a.webm".into(),
            file_size: 3,
            uploaded_by: None,
            uploaded_at: None,
        }
    }

    fn private(from: &str, to: &str, read: bool) -> Message {
        Message {
            id: "m".into(),
            from: from.into(),
            audience: Audience::Private {
                to: to.into(),
                read,
            },
            body: MessageBody::text("hi").unwrap(),
            created_at: None,
        }
    }

    #[test]
    fn empty_text_rejected() {
        assert_eq!(MessageBody::text("   "), Err(ValidationError::EmptyMessage));
        assert!(MessageBody::text("hi").is_ok());
    }

    #[test]
    fn media_kind_requires_media() {
        let err = MessageBody::from_parts(MessageKind::Image, String::new(), None, None);
        assert_eq!(err, Err(ValidationError::MissingMedia(MessageKind::Image)));
    }

    #[test]
    fn kind_is_authoritative() {
        let body =
            MessageBody::from_parts(MessageKind::Audio, String::new(), Some(media()), Some(7))
                .unwrap();
        assert_eq!(body.kind(), MessageKind::Audio);
        assert_eq!(body.audio_duration(), Some(7));
        assert_eq!(body.text_content(), "");

        // a text kind never renders its media
        let text = MessageBody::from_parts(MessageKind::Text, "yo".into(), Some(media()), None)
            .unwrap();
        assert!(text.media_descriptor().is_none());
    }

    #[test]
    fn zero_audio_duration_is_dropped() {
        assert_eq!(MessageBody::audio(media(), 0).audio_duration(), None);
        assert_eq!(MessageBody::audio(media(), 4).audio_duration(), Some(4));
    }

    #[test]
    fn legacy_kind_names() {
        assert_eq!(MessageKind::parse("file"), Some(MessageKind::Document));
        assert_eq!(MessageKind::parse("sticker"), None);
    }

    #[test]
    fn private_predicates() {
        let m = private("alice", "bob", false);
        assert!(m.is_unread_for("bob"));
        assert!(!m.is_unread_for("alice"));
        assert!(m.is_between("bob", "alice"));
        assert!(!m.is_between("bob", "carol"));
        assert!(m.involves("alice"));
        assert!(!m.involves("carol"));
        assert!(!private("alice", "bob", true).is_unread_for("bob"));
    }
}
