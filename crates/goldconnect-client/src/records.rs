//! Mapping between store documents and domain types.
//!
//! Reading is lenient: older group records were written as `userName`,
//! `content`, `fileURL` and `timestamp`, some lack `type` entirely, and the
//! document kind used to be called `file`. Records that still cannot be
//! turned into a valid [`Message`] are skipped.

use goldconnect_shared::{
    Audience, GeoInfo, MediaDescriptor, MediaInfo, Message, MessageBody, MessageKind, User,
    ValidationError, VerifyRecord,
};
use goldconnect_store::{server_timestamp, Document, Fields};
use goldconnect_shared::media::file_extension;
use serde_json::Value;
use tracing::debug;

/// Formats the CDN files under the `video` resource type that are audio.
const AUDIO_FORMATS: [&str; 7] = ["mp3", "m4a", "ogg", "oga", "opus", "wav", "aac"];

pub(crate) fn decode_group(doc: &Document) -> Option<Message> {
    let country = doc.str_field("country").unwrap_or_default().to_string();
    decode_message(doc, Audience::Group { country })
}

pub(crate) fn decode_private(doc: &Document) -> Option<Message> {
    let Some(to) = doc.first_str(&["to"]) else {
        debug!(id = %doc.id, "skipping private message without recipient");
        return None;
    };
    let audience = Audience::Private {
        to: to.to_string(),
        read: doc.bool_field("read").unwrap_or(false),
    };
    decode_message(doc, audience)
}

fn decode_media(doc: &Document) -> Option<MediaDescriptor> {
    let url = doc.first_str(&["mediaUrl", "fileURL"])?;
    let info = doc
        .fields
        .get("mediaInfo")
        .cloned()
        .and_then(|v| serde_json::from_value::<MediaInfo>(v).ok())
        .unwrap_or_default();
    Some(MediaDescriptor::from_persisted(url.to_string(), info))
}

/// Kind of a record stored without `type`. The CDN keeps audio under the
/// `video` resource type, so those are told apart by duration, format or
/// the voice-note file name.
fn infer_kind(media: Option<&MediaDescriptor>, audio_duration: Option<u32>) -> MessageKind {
    let Some(media) = media else {
        return MessageKind::Text;
    };
    match media.resource_type.as_str() {
        "image" => MessageKind::Image,
        "audio" => MessageKind::Audio,
        "video" if audio_duration.is_some_and(|d| d > 0) || looks_like_audio(media) => {
            MessageKind::Audio
        }
        "video" => MessageKind::Video,
        _ => MessageKind::Document,
    }
}

fn looks_like_audio(media: &MediaDescriptor) -> bool {
    let format = Some(media.format.as_str())
        .filter(|f| !f.is_empty() && *f != "unknown")
        .or_else(|| file_extension(&media.file_name))
        .or_else(|| file_extension(&media.url))
        .map(str::to_ascii_lowercase);
    match format.as_deref() {
        Some(f) if AUDIO_FORMATS.contains(&f) => true,
        Some("webm") => media.file_name.starts_with("audio_"),
        _ => false,
    }
}

fn decode_message(doc: &Document, audience: Audience) -> Option<Message> {
    let Some(from) = doc.first_str(&["from", "userName"]) else {
        debug!(id = %doc.id, "skipping message without sender");
        return None;
    };
    let media = decode_media(doc);
    let duration = doc
        .u64_field("audioDuration")
        .and_then(|d| u32::try_from(d).ok());
    let kind = match doc.str_field("type").filter(|t| !t.is_empty()) {
        Some(name) => match MessageKind::parse(name) {
            Some(kind) => kind,
            None => {
                debug!(id = %doc.id, kind = %name, "skipping message of unknown kind");
                return None;
            }
        },
        None => infer_kind(media.as_ref(), duration),
    };
    let text = doc.first_str(&["text", "content"]).unwrap_or_default();

    let body = match MessageBody::from_parts(kind, text.to_string(), media, duration) {
        Ok(body) => body,
        Err(e) => {
            debug!(id = %doc.id, error = %e, "skipping malformed message");
            return None;
        }
    };

    Some(Message {
        id: doc.id.clone(),
        from: from.to_string(),
        audience,
        body,
        created_at: doc
            .timestamp("createdAt")
            .or_else(|| doc.timestamp("timestamp")),
    })
}

/// Reject bodies that would violate the text-or-media invariant.
pub(crate) fn validate_body(body: &MessageBody) -> Result<(), ValidationError> {
    match body.media_descriptor() {
        Some(media) if media.url.trim().is_empty() => Err(ValidationError::MissingField("mediaUrl")),
        Some(_) => Ok(()),
        None if body.text_content().trim().is_empty() => Err(ValidationError::EmptyMessage),
        None => Ok(()),
    }
}

/// Fields of a new message. Media fields are left out entirely when the
/// body has no attachment.
pub(crate) fn encode_message(from: &str, audience: &Audience, body: &MessageBody) -> Fields {
    let mut fields = Fields::new();
    fields.insert("from".into(), from.into());
    match audience {
        Audience::Private { to, read } => {
            fields.insert("to".into(), to.as_str().into());
            fields.insert("read".into(), (*read).into());
        }
        Audience::Group { country } => {
            fields.insert("country".into(), country.as_str().into());
        }
    }
    fields.insert("type".into(), body.kind().as_str().into());
    fields.insert("text".into(), body.text_content().into());
    fields.insert("createdAt".into(), server_timestamp());

    if let Some(media) = body.media_descriptor() {
        fields.insert("mediaUrl".into(), media.url.as_str().into());
        fields.insert(
            "mediaInfo".into(),
            serde_json::to_value(media.info()).unwrap_or(Value::Null),
        );
    }
    if let Some(duration) = body.audio_duration() {
        fields.insert("audioDuration".into(), duration.into());
    }
    fields
}

pub(crate) fn decode_user(doc: &Document) -> User {
    let text = |key: &str| doc.str_field(key).unwrap_or_default().to_string();
    User {
        pseudo: doc
            .first_str(&["pseudo"])
            .unwrap_or(doc.id.as_str())
            .to_string(),
        name: text("name"),
        phone: text("phone"),
        country: text("country"),
        country_code: text("countryCode"),
        created_at: doc.timestamp("createdAt"),
        last_seen: doc.timestamp("lastSeen"),
        connection_time: doc.timestamp("connectionTime"),
    }
}

pub(crate) fn encode_new_user(pseudo: &str, geo: &GeoInfo) -> Fields {
    let mut fields = Fields::new();
    fields.insert("pseudo".into(), pseudo.into());
    fields.insert("name".into(), "".into());
    fields.insert("phone".into(), "".into());
    fields.insert("country".into(), geo.country.as_str().into());
    fields.insert("countryCode".into(), geo.country_code.as_str().into());
    fields.insert("createdAt".into(), server_timestamp());
    fields.insert("lastSeen".into(), server_timestamp());
    fields.insert("connectionTime".into(), server_timestamp());
    fields
}

pub(crate) fn decode_verify(doc: &Document) -> VerifyRecord {
    let text = |key: &str| doc.str_field(key).unwrap_or_default().to_string();
    VerifyRecord {
        id: doc.id.clone(),
        name: text("name"),
        country: text("country"),
        phone_number: text("phoneNumber"),
        created_at: doc.timestamp("createdAt"),
        updated_at: doc.timestamp("updatedAt"),
    }
}
