use thiserror::Error;

use crate::message::MessageKind;

/// Input rejected before any I/O is issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Display name must not be empty")]
    EmptyName,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Message has neither text nor media")]
    EmptyMessage,

    #[error("A {0} message requires a media descriptor")]
    MissingMedia(MessageKind),

    #[error("Video too long: {secs}s (max {max}s)")]
    VideoTooLong { secs: u64, max: u64 },

    #[error("Video duration unknown")]
    UnknownVideoDuration,

    #[error("Invalid country code: {0}")]
    InvalidCountryCode(String),
}
