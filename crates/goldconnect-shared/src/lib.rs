//! Domain model shared by the Gold Connect store and client crates.

pub mod constants;
pub mod error;
pub mod media;
pub mod message;
pub mod user;
pub mod verify;

pub use error::ValidationError;
pub use media::{MediaDescriptor, MediaInfo, MediaKind, ResourceKind};
pub use message::{Attachment, Audience, Message, MessageBody, MessageKind};
pub use user::{GeoInfo, User};
pub use verify::{NewVerifyRecord, VerifyRecord};
