use goldconnect_shared::ValidationError;
use goldconnect_store::StoreError;
use thiserror::Error;

use crate::purge::PurgeReport;

/// Errors surfaced by the client engine.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Rejected before any I/O was issued.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Store read/write or subscription failure. Rules rejections land here
    /// too and are not told apart from transient failures.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Upload failed on {backend} backend: {source}")]
    Upload {
        backend: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Purge incomplete: {failed} deletion(s) failed")]
    PartialPurge { failed: usize, report: PurgeReport },

    #[error("Purge scheduler already started")]
    AlreadyStarted,

    #[error("Recording error: {0}")]
    Recording(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
