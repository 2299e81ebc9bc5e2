use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error from the local settings database.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (object store files, settings directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A point operation targeted a document or object that does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The remote store rejected the operation (e.g. security rules).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The store is unreachable or shut down.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// HTTP transport failure talking to a remote backend.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote backend answered with a non-2xx status.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The configured backend does not implement this operation.
    #[error("Unsupported by {backend}: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    #[error("Empty blob")]
    EmptyBlob,

    /// A blob path escaped the store root or was otherwise malformed.
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Permission failures are reported like any other I/O failure upstream,
    /// but logging keeps them apart.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
