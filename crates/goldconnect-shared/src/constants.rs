/// Application name
pub const APP_NAME: &str = "Gold Connect";

/// Document store collections
pub const USERS_COLLECTION: &str = "users";
pub const GROUP_MESSAGES_COLLECTION: &str = "groupMessages";
pub const PRIVATE_MESSAGES_COLLECTION: &str = "privateMessages";
pub const VERIFY_COLLECTION: &str = "verifyData";

/// Every top-level collection wiped by the retention purge.
pub const PURGED_COLLECTIONS: [&str; 4] = [
    USERS_COLLECTION,
    GROUP_MESSAGES_COLLECTION,
    PRIVATE_MESSAGES_COLLECTION,
    VERIFY_COLLECTION,
];

/// Root folder of the generic object-store layout
pub const UPLOADS_ROOT: &str = "uploads";

/// Retention interval between purges (2 hours)
pub const RETENTION_INTERVAL_SECS: u64 = 2 * 60 * 60;

/// Longest video accepted for upload, in seconds
pub const MAX_VIDEO_DURATION_SECS: u64 = 180;

/// Maximum blob size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Container used for recorded voice notes
pub const AUDIO_CONTENT_TYPE: &str = "audio/webm";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Geolocation sentinel when every provider failed
pub const UNKNOWN_COUNTRY: &str = "Unknown";
pub const UNKNOWN_COUNTRY_CODE: &str = "XX";

/// Settings key of the persisted last-purge timestamp (unix millis)
pub const LAST_PURGE_SETTING: &str = "goldin:lastPurge";
