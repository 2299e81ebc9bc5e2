//! # goldconnect-store
//!
//! Storage collaborators of the Gold Connect client.
//!
//! - [`DocumentStore`]: remote collections with point reads/writes, atomic
//!   batches and whole-result-set push subscriptions, plus the in-process
//!   [`MemoryDocumentStore`].
//! - [`BlobStore`]: binary uploads with two interchangeable backends,
//!   [`CdnBlobStore`] and the filesystem [`ObjectStore`], plus
//!   [`MemoryBlobStore`].
//! - [`Database`]: the local SQLite settings file.

pub mod blob;
pub mod cdn;
pub mod database;
pub mod document;
pub mod memory;
pub mod memory_blob;
pub mod migrations;
pub mod object_store;

mod error;

pub use blob::{BlobStore, BlobUpload, Listing, StoredBlob};
pub use cdn::{CdnBlobStore, CdnConfig};
pub use database::Database;
pub use document::{
    server_timestamp, Direction, Document, DocumentStore, Fields, Query, Subscription, Write,
    WriteBatch,
};
pub use error::{Result, StoreError};
pub use memory::MemoryDocumentStore;
pub use memory_blob::MemoryBlobStore;
pub use object_store::ObjectStore;
