//! Local caching for offline access.
//!
//! This module provides durable storage for the last accepted content
//! snapshot and flag set:
//!
//! - `CacheManager`: named JSON documents in the cache directory, written
//!   via write-then-rename
//! - `KeyValueStore`: small string entries (`cached_version`, `cached_etag`,
//!   `flags_cached_etag`, `session_favorites`)
//! - `Bootstrap`: read-only defaults shipped with the application
//! - `SnapshotStore`: cache-then-bootstrap loading plus version/validator
//!   metadata for one document kind

pub mod bootstrap;
pub mod error;
pub mod manager;
pub mod preferences;
pub mod store;

pub use bootstrap::Bootstrap;
pub use error::StorageError;
pub use manager::{age_display, CacheManager, CachedData};
pub use preferences::KeyValueStore;
pub use store::{
    CacheMetadata, ContentStore, DocumentKind, FlagStore, LocalDocument, SnapshotSource,
    SnapshotStore, Versioned, CONTENT, FLAGS,
};
