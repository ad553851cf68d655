use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::bootstrap::{Bootstrap, CONTENT_DOCUMENT, FLAGS_DOCUMENT};
use super::{CacheManager, KeyValueStore, StorageError};
use crate::models::{decode_document, ContentSnapshot, FeatureFlagSet};

/// File names and metadata keys for one kind of cached document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentKind {
    pub cache_file: &'static str,
    pub bootstrap_document: &'static str,
    /// Key holding the accepted content version, for gated documents.
    pub version_key: Option<&'static str>,
    pub validator_key: &'static str,
}

pub const CONTENT: DocumentKind = DocumentKind {
    cache_file: "conference_cache.json",
    bootstrap_document: CONTENT_DOCUMENT,
    version_key: Some("cached_version"),
    validator_key: "cached_etag",
};

pub const FLAGS: DocumentKind = DocumentKind {
    cache_file: "featureflags_cache.json",
    bootstrap_document: FLAGS_DOCUMENT,
    version_key: None,
    validator_key: "flags_cached_etag",
};

/// A document that carries its own version string.
pub trait Versioned {
    fn version(&self) -> &str;
}

impl Versioned for ContentSnapshot {
    fn version(&self) -> &str {
        &self.content_version
    }
}

impl Versioned for FeatureFlagSet {
    fn version(&self) -> &str {
        &self.version
    }
}

/// Side-channel metadata kept next to a cached document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetadata {
    pub version: Option<String>,
    pub validator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Cache,
    Bootstrap,
}

/// A document loaded from local storage, with where it came from.
#[derive(Debug, Clone)]
pub struct LocalDocument<T> {
    pub data: T,
    pub source: SnapshotSource,
    pub cached_at: Option<DateTime<Utc>>,
}

/// Durable storage of the last accepted document of one kind, its metadata,
/// and the bootstrap fallback used when nothing has been cached yet.
///
/// Storage failures on the read side are logged and read as a cache miss.
pub struct SnapshotStore<T> {
    kind: DocumentKind,
    cache: CacheManager,
    prefs: Arc<KeyValueStore>,
    bootstrap: Bootstrap,
    _document: PhantomData<fn() -> T>,
}

pub type ContentStore = SnapshotStore<ContentSnapshot>;
pub type FlagStore = SnapshotStore<FeatureFlagSet>;

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned + Versioned,
{
    pub fn new(
        kind: DocumentKind,
        cache: CacheManager,
        prefs: Arc<KeyValueStore>,
        bootstrap: Bootstrap,
    ) -> Self {
        Self {
            kind,
            cache,
            prefs,
            bootstrap,
            _document: PhantomData,
        }
    }

    /// The persisted document, if one exists and parses.
    pub fn load_cached(&self) -> Option<LocalDocument<T>> {
        match self.cache.load::<T>(self.kind.cache_file) {
            Ok(Some(cached)) => {
                debug!(
                    cache = self.kind.cache_file,
                    version = cached.data.version(),
                    age = %cached.age_display(),
                    "Cache hit"
                );
                Some(LocalDocument {
                    data: cached.data,
                    source: SnapshotSource::Cache,
                    cached_at: Some(cached.cached_at),
                })
            }
            Ok(None) => {
                debug!(cache = self.kind.cache_file, "Cache miss");
                None
            }
            Err(e @ StorageError::Corrupt { .. }) => {
                warn!(cache = self.kind.cache_file, error = %e, "Corrupt cache, discarding");
                if let Err(e) = self.cache.remove(self.kind.cache_file) {
                    warn!(cache = self.kind.cache_file, error = %e, "Failed to remove corrupt cache");
                }
                None
            }
            Err(e) => {
                warn!(cache = self.kind.cache_file, error = %e, "Unreadable cache, treating as miss");
                None
            }
        }
    }

    /// The bundled default document, if the bootstrap source has one.
    pub fn load_bootstrap(&self) -> Option<LocalDocument<T>> {
        let text = match self.bootstrap.document(self.kind.bootstrap_document) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(document = self.kind.bootstrap_document, "No bootstrap document");
                return None;
            }
            Err(e) => {
                warn!(document = self.kind.bootstrap_document, error = %e, "Failed to read bootstrap");
                return None;
            }
        };

        match decode_document::<T>(&text) {
            Ok(data) => {
                debug!(
                    document = self.kind.bootstrap_document,
                    version = data.version(),
                    "Loaded bootstrap"
                );
                Some(LocalDocument {
                    data,
                    source: SnapshotSource::Bootstrap,
                    cached_at: None,
                })
            }
            Err(e) => {
                warn!(document = self.kind.bootstrap_document, error = %e, "Malformed bootstrap document");
                None
            }
        }
    }

    /// Cache first, then bootstrap.
    ///
    /// On a cache miss the stored version and validator describe a document
    /// that is no longer there, so they are dropped before the bootstrap is
    /// served.
    pub fn load(&self) -> Option<LocalDocument<T>> {
        if let Some(cached) = self.load_cached() {
            return Some(cached);
        }
        self.forget_metadata();
        self.load_bootstrap()
    }

    /// Persist `data` and, for gated documents, record its version.
    pub fn save(&self, data: &T) -> Result<(), StorageError> {
        self.cache.save(self.kind.cache_file, data)?;
        if let Some(version_key) = self.kind.version_key {
            self.prefs.set(version_key, data.version())?;
        }
        Ok(())
    }

    pub fn metadata(&self) -> CacheMetadata {
        CacheMetadata {
            version: self.kind.version_key.and_then(|key| self.prefs.get(key)),
            validator: self.prefs.get(self.kind.validator_key),
        }
    }

    /// Record the validator for the document just saved; `None` forgets it.
    pub fn set_validator(&self, validator: Option<&str>) -> Result<(), StorageError> {
        match validator.filter(|v| !v.is_empty()) {
            Some(v) => self.prefs.set(self.kind.validator_key, v),
            None => self.prefs.remove(self.kind.validator_key),
        }
    }

    fn forget_metadata(&self) {
        let keys = self
            .kind
            .version_key
            .into_iter()
            .chain([self.kind.validator_key]);
        for key in keys {
            if let Err(e) = self.prefs.remove(key) {
                warn!(key, error = %e, "Failed to clear cache metadata");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{content_json, flags_json};

    fn content_store(dir: &std::path::Path, bootstrap: Bootstrap) -> ContentStore {
        let cache = CacheManager::new(dir.to_path_buf()).unwrap();
        let prefs = Arc::new(KeyValueStore::in_dir(dir));
        SnapshotStore::new(CONTENT, cache, prefs, bootstrap)
    }

    fn bootstrap_with_content(version: &str) -> Bootstrap {
        Bootstrap::Documents {
            content: Some(content_json(version)),
            flags: Some(flags_json("1.0", false)),
        }
    }

    #[test]
    fn test_load_falls_back_to_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let store = content_store(dir.path(), bootstrap_with_content("1"));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, SnapshotSource::Bootstrap);
        assert_eq!(loaded.data.content_version, "1");
        assert_eq!(store.metadata(), CacheMetadata::default());
    }

    #[test]
    fn test_save_prefers_cache_and_records_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = content_store(dir.path(), bootstrap_with_content("1"));
        let snapshot: ContentSnapshot = decode_document(&content_json("5")).unwrap();

        store.save(&snapshot).unwrap();
        store.set_validator(Some("\"v5\"")).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, SnapshotSource::Cache);
        assert_eq!(loaded.data, snapshot);
        assert!(loaded.cached_at.is_some());
        assert_eq!(
            store.metadata(),
            CacheMetadata {
                version: Some("5".into()),
                validator: Some("\"v5\"".into()),
            }
        );

        store.set_validator(None).unwrap();
        assert_eq!(store.metadata().validator, None);
    }

    #[test]
    fn test_corrupt_cache_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = content_store(dir.path(), bootstrap_with_content("1"));
        std::fs::write(dir.path().join(CONTENT.cache_file), "{\"data\":").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, SnapshotSource::Bootstrap);
        assert!(!dir.path().join(CONTENT.cache_file).exists());
    }

    #[test]
    fn test_cache_miss_forgets_stale_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = content_store(dir.path(), bootstrap_with_content("1"));
        let snapshot: ContentSnapshot = decode_document(&content_json("5")).unwrap();
        store.save(&snapshot).unwrap();
        store.set_validator(Some("\"v5\"")).unwrap();

        std::fs::write(dir.path().join(CONTENT.cache_file), "{\"data\":").unwrap();
        let reopened = content_store(dir.path(), bootstrap_with_content("1"));
        let loaded = reopened.load().unwrap();

        assert_eq!(loaded.data.content_version, "1");
        assert_eq!(reopened.metadata(), CacheMetadata::default());
        let prefs = KeyValueStore::in_dir(dir.path());
        assert_eq!(prefs.get("cached_version"), None);
        assert_eq!(prefs.get("cached_etag"), None);
    }

    #[test]
    fn test_nothing_available() {
        let dir = tempfile::tempdir().unwrap();
        let store = content_store(dir.path(), Bootstrap::None);
        assert!(store.load().is_none());
    }

    #[test]
    fn test_malformed_bootstrap_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = content_store(
            dir.path(),
            Bootstrap::Documents {
                content: Some("[1, 2".into()),
                flags: None,
            },
        );
        assert!(store.load().is_none());
    }

    #[test]
    fn test_flag_store_has_no_version_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        let prefs = Arc::new(KeyValueStore::in_dir(dir.path()));
        let store: FlagStore = SnapshotStore::new(FLAGS, cache, prefs.clone(), Bootstrap::None);

        store.save(&FeatureFlagSet::default()).unwrap();
        store.set_validator(Some("\"f1\"")).unwrap();

        assert_eq!(store.metadata().version, None);
        assert_eq!(prefs.get("flags_cached_etag").as_deref(), Some("\"f1\""));
        assert_eq!(prefs.get("cached_etag"), None);
    }
}
