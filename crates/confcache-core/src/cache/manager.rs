use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::StorageError;
use crate::models::decode_document;

/// Envelope written around every cached document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        age_display(self.cached_at)
    }
}

/// Human readable age of a timestamp: "just now", "5m ago", "2h ago", "3d ago".
/// Hours and days round to the nearest unit.
pub fn age_display(at: DateTime<Utc>) -> String {
    let minutes = (Utc::now() - at).num_minutes();
    match minutes {
        // Clock skew reads as fresh
        i64::MIN..=0 => "just now".to_string(),
        1..=59 => format!("{}m ago", minutes),
        60..=1439 => format!("{}h ago", (minutes + 30) / 60),
        _ => format!("{}d ago", (minutes + 720) / 1440),
    }
}

/// JSON documents stored by name in one cache directory.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a reader sees either the old file or the new one.
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&cache_dir).map_err(|e| StorageError::io(&cache_dir, e))?;
        Ok(Self { cache_dir })
    }

    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>, StorageError> {
        let path = self.cache_path(name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };

        let cached = decode_document(&contents)
            .map_err(|source| StorageError::Corrupt { path: path.clone(), source })?;
        debug!(cache = name, "Loaded cache file");
        Ok(Some(cached))
    }

    pub fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<(), StorageError> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_string_pretty(&cached)?;
        write_atomic(&self.cache_path(name), contents.as_bytes())
    }

    pub fn remove(&self, name: &str) -> Result<(), StorageError> {
        let path = self.cache_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}

/// Write `contents` to a temp sibling of `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, contents).map_err(|e| StorageError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
}
