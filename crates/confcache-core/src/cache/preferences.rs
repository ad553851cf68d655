use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use super::manager::write_atomic;
use super::StorageError;

/// Preferences file name in the cache directory
pub const PREFERENCES_FILE: &str = "preferences.json";

/// Small string-to-string store for cache metadata and favorites.
///
/// The whole map is rewritten on every mutation. A mutation only becomes
/// visible in memory once it has reached disk.
#[derive(Debug)]
pub struct KeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt preferences file, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read preferences, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::open(dir.join(PREFERENCES_FILE))
    }

    /// Value for `key`; empty strings read as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).filter(|v| !v.is_empty()).cloned()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StorageError> {
        let mut entries = self.lock();
        let mut next = entries.clone();
        apply(&mut next);
        if next == *entries {
            return Ok(());
        }

        let contents = serde_json::to_string_pretty(&next)?;
        write_atomic(&self.path, contents.as_bytes())?;
        *entries = next;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
