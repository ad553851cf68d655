//! Persisted set of favorited session ids.
//!
//! The set lives independently of any snapshot: ids that disappear from the
//! feed are kept until cleared. Every mutation bumps a generation counter so
//! holders of derived favorite flags can tell when they are out of date.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::cache::{KeyValueStore, StorageError};
use crate::models::Session;

/// Preferences key holding the serialized id list
pub const FAVORITES_KEY: &str = "session_favorites";

fn session_of<S: AsRef<Session>>(s: &S) -> &Session {
    AsRef::<Session>::as_ref(s)
}

#[derive(Debug, Default)]
struct FavoriteState {
    ids: HashSet<String>,
    generation: u64,
}

#[derive(Debug)]
pub struct FavoritesStore {
    prefs: Arc<KeyValueStore>,
    state: RwLock<FavoriteState>,
}

impl FavoritesStore {
    /// Load the persisted set. An unreadable entry starts an empty set.
    pub fn new(prefs: Arc<KeyValueStore>) -> Self {
        let ids = match prefs.get(FAVORITES_KEY) {
            None => HashSet::new(),
            Some(json) => match serde_json::from_str::<Vec<String>>(&json) {
                Ok(list) => list.into_iter().collect(),
                Err(e) => {
                    warn!(error = %e, "Corrupt favorites entry, starting empty");
                    HashSet::new()
                }
            },
        };
        debug!(count = ids.len(), "Loaded favorites");

        Self {
            prefs,
            state: RwLock::new(FavoriteState { ids, generation: 0 }),
        }
    }

    pub fn is_favorite(&self, session_id: &str) -> bool {
        self.read().ids.contains(session_id)
    }

    /// Flip membership of `session_id`, persist the whole set, and return the
    /// new state. Nothing changes in memory if the write fails.
    pub fn toggle(&self, session_id: &str) -> Result<bool, StorageError> {
        self.toggle_tracked(session_id).map(|(now_favorite, _)| now_favorite)
    }

    /// [`toggle`](Self::toggle), also returning the generation it produced.
    pub(crate) fn toggle_tracked(&self, session_id: &str) -> Result<(bool, u64), StorageError> {
        let mut state = self.write();
        let mut ids = state.ids.clone();
        let now_favorite = if ids.remove(session_id) {
            false
        } else {
            ids.insert(session_id.to_string());
            true
        };

        self.persist(&ids)?;
        state.ids = ids;
        state.generation += 1;
        debug!(session = session_id, favorite = now_favorite, "Toggled favorite");
        Ok((now_favorite, state.generation))
    }

    /// Remove every id, including ones no longer in the snapshot.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.write();
        if state.ids.is_empty() {
            return Ok(());
        }
        self.persist(&HashSet::new())?;
        state.ids.clear();
        state.generation += 1;
        Ok(())
    }

    /// Favorited ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().ids.is_empty()
    }

    /// Bumped on every successful mutation.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// The current set together with its generation, read atomically.
    pub fn snapshot(&self) -> (HashSet<String>, u64) {
        let state = self.read();
        (state.ids.clone(), state.generation)
    }

    /// The favorited entries of `sessions`, ordered by start time.
    pub fn list<'a, S: AsRef<Session>>(&self, sessions: &'a [S]) -> Vec<&'a S> {
        let state = self.read();
        let mut favorites: Vec<&S> = sessions
            .iter()
            .filter(|s| state.ids.contains(&session_of(*s).id))
            .collect();
        favorites.sort_by_key(|s| session_of(*s).start_utc);
        favorites
    }

    fn persist(&self, ids: &HashSet<String>) -> Result<(), StorageError> {
        // Stored as an ordered list; duplicates collapse on load
        let ordered: Vec<&String> = ids.iter().collect::<BTreeSet<_>>().into_iter().collect();
        let json = serde_json::to_string(&ordered)?;
        self.prefs.set(FAVORITES_KEY, &json)
    }

    fn read(&self) -> RwLockReadGuard<'_, FavoriteState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, FavoriteState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn store(dir: &std::path::Path) -> FavoritesStore {
        FavoritesStore::new(Arc::new(KeyValueStore::in_dir(dir)))
    }

    fn session(id: &str, hour: u32) -> Session {
        Session {
            id: id.to_string(),
            start_utc: Utc.with_ymd_and_hms(2025, 5, 1, hour, 0, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_toggle_is_an_involution() {
        let dir = tempfile::tempdir().unwrap();
        let favorites = store(dir.path());

        assert!(!favorites.is_favorite("S1"));
        assert!(favorites.toggle("S1").unwrap());
        assert!(favorites.is_favorite("S1"));
        assert!(!favorites.toggle("S1").unwrap());
        assert!(!favorites.is_favorite("S1"));
        assert_eq!(favorites.generation(), 2);
    }

    #[test]
    fn test_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let favorites = store(dir.path());
        favorites.toggle("S2").unwrap();
        favorites.toggle("S1").unwrap();

        let prefs = KeyValueStore::in_dir(dir.path());
        assert_eq!(prefs.get(FAVORITES_KEY).as_deref(), Some(r#"["S1","S2"]"#));
        assert_eq!(store(dir.path()).ids(), vec!["S1", "S2"]);
    }

    #[test]
    fn test_duplicate_entries_collapse() {
        let dir = tempfile::tempdir().unwrap();
        KeyValueStore::in_dir(dir.path())
            .set(FAVORITES_KEY, r#"["S1","S1","S3"]"#)
            .unwrap();

        let favorites = store(dir.path());
        assert_eq!(favorites.len(), 2);
        assert_eq!(favorites.ids(), vec!["S1", "S3"]);
    }

    #[test]
    fn test_corrupt_entry_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        KeyValueStore::in_dir(dir.path()).set(FAVORITES_KEY, "{oops").unwrap();
        assert!(store(dir.path()).is_empty());
    }

    #[test]
    fn test_list_orders_by_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let favorites = store(dir.path());
        let sessions = vec![session("S1", 14), session("S2", 9), session("S3", 11)];

        favorites.toggle("S1").unwrap();
        favorites.toggle("S2").unwrap();
        let ids: Vec<_> = favorites.list(&sessions).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["S2", "S1"]);

        favorites.toggle("S3").unwrap();
        let ids: Vec<_> = favorites.list(&sessions).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["S2", "S3", "S1"]);
    }

    #[test]
    fn test_clear_keeps_sessions_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let favorites = store(dir.path());
        let sessions = vec![session("S1", 9), session("S2", 10)];
        favorites.toggle("S1").unwrap();
        favorites.toggle("GONE").unwrap();

        favorites.clear().unwrap();

        assert!(favorites.list(&sessions).is_empty());
        assert!(favorites.ids().is_empty());
        assert_eq!(sessions.len(), 2);
        assert!(store(dir.path()).is_empty());
    }

    #[test]
    fn test_failed_persist_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = KeyValueStore::open(dir.path().join("missing").join("prefs.json"));
        let favorites = FavoritesStore::new(Arc::new(prefs));

        assert!(favorites.toggle("S1").is_err());
        assert!(!favorites.is_favorite("S1"));
        assert_eq!(favorites.generation(), 0);
    }
}
