//! Content sync: owns the live snapshot and its hydrated graph.
//!
//! Cold start reads the local cache (or bootstrap) without touching the
//! network. `refresh` asks the fetcher for something newer, passes it
//! through the version gate, persists it and swaps in a freshly hydrated
//! graph. Readers always get a whole graph behind an `Arc`, either the one
//! before a swap or the one after.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::version::is_newer;
use crate::api::{ConditionalFetcher, FetchOutcome};
use crate::cache::{age_display, ContentStore, StorageError};
use crate::favorites::FavoritesStore;
use crate::hydrate::{hydrate, HydratedGraph, HydratedSession};
use crate::models::ContentSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing has been loaded yet.
    Empty,
    Loaded,
    /// A refresh is in flight; the previous graph stays readable.
    Refreshing,
}

/// What a refresh did. Informational only; a refresh never fails outward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A newer snapshot was accepted.
    Updated { version: String },
    /// The server reported no change.
    Unchanged,
    /// A snapshot arrived but was not newer than the cached one.
    Rejected { cached: String, fetched: String },
    /// The fetch failed; the local snapshot stays in use.
    FellBack { reason: String },
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Updated { version } => write!(f, "updated to version {}", version),
            RefreshOutcome::Unchanged => write!(f, "not modified"),
            RefreshOutcome::Rejected { cached, fetched } => write!(
                f,
                "kept version {} (remote version {} is not newer)",
                cached, fetched
            ),
            RefreshOutcome::FellBack { reason } => write!(f, "using local copy ({})", reason),
        }
    }
}

struct SyncInner {
    state: SyncState,
    graph: Option<Arc<HydratedGraph>>,
    cached_at: Option<DateTime<Utc>>,
}

pub struct ContentSync {
    fetcher: ConditionalFetcher,
    url: String,
    store: ContentStore,
    favorites: Arc<FavoritesStore>,
    inner: RwLock<SyncInner>,
    refresh_lock: Mutex<()>,
}

impl ContentSync {
    pub fn new(
        fetcher: ConditionalFetcher,
        url: impl Into<String>,
        store: ContentStore,
        favorites: Arc<FavoritesStore>,
    ) -> Self {
        Self {
            fetcher,
            url: url.into(),
            store,
            favorites,
            inner: RwLock::new(SyncInner {
                state: SyncState::Empty,
                graph: None,
                cached_at: None,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn favorites(&self) -> &Arc<FavoritesStore> {
        &self.favorites
    }

    pub async fn state(&self) -> SyncState {
        self.inner.read().await.state
    }

    /// Age of the local content cache, if the live snapshot came from it.
    pub async fn last_synced(&self) -> Option<String> {
        self.inner.read().await.cached_at.map(age_display)
    }

    /// The current graph, loading local data on first use.
    ///
    /// Returns `None` only while neither cache nor bootstrap has anything.
    pub async fn get_snapshot(&self) -> Option<Arc<HydratedGraph>> {
        {
            let inner = self.inner.read().await;
            if let Some(graph) = &inner.graph {
                if graph.favorites_generation() == self.favorites.generation() {
                    return Some(Arc::clone(graph));
                }
            }
        }

        let mut inner = self.inner.write().await;
        self.ensure_current(&mut inner);
        inner.graph.clone()
    }

    /// Check the remote for newer content. Never fails and never drops the
    /// snapshot already in memory.
    pub async fn refresh(&self) -> RefreshOutcome {
        let _refreshing = self.refresh_lock.lock().await;
        {
            // Local data first, so the gate compares against what is on disk
            let mut inner = self.inner.write().await;
            self.ensure_current(&mut inner);
            inner.state = SyncState::Refreshing;
        }

        let outcome = self.fetch_and_gate().await;

        let mut inner = self.inner.write().await;
        self.ensure_current(&mut inner);
        inner.state = if inner.graph.is_some() {
            SyncState::Loaded
        } else {
            SyncState::Empty
        };
        outcome
    }

    /// Detached [`refresh`](Self::refresh); drop the handle for fire-and-forget.
    pub fn refresh_in_background(self: &Arc<Self>) -> JoinHandle<RefreshOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh().await })
    }

    pub fn is_favorite(&self, session_id: &str) -> bool {
        self.favorites.is_favorite(session_id)
    }

    /// Flip a favorite, persist it, and patch the live graph's flag.
    pub async fn toggle_favorite(&self, session_id: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        let (is_favorite, generation) = self.favorites.toggle_tracked(session_id)?;

        if let Some(graph) = inner.graph.as_mut() {
            // Patch only a graph that was current up to this toggle; anything
            // older is rebuilt on the next read.
            if graph.favorites_generation() + 1 == generation {
                Arc::make_mut(graph).set_favorite(session_id, is_favorite, generation);
            }
        }
        Ok(is_favorite)
    }

    /// Favorited sessions of the live graph, by start time.
    pub async fn favorite_sessions(&self) -> Vec<HydratedSession> {
        match self.get_snapshot().await {
            Some(graph) => graph.favorite_sessions().into_iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn clear_favorites(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        self.favorites.clear()?;
        self.ensure_current(&mut inner);
        Ok(())
    }

    async fn fetch_and_gate(&self) -> RefreshOutcome {
        let metadata = self.store.metadata();
        debug!(
            url = %self.url,
            cached_version = ?metadata.version,
            validator = ?metadata.validator,
            "Refreshing content"
        );

        let outcome = self
            .fetcher
            .fetch::<ContentSnapshot>(&self.url, metadata.validator.as_deref())
            .await;

        match outcome {
            FetchOutcome::Unchanged => {
                debug!("Content not modified");
                RefreshOutcome::Unchanged
            }
            FetchOutcome::Failed(e) => {
                warn!(error = %e, "Content refresh failed, keeping local snapshot");
                RefreshOutcome::FellBack {
                    reason: e.to_string(),
                }
            }
            FetchOutcome::Fetched { payload, validator } => {
                let cached = metadata.version.as_deref();
                if !is_newer(&payload.content_version, cached) {
                    info!(
                        cached_version = ?cached,
                        remote_version = %payload.content_version,
                        "Remote content is not newer, keeping cached snapshot"
                    );
                    return RefreshOutcome::Rejected {
                        cached: metadata.version.unwrap_or_default(),
                        fetched: payload.content_version,
                    };
                }

                let version = payload.content_version.clone();
                self.accept(payload, validator.as_deref()).await;
                RefreshOutcome::Updated { version }
            }
        }
    }

    async fn accept(&self, snapshot: ContentSnapshot, validator: Option<&str>) {
        let snapshot = Arc::new(snapshot);

        let persisted = self
            .store
            .save(&snapshot)
            .and_then(|()| self.store.set_validator(validator));
        if let Err(e) = &persisted {
            warn!(error = %e, "Failed to persist accepted snapshot");
        }

        let graph = Arc::new(self.hydrate(Arc::clone(&snapshot)));
        let mut inner = self.inner.write().await;
        inner.graph = Some(graph);
        inner.cached_at = persisted.is_ok().then(Utc::now);
        info!(version = %snapshot.content_version, "Accepted new content snapshot");
    }

    /// Load local data into an empty orchestrator, or rebuild a graph whose
    /// favorite flags are behind the favorites store.
    fn ensure_current(&self, inner: &mut SyncInner) {
        let live = inner
            .graph
            .as_ref()
            .map(|graph| (graph.favorites_generation(), Arc::clone(graph.snapshot())));

        match live {
            Some((generation, _)) if generation == self.favorites.generation() => {}
            Some((_, snapshot)) => {
                inner.graph = Some(Arc::new(self.hydrate(snapshot)));
                debug!("Favorites changed, rehydrated graph");
            }
            None => match self.store.load() {
                Some(local) => {
                    info!(
                        version = %local.data.content_version,
                        source = ?local.source,
                        "Loaded local content snapshot"
                    );
                    inner.cached_at = local.cached_at;
                    inner.graph = Some(Arc::new(self.hydrate(Arc::new(local.data))));
                }
                None => debug!("No local content available"),
            },
        }

        if inner.graph.is_some() && inner.state == SyncState::Empty {
            inner.state = SyncState::Loaded;
        }
    }

    fn hydrate(&self, snapshot: Arc<ContentSnapshot>) -> HydratedGraph {
        let (ids, generation) = self.favorites.snapshot();
        hydrate(snapshot, &ids, generation)
    }
}
