//! Long-lived services, wired once per process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use confcache_core::cache::{CONTENT, FLAGS};
use confcache_core::{
    CacheManager, ConditionalFetcher, Config, Connectivity, ContentSync, FavoritesStore,
    FeatureFlagSync, KeyValueStore, ReqwestTransport, SnapshotStore,
};

pub struct App {
    pub config: Config,
    pub cache_dir: PathBuf,
    pub connectivity: Connectivity,
    pub content: Arc<ContentSync>,
    pub flags: Arc<FeatureFlagSync>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let cache = CacheManager::new(cache_dir.clone())
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?;

        let transport = ReqwestTransport::new(
            config.request_timeout(),
            config.storage_api_version.as_deref(),
        )?;
        let connectivity = Connectivity::default();
        if config.offline {
            connectivity.go_offline();
        }
        let fetcher = ConditionalFetcher::new(Arc::new(transport), connectivity.clone())
            .with_enabled(config.enabled);

        // Content, flags and favorites share one preferences file
        let prefs = Arc::new(KeyValueStore::in_dir(&cache_dir));
        let bootstrap = config.bootstrap();
        debug!(bootstrap = ?bootstrap, "Bootstrap source");

        let content_store =
            SnapshotStore::new(CONTENT, cache.clone(), Arc::clone(&prefs), bootstrap.clone());
        let flag_store = SnapshotStore::new(FLAGS, cache, Arc::clone(&prefs), bootstrap);
        let favorites = Arc::new(FavoritesStore::new(prefs));

        let content = Arc::new(ContentSync::new(
            fetcher.clone(),
            config.content_url(),
            content_store,
            favorites,
        ));
        let flags = Arc::new(FeatureFlagSync::new(fetcher, config.flags_url(), flag_store));

        info!(
            cache_dir = %cache_dir.display(),
            online = connectivity.is_online(),
            enabled = config.enabled,
            "Services ready"
        );

        Ok(Self {
            config,
            cache_dir,
            connectivity,
            content,
            flags,
        })
    }
}
