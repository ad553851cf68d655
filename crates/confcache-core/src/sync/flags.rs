//! Feature flag sync.
//!
//! Startup loads flags from the cache, or from the bootstrap document on
//! first run (persisting it straight away), then refreshes from the remote
//! in the background. There is no version gate: any fetched flag set
//! replaces the current one. Subscribers are told about every accepted
//! change, remote or manual.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ConditionalFetcher, FetchOutcome};
use crate::cache::{FlagStore, SnapshotSource, StorageError};
use crate::models::FeatureFlagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Remote,
    Manual,
}

#[derive(Debug, Clone)]
pub struct FlagsChanged {
    pub flags: Arc<FeatureFlagSet>,
    pub origin: ChangeOrigin,
}

/// A registered observer. Pass `id` to [`FeatureFlagSync::unsubscribe`].
pub struct FlagSubscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<FlagsChanged>,
}

/// Where the startup flag set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagSource {
    Cache,
    Bootstrap,
    Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagRefresh {
    Updated { version: String },
    Unchanged,
    Failed { reason: String },
}

impl fmt::Display for FlagRefresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagRefresh::Updated { version } => write!(f, "updated to version {}", version),
            FlagRefresh::Unchanged => write!(f, "not modified"),
            FlagRefresh::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

pub struct FeatureFlagSync {
    fetcher: ConditionalFetcher,
    url: String,
    store: FlagStore,
    current: RwLock<Arc<FeatureFlagSet>>,
    observers: Mutex<Vec<(SubscriptionId, mpsc::UnboundedSender<FlagsChanged>)>>,
    next_subscription: AtomicU64,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl FeatureFlagSync {
    pub fn new(fetcher: ConditionalFetcher, url: impl Into<String>, store: FlagStore) -> Self {
        Self {
            fetcher,
            url: url.into(),
            store,
            current: RwLock::new(Arc::new(FeatureFlagSet::default())),
            observers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load local flags, then start a remote refresh that does not block
    /// the caller. Drop the handle for fire-and-forget.
    pub fn initialize(self: &Arc<Self>) -> JoinHandle<FlagRefresh> {
        let source = self.load_local();
        info!(source = ?source, version = %self.current().version, "Feature flags initialized");

        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh_from_remote().await })
    }

    /// Cache, else bootstrap (persisted as the new cache), else defaults.
    pub fn load_local(&self) -> FlagSource {
        let mut current = self.write_current();
        match self.store.load() {
            Some(local) if local.source == SnapshotSource::Cache => {
                *current = Arc::new(local.data);
                FlagSource::Cache
            }
            Some(bootstrap) => {
                if let Err(e) = self.store.save(&bootstrap.data) {
                    warn!(error = %e, "Failed to persist bootstrap flags");
                }
                *current = Arc::new(bootstrap.data);
                FlagSource::Bootstrap
            }
            None => {
                debug!("No cached or bundled flags, using defaults");
                FlagSource::Defaults
            }
        }
    }

    /// Conditional fetch of the remote flag set. Failures leave the current
    /// flags untouched.
    pub async fn refresh_from_remote(&self) -> FlagRefresh {
        let _refreshing = self.refresh_lock.lock().await;
        let validator = self.store.metadata().validator;
        debug!(url = %self.url, validator = ?validator, "Refreshing feature flags");

        let outcome = self
            .fetcher
            .fetch::<FeatureFlagSet>(&self.url, validator.as_deref())
            .await;

        match outcome {
            FetchOutcome::Unchanged => {
                debug!("Flags not modified");
                FlagRefresh::Unchanged
            }
            FetchOutcome::Failed(e) => {
                warn!(error = %e, "Flag refresh failed, keeping current flags");
                FlagRefresh::Failed {
                    reason: e.to_string(),
                }
            }
            FetchOutcome::Fetched {
                mut payload,
                validator,
            } => {
                payload.etag = validator.clone();
                let flags = Arc::new(payload);
                {
                    // Disk and memory change together so a concurrent
                    // update_flag cannot land between them
                    let mut current = self.write_current();
                    let persisted = self
                        .store
                        .set_validator(validator.as_deref())
                        .and_then(|()| self.store.save(&flags));
                    if let Err(e) = persisted {
                        warn!(error = %e, "Failed to persist fetched flags");
                    }
                    *current = Arc::clone(&flags);
                }
                info!(version = %flags.version, "Accepted remote feature flags");

                let version = flags.version.clone();
                self.publish(FlagsChanged {
                    flags,
                    origin: ChangeOrigin::Remote,
                });
                FlagRefresh::Updated { version }
            }
        }
    }

    pub fn current(&self) -> Arc<FeatureFlagSet> {
        Arc::clone(&self.current.read().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.current().is_enabled(name)
    }

    /// Set one flag in the live set, persist it and notify subscribers.
    ///
    /// The live set and subscribers see the change even when persisting
    /// fails; the error is returned so the caller can report it.
    pub fn update_flag(&self, name: &str, value: bool) -> Result<(), StorageError> {
        let (flags, persisted) = {
            let mut current = self.write_current();
            Arc::make_mut(&mut current).set_flag(name, value);
            (Arc::clone(&current), self.store.save(&current))
        };
        info!(flag = name, value = value, "Flag updated");
        if let Err(e) = &persisted {
            warn!(flag = name, error = %e, "Failed to persist flag update");
        }

        self.publish(FlagsChanged {
            flags,
            origin: ChangeOrigin::Manual,
        });
        persisted
    }

    pub fn subscribe(&self) -> FlagSubscription {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_observers().push((id, tx));
        FlagSubscription { id, receiver: rx }
    }

    /// Returns whether `id` was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.lock_observers();
        let before = observers.len();
        observers.retain(|(observer, _)| *observer != id);
        observers.len() != before
    }

    fn write_current(&self) -> std::sync::RwLockWriteGuard<'_, Arc<FeatureFlagSet>> {
        self.current.write().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, event: FlagsChanged) {
        let mut observers = self.lock_observers();
        observers.retain(|(id, tx)| {
            let delivered = tx.send(event.clone()).is_ok();
            if !delivered {
                debug!(subscription = ?id, "Dropping closed flag subscriber");
            }
            delivered
        });
    }

    fn lock_observers(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, mpsc::UnboundedSender<FlagsChanged>)>> {
        self.observers.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Connectivity, FetchError, HttpResponse};
    use crate::cache::{Bootstrap, CacheManager, KeyValueStore, SnapshotStore, FLAGS};
    use crate::testing::{flags_json, ScriptedTransport};
    use tempfile::TempDir;
    use tokio::sync::mpsc::error::TryRecvError;

    const URL: &str = "https://cdn.example.test/featureflags.json";

    struct Fixture {
        dir: TempDir,
        transport: Arc<ScriptedTransport>,
        fetcher: ConditionalFetcher,
        prefs: Arc<KeyValueStore>,
        flags: Arc<FeatureFlagSync>,
    }

    fn fixture(bootstrap: Bootstrap) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new([]);
        let fetcher = ConditionalFetcher::new(transport.clone(), Connectivity::default());
        let (flags, prefs) = build(&dir, &fetcher, bootstrap);
        Fixture {
            dir,
            transport,
            fetcher,
            prefs,
            flags,
        }
    }

    fn build(
        dir: &TempDir,
        fetcher: &ConditionalFetcher,
        bootstrap: Bootstrap,
    ) -> (Arc<FeatureFlagSync>, Arc<KeyValueStore>) {
        let prefs = Arc::new(KeyValueStore::in_dir(dir.path()));
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        let store = SnapshotStore::new(FLAGS, cache, prefs.clone(), bootstrap);
        (
            Arc::new(FeatureFlagSync::new(fetcher.clone(), URL, store)),
            prefs,
        )
    }

    fn bootstrap(version: &str, feedback: bool) -> Bootstrap {
        Bootstrap::Documents {
            content: None,
            flags: Some(flags_json(version, feedback)),
        }
    }

    #[tokio::test]
    async fn test_first_run_persists_bootstrap() {
        let fx = fixture(bootstrap("1.0", true));

        assert_eq!(fx.flags.load_local(), FlagSource::Bootstrap);
        assert!(fx.flags.is_enabled("sessionFeedbackEnabled"));
        assert!(fx.dir.path().join(FLAGS.cache_file).exists());

        // Next launch reads the cache, not the (changed) bootstrap
        let (relaunched, _) = build(&fx.dir, &fx.fetcher, bootstrap("9.9", false));
        assert_eq!(relaunched.load_local(), FlagSource::Cache);
        assert_eq!(relaunched.current().version, "1.0");
        assert!(relaunched.is_enabled("sessionFeedbackEnabled"));
    }

    #[tokio::test]
    async fn test_defaults_without_cache_or_bootstrap() {
        let fx = fixture(Bootstrap::None);
        assert_eq!(fx.flags.load_local(), FlagSource::Defaults);
        assert_eq!(*fx.flags.current(), FeatureFlagSet::default());
        assert!(!fx.dir.path().join(FLAGS.cache_file).exists());
    }

    #[tokio::test]
    async fn test_initialize_refreshes_in_background_and_notifies() {
        let fx = fixture(bootstrap("1.0", false));
        let mut subscription = fx.flags.subscribe();
        fx.transport.push(Ok(HttpResponse::ok(flags_json("2.0", true), Some("\"f2\""))));

        let handle = fx.flags.initialize();
        assert_eq!(
            handle.await.unwrap(),
            FlagRefresh::Updated {
                version: "2.0".into()
            }
        );

        let current = fx.flags.current();
        assert_eq!(current.version, "2.0");
        assert_eq!(current.etag.as_deref(), Some("\"f2\""));
        assert!(fx.flags.is_enabled("SessionFeedbackEnabled"));
        assert_eq!(fx.prefs.get("flags_cached_etag").as_deref(), Some("\"f2\""));

        let event = subscription.receiver.try_recv().unwrap();
        assert_eq!(event.origin, ChangeOrigin::Remote);
        assert_eq!(event.flags.version, "2.0");

        let (relaunched, _) = build(&fx.dir, &fx.fetcher, Bootstrap::None);
        assert_eq!(relaunched.load_local(), FlagSource::Cache);
        assert_eq!(relaunched.current().version, "2.0");
    }

    #[tokio::test]
    async fn test_not_modified_keeps_flags_quietly() {
        let fx = fixture(bootstrap("1.0", false));
        fx.flags.load_local();
        fx.prefs.set("flags_cached_etag", "\"f1\"").unwrap();
        let mut subscription = fx.flags.subscribe();
        fx.transport.push(Ok(HttpResponse::not_modified()));

        assert_eq!(fx.flags.refresh_from_remote().await, FlagRefresh::Unchanged);
        assert_eq!(
            fx.transport.requests(),
            vec![(URL.to_string(), Some("\"f1\"".to_string()))]
        );
        assert_eq!(fx.flags.current().version, "1.0");
        assert_eq!(subscription.receiver.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn test_remote_always_supersedes_cache() {
        let fx = fixture(bootstrap("5", true));
        fx.flags.load_local();
        fx.transport.push(Ok(HttpResponse::ok(flags_json("1", false), None)));

        assert_eq!(
            fx.flags.refresh_from_remote().await,
            FlagRefresh::Updated {
                version: "1".into()
            }
        );
        assert_eq!(fx.flags.current().version, "1");
        assert!(!fx.flags.is_enabled("sessionFeedbackEnabled"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_flags() {
        let fx = fixture(bootstrap("1.0", true));
        fx.flags.load_local();
        let mut subscription = fx.flags.subscribe();
        fx.transport.push(Err(FetchError::from_status(404, "missing")));

        let outcome = fx.flags.refresh_from_remote().await;

        assert!(matches!(outcome, FlagRefresh::Failed { .. }));
        assert!(fx.flags.is_enabled("sessionFeedbackEnabled"));
        assert!(subscription.receiver.try_recv().is_err());

        fx.fetcher.connectivity().go_offline();
        assert_eq!(
            fx.flags.refresh_from_remote().await,
            FlagRefresh::Failed {
                reason: "offline".into()
            }
        );
    }

    #[tokio::test]
    async fn test_manual_update_persists_and_notifies() {
        let fx = fixture(bootstrap("1.0", false));
        fx.flags.load_local();
        let mut subscription = fx.flags.subscribe();

        fx.flags.update_flag("SessionFeedbackEnabled", true).unwrap();
        fx.flags.update_flag("networkingEnabled", true).unwrap();

        assert!(fx.flags.is_enabled("sessionFeedbackEnabled"));
        let first = subscription.receiver.try_recv().unwrap();
        assert_eq!(first.origin, ChangeOrigin::Manual);
        assert!(first.flags.session_feedback_enabled);
        assert!(subscription.receiver.try_recv().unwrap().flags.is_enabled("networkingEnabled"));
        assert!(fx.transport.requests().is_empty());

        let (relaunched, _) = build(&fx.dir, &fx.fetcher, Bootstrap::None);
        relaunched.load_local();
        assert!(relaunched.is_enabled("sessionFeedbackEnabled"));
        assert!(relaunched.is_enabled("networkingEnabled"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_and_refresh_match_disk() {
        let fx = fixture(bootstrap("1.0", false));
        fx.flags.load_local();
        fx.transport.push(Ok(HttpResponse::ok(flags_json("2.0", true), Some("\"f2\""))));

        let refresh = {
            let flags = Arc::clone(&fx.flags);
            tokio::spawn(async move { flags.refresh_from_remote().await })
        };
        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let flags = Arc::clone(&fx.flags);
                tokio::task::spawn_blocking(move || {
                    for i in 0..10 {
                        flags.update_flag(&format!("flag{}x{}", writer, i), true).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }
        assert!(matches!(refresh.await.unwrap(), FlagRefresh::Updated { .. }));

        let (relaunched, _) = build(&fx.dir, &fx.fetcher, Bootstrap::None);
        assert_eq!(relaunched.load_local(), FlagSource::Cache);
        assert_eq!(relaunched.current(), fx.flags.current());
    }

    #[tokio::test]
    async fn test_corrupt_cache_drops_stale_validator() {
        let fx = fixture(bootstrap("1.0", false));
        fx.transport.push(Ok(HttpResponse::ok(flags_json("2.0", true), Some("\"f2\""))));
        fx.flags.refresh_from_remote().await;
        std::fs::write(fx.dir.path().join(FLAGS.cache_file), "{\"data\":").unwrap();

        let (relaunched, prefs) = build(&fx.dir, &fx.fetcher, bootstrap("1.0", false));
        assert_eq!(relaunched.load_local(), FlagSource::Bootstrap);
        assert_eq!(prefs.get("flags_cached_etag"), None);

        fx.transport.push(Ok(HttpResponse::ok(flags_json("2.0", true), Some("\"f2\""))));
        assert_eq!(
            relaunched.refresh_from_remote().await,
            FlagRefresh::Updated {
                version: "2.0".into()
            }
        );
        assert_eq!(fx.transport.requests().last().unwrap().1, None);
        assert!(relaunched.is_enabled("sessionFeedbackEnabled"));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_closed_receivers() {
        let fx = fixture(Bootstrap::None);
        let kept = fx.flags.subscribe();
        let removed = fx.flags.subscribe();
        let dropped = fx.flags.subscribe();
        drop(dropped.receiver);
        assert_eq!(fx.flags.lock_observers().len(), 3);

        assert!(fx.flags.unsubscribe(removed.id));
        assert!(!fx.flags.unsubscribe(removed.id));
        fx.flags.update_flag("sessionFeedbackEnabled", true).unwrap();

        assert_eq!(fx.flags.lock_observers().len(), 1);
        let mut kept_rx = kept.receiver;
        assert!(kept_rx.try_recv().is_ok());
        let mut removed_rx = removed.receiver;
        assert_eq!(removed_rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }
}
