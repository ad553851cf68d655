//! Offline-first content delivery for a conference schedule app.
//!
//! The crate keeps a locally cached conference snapshot and feature flag
//! set in step with a static remote feed. Reads never wait on the network:
//! data comes from the cache or a bundled bootstrap document, and refreshes
//! replace it only when the remote copy is newer.

pub mod api;
pub mod cache;
pub mod config;
pub mod favorites;
pub mod hydrate;
pub mod models;
pub mod sync;

#[cfg(test)]
mod testing;

pub use api::{ConditionalFetcher, Connectivity, FetchError, FetchOutcome, ReqwestTransport};
pub use cache::{Bootstrap, CacheManager, KeyValueStore, SnapshotStore, StorageError};
pub use config::Config;
pub use favorites::FavoritesStore;
pub use hydrate::{HydratedGraph, HydratedSession, HydratedSpeaker, ScheduleFilter};
pub use sync::{ContentSync, FeatureFlagSync, RefreshOutcome};
