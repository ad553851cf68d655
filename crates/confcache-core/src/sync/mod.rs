//! Synchronization pipelines.
//!
//! This module provides the two long-lived services that keep local state
//! in step with the remote feed:
//!
//! - `ContentSync`: the version-gated conference snapshot and its hydrated
//!   graph, plus favorites
//! - `FeatureFlagSync`: the flag set, with a non-blocking startup refresh
//!   and change notifications
//!
//! Both read locally first and never surface network failures as errors.

pub mod content;
pub mod flags;
pub mod version;

pub use content::{ContentSync, RefreshOutcome, SyncState};
pub use flags::{
    ChangeOrigin, FeatureFlagSync, FlagRefresh, FlagSource, FlagSubscription, FlagsChanged,
    SubscriptionId,
};
pub use version::{compare_versions, is_newer};
