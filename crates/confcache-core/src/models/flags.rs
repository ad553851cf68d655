use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decode::canonical_key;

const DEFAULT_FLAGS_VERSION: &str = "1.0";

/// Canonical name of the one typed flag.
pub const SESSION_FEEDBACK_ENABLED: &str = "sessionFeedbackEnabled";

/// Remote feature switches.
///
/// Flags without a typed field are kept in `extra` so a newer feed
/// round-trips through the cache without losing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagSet {
    #[serde(default = "default_flags_version")]
    pub version: String,
    #[serde(rename = "eTag", alias = "etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub session_feedback_enabled: bool,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: BTreeMap<String, Value>,
}

fn default_flags_version() -> String {
    DEFAULT_FLAGS_VERSION.to_string()
}

impl Default for FeatureFlagSet {
    fn default() -> Self {
        Self {
            version: default_flags_version(),
            etag: None,
            session_feedback_enabled: false,
            extra: BTreeMap::new(),
        }
    }
}

impl FeatureFlagSet {
    /// Look up a flag by name, ignoring case. Unknown or non-boolean flags
    /// read as off.
    pub fn is_enabled(&self, name: &str) -> bool {
        let name = canonical_key(name);
        if name == SESSION_FEEDBACK_ENABLED {
            return self.session_feedback_enabled;
        }
        self.extra_key(&name)
            .and_then(|key| self.extra.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Set a flag by name, ignoring case. An existing extra flag keeps the
    /// spelling it was delivered with.
    pub fn set_flag(&mut self, name: &str, value: bool) {
        let name = canonical_key(name);
        if name == SESSION_FEEDBACK_ENABLED {
            self.session_feedback_enabled = value;
            return;
        }
        let key = match self.extra_key(&name) {
            Some(existing) => existing.clone(),
            None => name.into_owned(),
        };
        self.extra.insert(key, Value::Bool(value));
    }

    fn extra_key(&self, name: &str) -> Option<&String> {
        match self.extra.get_key_value(name) {
            Some((key, _)) => Some(key),
            None => self.extra.keys().find(|key| key.eq_ignore_ascii_case(name)),
        }
    }

    /// All boolean flags, typed and extra, sorted by name.
    pub fn flags(&self) -> Vec<(String, bool)> {
        let mut flags: Vec<(String, bool)> = self
            .extra
            .iter()
            .filter_map(|(name, value)| value.as_bool().map(|on| (name.clone(), on)))
            .collect();
        flags.push((
            SESSION_FEEDBACK_ENABLED.to_string(),
            self.session_feedback_enabled,
        ));
        flags.sort();
        flags
    }
}
