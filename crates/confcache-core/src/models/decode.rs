//! Lenient decoding of remote and bundled JSON documents.
//!
//! Documents are published with camelCase field names, but feeds have also
//! been exported with PascalCase (`StartUtc`, `ETag`), all-caps
//! (`CONTENTVERSION`) and all-lowercase (`contentversion`) names. Object keys
//! are mapped to the model field they name, ignoring case, before handing the
//! tree to serde so every spelling decodes into the same models.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{
    ContentSnapshot, Day, FeatureFlagSet, MapCoordinates, Room, Session, Speaker,
    SpeakerSocials, Sponsor, Track,
};

/// Lowercased field name -> serialized field name, across every model.
static FIELD_NAMES: OnceLock<HashMap<String, String>> = OnceLock::new();

/// Accepted spellings that never appear in serialized output.
const ALIASED_FIELD_NAMES: &[&str] = &["generatedAt", "data", "cachedAt"];

/// Decode a JSON document into `T`, resolving object keys case-insensitively.
pub fn decode_document<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    serde_json::from_value(normalize_keys(value))
}

/// Recursively rewrite every object key with [`canonical_key`].
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut folded = Map::with_capacity(map.len());
            for (key, value) in map {
                let folded_key = canonical_key(&key).into_owned();
                let canonical = folded_key == key;
                let key = folded_key;
                // A key that was already spelled canonically wins over a folded duplicate
                if !canonical && folded.contains_key(&key) {
                    continue;
                }
                folded.insert(key, normalize_keys(value));
            }
            Value::Object(folded)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Map a key onto the model field it names regardless of case. Keys that
/// name no known field (extra feature flags) go through [`camel_case_key`].
pub fn canonical_key(key: &str) -> Cow<'_, str> {
    match field_names().get(&key.to_lowercase()) {
        Some(name) => Cow::Borrowed(name.as_str()),
        None => camel_case_key(key),
    }
}

fn field_names() -> &'static HashMap<String, String> {
    FIELD_NAMES.get_or_init(|| {
        let samples = [
            serde_json::to_value(ContentSnapshot::default()),
            serde_json::to_value(Session::default()),
            serde_json::to_value(Speaker::default()),
            serde_json::to_value(SpeakerSocials::default()),
            serde_json::to_value(Track::default()),
            serde_json::to_value(Room::default()),
            serde_json::to_value(MapCoordinates::default()),
            serde_json::to_value(Day::default()),
            serde_json::to_value(Sponsor::default()),
            serde_json::to_value(FeatureFlagSet {
                etag: Some(String::new()),
                ..FeatureFlagSet::default()
            }),
        ];

        let mut names = HashMap::new();
        for sample in samples.into_iter().flatten() {
            collect_field_names(&sample, &mut names);
        }
        for name in ALIASED_FIELD_NAMES {
            names
                .entry(name.to_lowercase())
                .or_insert_with(|| name.to_string());
        }
        names
    })
}

fn collect_field_names(value: &Value, names: &mut HashMap<String, String>) {
    if let Value::Object(map) = value {
        for (key, nested) in map {
            names
                .entry(key.to_lowercase())
                .or_insert_with(|| key.clone());
            collect_field_names(nested, names);
        }
    }
}

/// Lower the leading run of uppercase characters, keeping the last one
/// when it starts the next word: `StartUtc` -> `startUtc`, `ETag` -> `eTag`,
/// `ID` -> `id`.
pub fn camel_case_key(key: &str) -> Cow<'_, str> {
    if !key.chars().next().is_some_and(|c| c.is_uppercase()) {
        return Cow::Borrowed(key);
    }

    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len());
    let mut folding = true;

    for (i, &c) in chars.iter().enumerate() {
        if folding {
            let next_is_lower = chars.get(i + 1).is_some_and(|n| !n.is_uppercase());
            if i > 0 && (!c.is_uppercase() || next_is_lower) {
                folding = false;
            }
        }
        if folding {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    Cow::Owned(out)
}
