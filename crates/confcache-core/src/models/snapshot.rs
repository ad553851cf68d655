use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Day, Room, Session, Speaker, Sponsor, Track};

/// One complete bundle of conference content as of `content_version`.
///
/// A snapshot is never mutated once accepted; the orchestrator replaces it
/// wholesale and shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct ContentSnapshot {
    pub schema_version: String,
    pub content_version: String,
    #[serde(alias = "generatedAt")]
    pub generated_at_utc: Option<DateTime<Utc>>,
    pub conference: ConferenceInfo,
    pub api: ApiEndpoints,
    pub min_app_version: String,
    pub sessions: Vec<Session>,
    pub speakers: Vec<Speaker>,
    pub tracks: Vec<Track>,
    pub rooms: Vec<Room>,
    pub days: Vec<Day>,
    pub sponsors: Vec<Sponsor>,
}

impl Default for ContentSnapshot {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            content_version: "1".to_string(),
            generated_at_utc: None,
            conference: ConferenceInfo::default(),
            api: ApiEndpoints::default(),
            min_app_version: "1.0".to_string(),
            sessions: Vec::new(),
            speakers: Vec::new(),
            tracks: Vec::new(),
            rooms: Vec::new(),
            days: Vec::new(),
            sponsors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct ConferenceInfo {
    pub name: String,
    pub tz: String,
    pub venue: String,
    pub address: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// `YYYY-MM-DD`
    pub end_date: String,
}

impl Default for ConferenceInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            tz: "UTC".to_string(),
            venue: String::new(),
            address: String::new(),
            start_date: String::new(),
            end_date: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct ApiEndpoints {
    pub base_url: String,
    pub assets_base_url: String,
}
