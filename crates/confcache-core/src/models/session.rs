use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled talk, workshop or keynote as published in the feed.
///
/// Only the flat, durable fields live here. Resolved speakers, tracks, room
/// and the favorite flag are derived by hydration and never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub level: String,
    pub tags: Vec<String>,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub day_index: i32,
    pub track_ids: Vec<String>,
    pub speaker_ids: Vec<String>,
    pub room_id: String,
    pub capacity: u32,
    pub is_live_stream: bool,
    pub recording_url: Option<String>,
    pub live_url: Option<String>,
    pub is_workshop: bool,
    pub requires_registration: bool,
    pub image_urls: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Session {
    /// The room reference, or `None` when the feed leaves it blank.
    pub fn room_ref(&self) -> Option<&str> {
        let id = self.room_id.trim();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    pub fn duration(&self) -> Duration {
        self.end_utc - self.start_utc
    }

    pub fn has_media(&self) -> bool {
        self.is_live_stream || self.recording_url.is_some() || self.live_url.is_some()
    }
}

impl AsRef<Session> for Session {
    fn as_ref(&self) -> &Session {
        self
    }
}
