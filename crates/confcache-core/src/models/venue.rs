//! Flat reference entities: tracks, rooms, days and sponsors.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Default accent used when a track ships without a colour.
const DEFAULT_TRACK_COLOR: &str = "#512BD4";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub color_hex: String,
    pub description: String,
    pub order: i32,
    pub icon_url: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            color_hex: DEFAULT_TRACK_COLOR.to_string(),
            description: String::new(),
            order: 0,
            icon_url: String::new(),
            last_updated: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub building: String,
    pub floor: String,
    pub capacity: u32,
    pub map_coordinates: Option<MapCoordinates>,
    pub indoor_map_image_url: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Room {
    /// "Name (Building, Floor 2)" style label.
    pub fn location_label(&self) -> String {
        let mut where_parts = Vec::new();
        if !self.building.is_empty() {
            where_parts.push(self.building.clone());
        }
        if !self.floor.is_empty() {
            where_parts.push(format!("Floor {}", self.floor));
        }
        if where_parts.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, where_parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct MapCoordinates {
    pub lat: f64,
    pub lon: f64,
    pub level: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Day {
    pub index: i32,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// IANA time zone name.
    pub tz: String,
    pub friendly_name: String,
}

impl Default for Day {
    fn default() -> Self {
        Self {
            index: 0,
            date: String::new(),
            tz: "UTC".to_string(),
            friendly_name: String::new(),
        }
    }
}

impl Day {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()
    }

    pub fn label(&self) -> String {
        if self.friendly_name.is_empty() {
            format!("Day {}", self.index + 1)
        } else {
            self.friendly_name.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Sponsor {
    pub id: String,
    pub name: String,
    pub tier: String,
    pub logo_url: String,
    pub website: String,
    pub blurb: String,
}
