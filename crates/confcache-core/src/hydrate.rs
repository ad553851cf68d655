//! Relational view over a flat snapshot.
//!
//! Sessions and speakers reference each other by id only. Hydration builds
//! id-indexed lookups once and resolves every reference into owned copies,
//! so the derived graph holds no cycles and can be rebuilt wholesale.
//!
//! Each session sits behind its own `Arc` and the speaker side is shared,
//! so cloning a graph to flip one favorite copies pointers, not sessions.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{ContentSnapshot, Day, Room, Session, Speaker, Sponsor, Track};

/// A session with its references resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedSession {
    pub session: Session,
    pub speakers: Vec<Speaker>,
    pub tracks: Vec<Track>,
    pub room: Option<Room>,
    pub is_favorite: bool,
}

impl Deref for HydratedSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl AsRef<Session> for HydratedSession {
    fn as_ref(&self) -> &Session {
        &self.session
    }
}

/// A speaker with the ids of every session that lists them.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedSpeaker {
    pub speaker: Speaker,
    pub session_ids: Vec<String>,
}

impl Deref for HydratedSpeaker {
    type Target = Speaker;

    fn deref(&self) -> &Speaker {
        &self.speaker
    }
}

/// Schedule filter mirroring the schedule screen's controls.
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub day_index: Option<i32>,
    /// Case-insensitive match on title, abstract or speaker name.
    pub text: Option<String>,
    pub track_id: Option<String>,
}

/// Sessions sharing one start time.
#[derive(Debug, Clone)]
pub struct TimeSlot<'a> {
    pub start: DateTime<Utc>,
    pub sessions: Vec<&'a HydratedSession>,
}

/// The derived, read-only graph for one snapshot and favorites state.
#[derive(Debug, Clone)]
pub struct HydratedGraph {
    snapshot: Arc<ContentSnapshot>,
    sessions: Vec<Arc<HydratedSession>>,
    speakers: Arc<[HydratedSpeaker]>,
    session_index: Arc<HashMap<String, usize>>,
    speaker_index: Arc<HashMap<String, usize>>,
    favorites_generation: u64,
}

/// Index entities by id. The first entity wins when ids repeat.
fn index_by_id<'a, T>(items: &'a [T], id: impl Fn(&T) -> &str) -> HashMap<&'a str, &'a T> {
    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        let key = id(item);
        if index.contains_key(key) {
            debug!(id = key, "Duplicate id in snapshot, keeping first");
            continue;
        }
        index.insert(key, item);
    }
    index
}

/// Build the derived graph. Dangling references are dropped, never errors.
pub fn hydrate(
    snapshot: Arc<ContentSnapshot>,
    favorites: &HashSet<String>,
    favorites_generation: u64,
) -> HydratedGraph {
    let speakers_by_id = index_by_id(&snapshot.speakers, |s| s.id.as_str());
    let tracks_by_id = index_by_id(&snapshot.tracks, |t| t.id.as_str());
    let rooms_by_id = index_by_id(&snapshot.rooms, |r| r.id.as_str());

    let sessions: Vec<Arc<HydratedSession>> = snapshot
        .sessions
        .iter()
        .map(|session| {
            Arc::new(HydratedSession {
                speakers: session
                    .speaker_ids
                    .iter()
                    .filter_map(|id| speakers_by_id.get(id.as_str()).map(|s| (*s).clone()))
                    .collect(),
                tracks: session
                    .track_ids
                    .iter()
                    .filter_map(|id| tracks_by_id.get(id.as_str()).map(|t| (*t).clone()))
                    .collect(),
                room: session
                    .room_ref()
                    .and_then(|id| rooms_by_id.get(id))
                    .map(|r| (*r).clone()),
                is_favorite: favorites.contains(&session.id),
                session: session.clone(),
            })
        })
        .collect();

    let mut sessions_by_speaker: HashMap<&str, Vec<String>> = HashMap::new();
    for session in &snapshot.sessions {
        for speaker_id in &session.speaker_ids {
            let ids = sessions_by_speaker.entry(speaker_id.as_str()).or_default();
            if !ids.contains(&session.id) {
                ids.push(session.id.clone());
            }
        }
    }

    let speakers: Vec<HydratedSpeaker> = snapshot
        .speakers
        .iter()
        .map(|speaker| HydratedSpeaker {
            session_ids: sessions_by_speaker
                .get(speaker.id.as_str())
                .cloned()
                .unwrap_or_default(),
            speaker: speaker.clone(),
        })
        .collect();

    let mut session_index = HashMap::with_capacity(sessions.len());
    for (i, session) in sessions.iter().enumerate() {
        session_index.entry(session.id.clone()).or_insert(i);
    }
    let mut speaker_index = HashMap::with_capacity(speakers.len());
    for (i, speaker) in speakers.iter().enumerate() {
        speaker_index.entry(speaker.id.clone()).or_insert(i);
    }

    debug!(
        version = %snapshot.content_version,
        sessions = sessions.len(),
        speakers = speakers.len(),
        favorites = favorites.len(),
        "Hydrated snapshot"
    );

    HydratedGraph {
        snapshot,
        sessions,
        speakers: speakers.into(),
        session_index: Arc::new(session_index),
        speaker_index: Arc::new(speaker_index),
        favorites_generation,
    }
}

fn by_start(sessions: &mut [&HydratedSession]) {
    sessions.sort_by_key(|s| s.start_utc);
}

impl HydratedGraph {
    pub fn snapshot(&self) -> &Arc<ContentSnapshot> {
        &self.snapshot
    }

    pub fn content_version(&self) -> &str {
        &self.snapshot.content_version
    }

    /// Generation of the favorites set this graph's flags were derived from.
    pub fn favorites_generation(&self) -> u64 {
        self.favorites_generation
    }

    /// Sessions in feed order.
    pub fn sessions(&self) -> &[Arc<HydratedSession>] {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<&HydratedSession> {
        self.session_index.get(id).map(|&i| &*self.sessions[i])
    }

    pub fn sessions_by_day(&self, day_index: i32) -> Vec<&HydratedSession> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|s| s.day_index == day_index)
            .map(|s| &**s)
            .collect();
        by_start(&mut sessions);
        sessions
    }

    pub fn speakers(&self) -> &[HydratedSpeaker] {
        &self.speakers
    }

    pub fn speaker(&self, id: &str) -> Option<&HydratedSpeaker> {
        self.speaker_index.get(id).map(|&i| &self.speakers[i])
    }

    pub fn sessions_for_speaker(&self, speaker_id: &str) -> Vec<&HydratedSession> {
        self.speaker(speaker_id)
            .map(|speaker| {
                speaker
                    .session_ids
                    .iter()
                    .filter_map(|id| self.session(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tracks in display order.
    pub fn tracks(&self) -> Vec<&Track> {
        let mut tracks: Vec<_> = self.snapshot.tracks.iter().collect();
        tracks.sort_by_key(|t| t.order);
        tracks
    }

    pub fn rooms(&self) -> &[Room] {
        &self.snapshot.rooms
    }

    /// Days in index order.
    pub fn days(&self) -> Vec<&Day> {
        let mut days: Vec<_> = self.snapshot.days.iter().collect();
        days.sort_by_key(|d| d.index);
        days
    }

    pub fn sponsors(&self) -> &[Sponsor] {
        &self.snapshot.sponsors
    }

    /// Favorited sessions by start time.
    pub fn favorite_sessions(&self) -> Vec<&HydratedSession> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|s| s.is_favorite)
            .map(|s| &**s)
            .collect();
        by_start(&mut sessions);
        sessions
    }

    /// Sessions matching `filter`, by start time.
    pub fn search(&self, filter: &ScheduleFilter) -> Vec<&HydratedSession> {
        let needle = filter
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        let track = filter.track_id.as_deref().filter(|t| !t.trim().is_empty());

        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|s| filter.day_index.map_or(true, |day| s.day_index == day))
            .filter(|s| track.map_or(true, |t| s.track_ids.iter().any(|id| id == t)))
            .filter(|s| match &needle {
                None => true,
                Some(needle) => {
                    s.title.to_lowercase().contains(needle)
                        || s.abstract_text.to_lowercase().contains(needle)
                        || s
                            .speakers
                            .iter()
                            .any(|sp| sp.full_name.to_lowercase().contains(needle))
                }
            })
            .map(|s| &**s)
            .collect();
        by_start(&mut sessions);
        sessions
    }

    /// Patch one session's favorite flag without rebuilding. Only the
    /// matching session is copied if it is shared with another graph.
    /// Returns whether the session exists in this graph.
    pub(crate) fn set_favorite(&mut self, session_id: &str, is_favorite: bool, generation: u64) -> bool {
        let mut found = false;
        for session in self.sessions.iter_mut().filter(|s| s.id == session_id) {
            if session.is_favorite != is_favorite {
                Arc::make_mut(session).is_favorite = is_favorite;
            }
            found = true;
        }
        self.favorites_generation = generation;
        found
    }
}

/// Group sessions by start time, earliest first.
pub fn group_by_start<'a>(sessions: &[&'a HydratedSession]) -> Vec<TimeSlot<'a>> {
    let mut sorted = sessions.to_vec();
    by_start(&mut sorted);

    let mut slots: Vec<TimeSlot<'a>> = Vec::new();
    for session in sorted {
        match slots.last_mut() {
            Some(slot) if slot.start == session.start_utc => slot.sessions.push(session),
            _ => slots.push(TimeSlot {
                start: session.start_utc,
                sessions: vec![session],
            }),
        }
    }
    slots
}
