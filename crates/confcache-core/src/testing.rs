//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::api::{FetchError, HttpResponse, HttpTransport};

/// Replays a fixed list of responses and records every request.
/// Once the script runs out every call fails as a transient error.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
    requests: Mutex<Vec<(String, Option<String>, Instant)>>,
}

impl ScriptedTransport {
    pub fn new(
        script: impl IntoIterator<Item = Result<HttpResponse, FetchError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, response: Result<HttpResponse, FetchError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(url, validator, _)| (url.clone(), validator.clone()))
            .collect()
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, _, at)| *at).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str, validator: Option<&str>) -> Result<HttpResponse, FetchError> {
        self.requests.lock().unwrap().push((
            url.to_string(),
            validator.map(str::to_string),
            Instant::now(),
        ));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transient("script exhausted".into())))
    }
}

/// A small but fully cross-linked content document.
pub fn content_json(version: &str) -> String {
    format!(
        r##"{{
            "schemaVersion": "1.0.0",
            "contentVersion": "{version}",
            "generatedAtUtc": "2025-04-01T00:00:00Z",
            "conference": {{ "name": "RustConf Test", "tz": "UTC" }},
            "sessions": [
                {{
                    "id": "S1", "title": "Ownership in Practice", "abstract": "Borrowing rules",
                    "startUtc": "2025-05-01T10:00:00Z", "endUtc": "2025-05-01T10:45:00Z",
                    "dayIndex": 0, "speakerIds": ["SP1"], "trackIds": ["T1"], "roomId": "R1"
                }},
                {{
                    "id": "S2", "title": "Keynote", "abstract": "Opening",
                    "startUtc": "2025-05-01T09:00:00Z", "endUtc": "2025-05-01T09:45:00Z",
                    "dayIndex": 0, "speakerIds": ["SP1", "SP2"], "trackIds": ["T1", "T2"], "roomId": "R2"
                }},
                {{
                    "id": "S3", "title": "Async Deep Dive", "abstract": "Pinning",
                    "startUtc": "2025-05-02T09:00:00Z", "endUtc": "2025-05-02T10:00:00Z",
                    "dayIndex": 1, "speakerIds": ["SP2", "SP404"], "trackIds": ["T404"], "roomId": "R404"
                }}
            ],
            "speakers": [
                {{ "id": "SP1", "fullName": "Ada Lovelace", "company": "Engines" }},
                {{ "id": "SP2", "fullName": "Grace Hopper", "company": "Navy" }}
            ],
            "tracks": [
                {{ "id": "T2", "name": "Systems", "order": 2 }},
                {{ "id": "T1", "name": "Language", "order": 1 }}
            ],
            "rooms": [
                {{ "id": "R1", "name": "Hall A" }},
                {{ "id": "R2", "name": "Main Stage" }}
            ],
            "days": [
                {{ "index": 1, "date": "2025-05-02", "friendlyName": "Workshop Day" }},
                {{ "index": 0, "date": "2025-05-01", "friendlyName": "Main Day" }}
            ],
            "sponsors": [
                {{ "id": "SPN1", "name": "Ferris Inc", "tier": "Gold" }}
            ]
        }}"##
    )
}

pub fn flags_json(version: &str, feedback: bool) -> String {
    format!(r#"{{"version":"{version}","sessionFeedbackEnabled":{feedback}}}"#)
}
