use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Speaker {
    pub id: String,
    pub full_name: String,
    pub bio: String,
    pub company: String,
    pub job_title: String,
    pub socials: SpeakerSocials,
    pub headshot_url: String,
    pub tags: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Speaker {
    /// "Job Title, Company", skipping whichever part is blank.
    pub fn affiliation(&self) -> Option<String> {
        let parts: Vec<&str> = [self.job_title.trim(), self.company.trim()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct SpeakerSocials {
    pub twitter: Option<String>,
    pub mastodon: Option<String>,
    #[serde(alias = "gitHub")]
    pub github: Option<String>,
    #[serde(alias = "linkedIn")]
    pub linkedin: Option<String>,
    pub website: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affiliation() {
        let mut speaker = Speaker {
            job_title: "Engineer".to_string(),
            company: "Acme".to_string(),
            ..Default::default()
        };
        assert_eq!(speaker.affiliation().as_deref(), Some("Engineer, Acme"));

        speaker.job_title.clear();
        assert_eq!(speaker.affiliation().as_deref(), Some("Acme"));

        speaker.company.clear();
        assert_eq!(speaker.affiliation(), None);
    }
}
