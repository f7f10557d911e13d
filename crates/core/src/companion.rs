use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_MINUTES: u32 = 15;

/// A configured tutor persona as stored in the `companions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionRecord {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub topic: String,
    pub style: String,
    pub voice: String,
    /// Session length in minutes.
    pub duration: u32,
    #[serde(default)]
    pub color: Option<String>,
    pub author: String,
}

/// User input for a new companion, before the author is stamped on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompanion {
    pub name: String,
    pub subject: String,
    pub topic: String,
    pub voice: String,
    pub style: String,
    pub duration: u32,
}

impl NewCompanion {
    pub fn new(name: &str, subject: &str, topic: &str, voice: &str, style: &str) -> Self {
        Self {
            name: name.to_string(),
            subject: subject.to_string(),
            topic: topic.to_string(),
            voice: voice.to_string(),
            style: style.to_string(),
            duration: DEFAULT_DURATION_MINUTES,
        }
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    /// Checks the same rules the creation form enforces.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("subject", &self.subject),
            ("topic", &self.topic),
            ("voice", &self.voice),
            ("style", &self.style),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{field} is required")));
            }
        }
        if self.duration < 1 {
            return Err(Error::InvalidInput("duration must be at least 1 minute".into()));
        }
        Ok(())
    }

    /// Builds the stored row for this input.
    pub fn into_record(self, id: String, author: &str) -> CompanionRecord {
        CompanionRecord {
            id,
            name: self.name,
            subject: self.subject,
            topic: self.topic,
            style: self.style,
            voice: self.voice,
            duration: self.duration,
            color: None,
            author: author.to_string(),
        }
    }
}

/// A row of `session_history`: a user talked to a companion at `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    pub id: String,
    pub companion_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A `session_history` row joined with its companion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    #[serde(flatten)]
    pub entry: SessionHistoryEntry,
    #[serde(rename = "companions")]
    pub companion: CompanionRecord,
}
