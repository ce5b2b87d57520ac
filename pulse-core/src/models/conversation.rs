use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Case-insensitive; accepts the platform's evaluation labels and short forms.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" => Some(Sentiment::Positive),
            "neutral" | "neu" => Some(Sentiment::Neutral),
            "negative" | "neg" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Sentiment::Positive => "Positive",
            Sentiment::Neutral => "Neutral",
            Sentiment::Negative => "Negative",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One chat session as read from the upstream platform. Never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    pub project_id: String,
    /// Pseudonymous; the platform's session/user identifier.
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
    /// Chat score in `[0, 5]`.
    pub evaluation_score: Option<f64>,
    pub sentiment: Option<Sentiment>,
    pub detected_intent: Option<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub logs: Vec<LogEntry>,
}

impl ConversationRecord {
    pub fn first_user_message(&self) -> Option<&str> {
        self.logs
            .iter()
            .filter(|entry| entry.role == Role::User)
            .map(|entry| entry.text.trim())
            .find(|text| !text.is_empty())
    }
}
