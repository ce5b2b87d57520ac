//! Upstream conversation sources.
//!
//! Provides a `ConversationSource` trait with implementations for:
//! - **PlatformClient**: the chatbot platform's transcript API over HTTP
//! - **FixtureSource**: records loaded from a local JSON file
//! - **CachedSource** (see `crate::cache`): TTL cache in front of either
//!
//! Sources are read-only. Every implementation returns either the complete
//! record set for a request or an error; never a partial result.

pub mod client;
pub mod fixture;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::{ConversationRecord, LogEntry, Role, Sentiment};
use crate::period::DateRange;

pub use client::PlatformClient;
pub use fixture::FixtureSource;

/// Property key the platform stores the chat score under.
pub const SCORE_PROPERTY: &str = "chat_score";

const MAX_SCORE: f64 = 5.0;

#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// All conversations of `project_id` whose start falls in `range`.
    async fn list_conversations(
        &self,
        project_id: &str,
        range: &DateRange,
    ) -> Result<Vec<ConversationRecord>>;

    /// One conversation with its full message log. `NotFound` for unknown ids.
    async fn get_conversation(&self, transcript_id: &str) -> Result<ConversationRecord>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Wire format
// ============================================================================

/// Transcript as returned by the platform's transcript endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTranscript {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "projectID", default)]
    pub project_id: Option<String>,
    #[serde(rename = "sessionID", alias = "userID", default)]
    pub session_id: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", alias = "endedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub evaluations: Map<String, Value>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub logs: Vec<WireLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireLog {
    #[serde(alias = "source", default)]
    pub role: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(alias = "createdAt", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One page of `POST /v1/transcript/project/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WirePage {
    #[serde(default)]
    pub items: Vec<WireTranscript>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl WireTranscript {
    /// Normalize into a record. `fallback_project` is used when the platform
    /// omits `projectID`; conversations without a session id count as their
    /// own user.
    pub fn into_record(self, fallback_project: &str) -> ConversationRecord {
        let duration_seconds = self
            .updated_at
            .map(|end| (end - self.created_at).num_seconds().max(0) as u64)
            .unwrap_or(0);

        let evaluation_score = self.score();
        let sentiment = self
            .evaluations
            .get("sentiment")
            .or_else(|| self.properties.get("sentiment"))
            .and_then(Value::as_str)
            .and_then(Sentiment::parse);
        let detected_intent = self
            .intent
            .clone()
            .or_else(|| {
                self.properties
                    .get("intent")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty());

        let logs = self.logs.into_iter().filter_map(WireLog::into_entry).collect();

        ConversationRecord {
            user_id: self
                .session_id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| self.id.clone()),
            project_id: self
                .project_id
                .unwrap_or_else(|| fallback_project.to_string()),
            id: self.id,
            started_at: self.created_at,
            duration_seconds,
            evaluation_score,
            sentiment,
            detected_intent,
            properties: self.properties,
            logs,
        }
    }

    fn score(&self) -> Option<f64> {
        let raw = self.properties.get(SCORE_PROPERTY)?;
        let value = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        if value.is_finite() && (0.0..=MAX_SCORE).contains(&value) {
            Some(value)
        } else {
            tracing::warn!(transcript_id = %self.id, score = value, "Ignoring chat score outside 0-5");
            None
        }
    }
}

impl WireLog {
    fn into_entry(self) -> Option<LogEntry> {
        let text = self
            .text
            .or_else(|| {
                self.payload
                    .as_ref()
                    .and_then(|p| p.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .filter(|t| !t.trim().is_empty())?;

        let role = match self.role.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("user") => Role::User,
            Some("assistant") | Some("bot") | Some("agent") => Role::Assistant,
            Some("system") => Role::System,
            _ => Role::Other,
        };

        Some(LogEntry {
            role,
            text,
            timestamp: self.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(json: serde_json::Value) -> WireTranscript {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_into_record_maps_platform_fields() {
        let record = wire(serde_json::json!({
            "_id": "tr_abc123",
            "projectID": "p1",
            "sessionID": "user_4521",
            "createdAt": "2025-02-03T10:00:00Z",
            "updatedAt": "2025-02-03T10:04:30Z",
            "properties": { "chat_score": 4, "intent": "Pricing" },
            "evaluations": { "sentiment": "Positive" },
            "logs": [
                { "role": "user", "text": "How much is the pro plan?", "timestamp": "2025-02-03T10:00:01Z" },
                { "source": "bot", "payload": { "text": "It is $20/month." } }
            ]
        }))
        .into_record("fallback");

        assert_eq!(record.id, "tr_abc123");
        assert_eq!(record.project_id, "p1");
        assert_eq!(record.user_id, "user_4521");
        assert_eq!(record.duration_seconds, 270);
        assert_eq!(record.evaluation_score, Some(4.0));
        assert_eq!(record.sentiment, Some(Sentiment::Positive));
        assert_eq!(record.detected_intent.as_deref(), Some("Pricing"));
        assert_eq!(record.logs.len(), 2);
        assert_eq!(record.logs[1].role, Role::Assistant);
        assert_eq!(record.logs[1].text, "It is $20/month.");
        assert_eq!(record.first_user_message(), Some("How much is the pro plan?"));
    }

    #[test]
    fn test_into_record_defaults() {
        let record = wire(serde_json::json!({
            "id": "tr_1",
            "createdAt": "2025-02-03T10:00:00Z"
        }))
        .into_record("p9");

        assert_eq!(record.project_id, "p9");
        assert_eq!(record.user_id, "tr_1");
        assert_eq!(record.duration_seconds, 0);
        assert!(record.evaluation_score.is_none());
        assert!(record.sentiment.is_none());
        assert!(record.detected_intent.is_none());
        assert!(record.first_user_message().is_none());
    }

    #[test]
    fn test_out_of_domain_scores_are_dropped() {
        for raw in [serde_json::json!(7), serde_json::json!(-1), serde_json::json!("n/a")] {
            let record = wire(serde_json::json!({
                "id": "tr_1",
                "createdAt": "2025-02-03T10:00:00Z",
                "properties": { "chat_score": raw }
            }))
            .into_record("p1");
            assert!(record.evaluation_score.is_none());
        }

        let record = wire(serde_json::json!({
            "id": "tr_2",
            "createdAt": "2025-02-03T10:00:00Z",
            "properties": { "chat_score": "3.5" }
        }))
        .into_record("p1");
        assert_eq!(record.evaluation_score, Some(3.5));
    }

    #[test]
    fn test_blank_intent_is_absent() {
        let record = wire(serde_json::json!({
            "id": "tr_1",
            "createdAt": "2025-02-03T10:00:00Z",
            "intent": "   "
        }))
        .into_record("p1");
        assert!(record.detected_intent.is_none());
    }
}
