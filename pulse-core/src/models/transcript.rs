use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::conversation::{ConversationRecord, LogEntry, Sentiment};

/// List-view projection of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSummary {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub user_id: String,
    pub duration_seconds: u64,
    pub score: Option<f64>,
    pub sentiment: Option<Sentiment>,
    pub intent: Option<String>,
}

impl From<&ConversationRecord> for TranscriptSummary {
    fn from(record: &ConversationRecord) -> Self {
        Self {
            id: record.id.clone(),
            start_time: record.started_at,
            user_id: record.user_id.clone(),
            duration_seconds: record.duration_seconds,
            score: record.evaluation_score,
            sentiment: record.sentiment,
            intent: record.detected_intent.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptPage {
    pub items: Vec<TranscriptSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptDetail {
    pub id: String,
    pub project_id: String,
    pub start_time: DateTime<Utc>,
    pub user_id: String,
    pub duration_seconds: u64,
    pub logs: Vec<LogEntry>,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub evaluations: serde_json::Map<String, serde_json::Value>,
}
