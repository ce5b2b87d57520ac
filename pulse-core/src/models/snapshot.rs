use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::period::{DateRange, Granularity};

/// Aggregated KPIs for one project and one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub range: DateRange,
    #[serde(rename = "conversations")]
    pub conversation_count: u64,
    #[serde(rename = "uniqueUsers")]
    pub unique_user_count: u64,
    /// `None` when no conversation in the period carries a score.
    #[serde(rename = "avgChatScore")]
    pub avg_score: Option<f64>,
    pub sentiment: SentimentDistribution,
    /// `None` when no conversation in the period carries a sentiment.
    pub sentiment_percentages: Option<SentimentPercentages>,
    pub top_intents: Vec<IntentCount>,
    pub granularity: Granularity,
    pub interactions: Vec<SeriesPoint>,
    pub top_questions: Vec<QuestionCount>,
}

impl KpiSnapshot {
    pub fn positive_share(&self) -> Option<f64> {
        self.sentiment_percentages.as_ref().map(|p| p.positive)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentDistribution {
    #[serde(rename = "pos")]
    pub positive: u64,
    #[serde(rename = "neu")]
    pub neutral: u64,
    #[serde(rename = "neg")]
    pub negative: u64,
}

impl SentimentDistribution {
    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }

    pub fn percentages(&self) -> Option<SentimentPercentages> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let pct = |n: u64| n as f64 / total as f64 * 100.0;
        Some(SentimentPercentages {
            positive: pct(self.positive),
            neutral: pct(self.neutral),
            negative: pct(self.negative),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentPercentages {
    #[serde(rename = "pos")]
    pub positive: f64,
    #[serde(rename = "neu")]
    pub neutral: f64,
    #[serde(rename = "neg")]
    pub negative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentCount {
    pub name: String,
    pub count: u64,
    /// Percentage of intent-tagged conversations.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub period: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionCount {
    pub question: String,
    pub count: u64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreHistogram {
    pub buckets: Vec<ScoreBucket>,
    pub rated: u64,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreBucket {
    pub score: u8,
    pub count: u64,
}
