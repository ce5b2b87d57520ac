//! Content gap detection.
//!
//! An intent is flagged when it is discussed often enough to matter and its
//! conversations go badly: a low average score or a high share of negative
//! sentiment.

use std::collections::BTreeMap;

use pulse_core::config::QueryConfig;
use pulse_core::models::{ConversationRecord, Sentiment};
use pulse_core::{ConversationSource, DateRange, Result};
use serde::Serialize;

use crate::subsystems::aggregate::in_range;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapThresholds {
    pub min_mentions: u64,
    pub score_threshold: f64,
    pub negative_share_threshold: f64,
}

impl Default for GapThresholds {
    fn default() -> Self {
        Self {
            min_mentions: 5,
            score_threshold: 3.0,
            negative_share_threshold: 30.0,
        }
    }
}

impl GapThresholds {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            min_mentions: config.gap_min_mentions.max(1),
            score_threshold: config.gap_score_threshold,
            negative_share_threshold: config.gap_negative_share_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub topic: String,
    pub reason: String,
    pub mentions: u64,
    pub avg_score: Option<f64>,
    pub negative_share: Option<f64>,
}

#[derive(Default)]
struct IntentStats {
    mentions: u64,
    score_sum: f64,
    scored: u64,
    negative: u64,
    labelled: u64,
}

pub fn content_gaps(
    records: &[ConversationRecord],
    range: &DateRange,
    thresholds: &GapThresholds,
) -> Vec<Recommendation> {
    let mut stats: BTreeMap<&str, IntentStats> = BTreeMap::new();
    for record in in_range(records, range) {
        let Some(intent) = record.detected_intent.as_deref() else {
            continue;
        };
        let entry = stats.entry(intent).or_default();
        entry.mentions += 1;
        if let Some(score) = record.evaluation_score {
            entry.score_sum += score;
            entry.scored += 1;
        }
        if let Some(sentiment) = record.sentiment {
            entry.labelled += 1;
            if sentiment == Sentiment::Negative {
                entry.negative += 1;
            }
        }
    }

    let mut recommendations: Vec<Recommendation> = stats
        .into_iter()
        .filter(|(_, s)| s.mentions >= thresholds.min_mentions)
        .filter_map(|(topic, s)| {
            let avg_score = (s.scored > 0).then(|| s.score_sum / s.scored as f64);
            let negative_share =
                (s.labelled > 0).then(|| s.negative as f64 / s.labelled as f64 * 100.0);

            let mut signals = Vec::new();
            if let Some(avg) = avg_score.filter(|a| *a < thresholds.score_threshold) {
                signals.push(format!(
                    "low average score ({:.1} of 5, below {:.1})",
                    avg, thresholds.score_threshold
                ));
            }
            if let Some(share) = negative_share.filter(|n| *n >= thresholds.negative_share_threshold) {
                signals.push(format!("{:.0}% negative sentiment", share));
            }
            if signals.is_empty() {
                return None;
            }

            Some(Recommendation {
                topic: topic.to_string(),
                reason: format!("Mentioned in {} conversations; {}", s.mentions, signals.join("; ")),
                mentions: s.mentions,
                avg_score,
                negative_share,
            })
        })
        .collect();

    recommendations.sort_by(|a, b| b.mentions.cmp(&a.mentions).then_with(|| a.topic.cmp(&b.topic)));
    recommendations
}

pub async fn find_gaps(
    source: &dyn ConversationSource,
    project_id: &str,
    range: &DateRange,
    thresholds: &GapThresholds,
) -> Result<Vec<Recommendation>> {
    let records = source.list_conversations(project_id, range).await?;
    let gaps = content_gaps(&records, range, thresholds);
    tracing::debug!(project_id, range = %range, gaps = gaps.len(), "Content gaps computed");
    Ok(gaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::aggregate::tests::{at, record};

    fn tagged(i: u32, intent: &str, score: Option<f64>, sentiment: Option<Sentiment>) -> ConversationRecord {
        let mut r = record(&format!("tr_{}_{}", intent, i), "u", at(2, i % 24));
        r.detected_intent = Some(intent.to_string());
        r.evaluation_score = score;
        r.sentiment = sentiment;
        r
    }

    fn week() -> DateRange {
        DateRange::new(at(1, 0), at(8, 0)).unwrap()
    }

    #[test]
    fn test_low_score_intent_is_flagged() {
        let mut records: Vec<ConversationRecord> =
            (0..6).map(|i| tagged(i, "Refunds", Some(2.0), None)).collect();
        records.extend((0..8).map(|i| tagged(i, "Greeting", Some(4.8), Some(Sentiment::Positive))));

        let gaps = content_gaps(&records, &week(), &GapThresholds::default());
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].topic, "Refunds");
        assert_eq!(gaps[0].mentions, 6);
        assert!(gaps[0].reason.contains("Mentioned in 6 conversations"));
        assert!(gaps[0].reason.contains("low average score"));
    }

    #[test]
    fn test_negative_share_triggers_and_volume_gate_applies() {
        let mut records: Vec<ConversationRecord> = (0..10)
            .map(|i| {
                let sentiment = if i < 3 { Sentiment::Negative } else { Sentiment::Neutral };
                tagged(i, "Shipping", None, Some(sentiment))
            })
            .collect();
        // too few mentions to count
        records.extend((0..4).map(|i| tagged(i, "Outage", Some(0.5), Some(Sentiment::Negative))));

        let gaps = content_gaps(&records, &week(), &GapThresholds::default());
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].topic, "Shipping");
        assert!(gaps[0].reason.contains("30% negative sentiment"));
        assert!(gaps[0].avg_score.is_none());
    }

    #[test]
    fn test_ordering_by_mentions_then_topic() {
        let mut records = Vec::new();
        for topic in ["Billing", "Access"] {
            records.extend((0..5).map(|i| tagged(i, topic, Some(1.0), None)));
        }
        records.extend((0..7).map(|i| tagged(i, "Setup", Some(1.0), None)));

        let topics: Vec<String> = content_gaps(&records, &week(), &GapThresholds::default())
            .into_iter()
            .map(|g| g.topic)
            .collect();
        assert_eq!(topics, vec!["Setup", "Access", "Billing"]);
    }
}
