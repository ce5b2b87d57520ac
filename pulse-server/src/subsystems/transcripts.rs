//! Transcript listing and detail lookup.

use std::cmp::Ordering;

use pulse_core::models::{ConversationRecord, Sentiment, TranscriptDetail, TranscriptPage, TranscriptSummary};
use pulse_core::{ConversationSource, DateRange, PulseError, Result};
use serde_json::{json, Map, Value};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct TranscriptQuery {
    pub project_id: String,
    pub range: DateRange,
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
    /// Keep only scored transcripts at or below this score.
    pub max_score: Option<f64>,
}

impl TranscriptQuery {
    pub fn new(project_id: impl Into<String>, range: DateRange) -> Self {
        Self {
            project_id: project_id.into(),
            range,
            search: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            max_score: None,
        }
    }

    pub fn validate(&self, max_limit: usize) -> Result<()> {
        if self.limit == 0 || self.limit > max_limit {
            return Err(PulseError::InvalidParameter(format!(
                "limit must be between 1 and {}, got {}",
                max_limit, self.limit
            )));
        }
        if let Some(max_score) = self.max_score {
            if !(0.0..=5.0).contains(&max_score) {
                return Err(PulseError::InvalidParameter(format!(
                    "maxScore must be between 0 and 5, got {}",
                    max_score
                )));
            }
        }
        Ok(())
    }

    fn matches(&self, record: &ConversationRecord) -> bool {
        if !self.range.contains(record.started_at) {
            return false;
        }
        if let Some(max_score) = self.max_score {
            match record.evaluation_score {
                Some(score) if score <= max_score => {}
                _ => return false,
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                record.id.to_lowercase().contains(&needle)
                    || record.user_id.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

/// Newest first; equal start times fall back to id so pages never overlap.
fn newest_first(a: &ConversationRecord, b: &ConversationRecord) -> Ordering {
    b.started_at
        .cmp(&a.started_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Filter, order and paginate already-fetched records.
pub fn page(records: &[ConversationRecord], query: &TranscriptQuery) -> TranscriptPage {
    let mut matching: Vec<&ConversationRecord> =
        records.iter().filter(|r| query.matches(r)).collect();
    matching.sort_by(|a, b| newest_first(a, b));

    let total = matching.len();
    let items = matching
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .map(TranscriptSummary::from)
        .collect();

    TranscriptPage {
        items,
        total,
        limit: query.limit,
        offset: query.offset,
    }
}

pub async fn list(
    source: &dyn ConversationSource,
    query: &TranscriptQuery,
    max_limit: usize,
) -> Result<TranscriptPage> {
    query.validate(max_limit)?;
    let records = source
        .list_conversations(&query.project_id, &query.range)
        .await?;
    let page = page(&records, query);

    tracing::debug!(
        project_id = %query.project_id,
        range = %query.range,
        total = page.total,
        returned = page.items.len(),
        "Listed transcripts"
    );
    Ok(page)
}

/// Fetch one transcript. With `project_id` given, a transcript belonging to
/// another project is reported as not found.
pub async fn get(
    source: &dyn ConversationSource,
    transcript_id: &str,
    project_id: Option<&str>,
) -> Result<TranscriptDetail> {
    let transcript_id = transcript_id.trim();
    if transcript_id.is_empty() {
        return Err(PulseError::InvalidParameter(
            "transcript id must not be empty".to_string(),
        ));
    }

    let record = source.get_conversation(transcript_id).await?;
    if let Some(project_id) = project_id.map(str::trim).filter(|p| !p.is_empty()) {
        if record.project_id != project_id {
            tracing::debug!(
                transcript_id,
                project_id,
                owner = %record.project_id,
                "Transcript belongs to another project"
            );
            return Err(PulseError::NotFound(format!("transcript {}", transcript_id)));
        }
    }

    Ok(detail(record))
}

pub fn detail(record: ConversationRecord) -> TranscriptDetail {
    let mut evaluations = Map::new();
    if let Some(score) = record.evaluation_score {
        evaluations.insert("score".to_string(), json!(score));
    }
    if let Some(sentiment) = record.sentiment {
        evaluations.insert("sentiment".to_string(), sentiment_value(sentiment));
    }
    if let Some(intent) = &record.detected_intent {
        evaluations.insert("intent".to_string(), Value::String(intent.clone()));
    }

    TranscriptDetail {
        id: record.id,
        project_id: record.project_id,
        start_time: record.started_at,
        user_id: record.user_id,
        duration_seconds: record.duration_seconds,
        logs: record.logs,
        properties: record.properties,
        evaluations,
    }
}

fn sentiment_value(sentiment: Sentiment) -> Value {
    serde_json::to_value(sentiment).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::aggregate::tests::{at, record};
    use pulse_core::FixtureSource;
    use std::collections::HashSet;

    fn week() -> DateRange {
        DateRange::new(at(1, 0), at(8, 0)).unwrap()
    }

    fn fixture() -> Vec<ConversationRecord> {
        let mut records: Vec<ConversationRecord> = (0u32..25)
            .map(|i| record(&format!("tr_{:02}", i), &format!("user_{}", i % 4), at(2 + i % 5, 10)))
            .collect();
        records[3].evaluation_score = Some(1.5);
        records[4].evaluation_score = Some(4.5);
        records
    }

    #[test]
    fn test_pages_are_disjoint_and_complete() {
        let records = fixture();
        let mut query = TranscriptQuery::new("p1", week());
        query.limit = 10;

        let mut seen = HashSet::new();
        for offset in [0, 10, 20] {
            query.offset = offset;
            let page = page(&records, &query);
            assert_eq!(page.total, 25);
            assert!(page.offset + page.items.len() <= page.total);
            for item in page.items {
                assert!(seen.insert(item.id), "transcript returned twice");
            }
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn test_consecutive_pages_concatenate_to_larger_page() {
        let records = fixture();
        let ids = |limit: usize, offset: usize| -> Vec<String> {
            let mut query = TranscriptQuery::new("p1", week());
            query.limit = limit;
            query.offset = offset;
            page(&records, &query).items.into_iter().map(|t| t.id).collect()
        };

        let mut joined = ids(10, 0);
        joined.extend(ids(10, 10));
        assert_eq!(joined, ids(20, 0));

        let mut reversed: Vec<ConversationRecord> = records.iter().rev().cloned().collect();
        reversed.swap(0, 7);
        let mut query = TranscriptQuery::new("p1", week());
        query.limit = 20;
        let shuffled: Vec<String> = page(&reversed, &query).items.into_iter().map(|t| t.id).collect();
        assert_eq!(shuffled, ids(20, 0));
    }

    #[test]
    fn test_order_is_newest_first_with_id_tiebreak() {
        let records = fixture();
        let query = TranscriptQuery::new("p1", week());
        let page = page(&records, &query);
        let first = &page.items[0];
        let second = &page.items[1];
        assert_eq!(first.start_time, at(6, 10));
        assert!(first.start_time > second.start_time || first.id < second.id);
    }

    #[test]
    fn test_search_matches_id_or_user_case_insensitively() {
        let records = fixture();
        let mut query = TranscriptQuery::new("p1", week());
        query.search = Some("USER_1".to_string());
        let page = page(&records, &query);
        assert!(page.total > 0);
        assert!(page.items.iter().all(|t| t.user_id == "user_1"));

        query.search = Some("tr_07".to_string());
        assert_eq!(super::page(&records, &query).total, 1);
    }

    #[test]
    fn test_max_score_keeps_low_scored_only() {
        let records = fixture();
        let mut query = TranscriptQuery::new("p1", week());
        query.max_score = Some(3.0);
        let page = page(&records, &query);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "tr_03");
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let records = fixture();
        let mut query = TranscriptQuery::new("p1", week());
        query.offset = 100;
        let page = page(&records, &query);
        assert_eq!(page.total, 25);
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_limit_validation() {
        let mut query = TranscriptQuery::new("p1", week());
        query.limit = 0;
        assert!(matches!(query.validate(MAX_LIMIT), Err(PulseError::InvalidParameter(_))));
        query.limit = 501;
        assert!(query.validate(MAX_LIMIT).is_err());
        query.limit = 500;
        assert!(query.validate(MAX_LIMIT).is_ok());
    }

    #[tokio::test]
    async fn test_get_checks_project() {
        let mut other = record("tr_other", "u", at(2, 1));
        other.project_id = "p2".to_string();
        let mut scored = record("tr_1", "u", at(2, 1));
        scored.evaluation_score = Some(4.0);
        scored.sentiment = Some(Sentiment::Positive);
        let source = FixtureSource::from_records(vec![other, scored]);

        let detail = get(&source, "tr_1", Some("p1")).await.unwrap();
        assert_eq!(detail.evaluations["score"], json!(4.0));
        assert_eq!(detail.evaluations["sentiment"], json!("positive"));

        assert!(get(&source, "tr_other", None).await.is_ok());
        let err = get(&source, "tr_other", Some("p1")).await.unwrap_err();
        assert!(matches!(err, PulseError::NotFound(_)));
        let err = get(&source, "tr_missing", None).await.unwrap_err();
        assert!(matches!(err, PulseError::NotFound(_)));
    }
}
