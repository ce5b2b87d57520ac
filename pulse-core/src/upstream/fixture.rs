use std::path::Path;

use async_trait::async_trait;

use crate::error::{PulseError, Result};
use crate::models::ConversationRecord;
use crate::period::DateRange;
use crate::upstream::{ConversationSource, WireTranscript};

/// In-memory source backed by a JSON array of platform transcripts.
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    records: Vec<ConversationRecord>,
}

impl FixtureSource {
    pub fn from_records(records: Vec<ConversationRecord>) -> Self {
        Self { records }
    }

    /// Load a file in the platform wire format. Items without `projectID`
    /// are assigned to `default_project`.
    pub fn load(path: impl AsRef<Path>, default_project: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let items: Vec<WireTranscript> = serde_json::from_str(&raw)?;
        let records: Vec<ConversationRecord> = items
            .into_iter()
            .map(|w| w.into_record(default_project))
            .collect();
        tracing::info!(
            path = %path.as_ref().display(),
            records = records.len(),
            "Loaded fixture transcripts"
        );
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ConversationSource for FixtureSource {
    async fn list_conversations(
        &self,
        project_id: &str,
        range: &DateRange,
    ) -> Result<Vec<ConversationRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.project_id == project_id && range.contains(r.started_at))
            .cloned()
            .collect())
    }

    async fn get_conversation(&self, transcript_id: &str) -> Result<ConversationRecord> {
        self.records
            .iter()
            .find(|r| r.id == transcript_id)
            .cloned()
            .ok_or_else(|| PulseError::NotFound(format!("transcript {}", transcript_id)))
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn write_fixture(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "pulse-fixture-{}-{}.json",
            std::process::id(),
            contents.len()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_filters_by_project_and_range() {
        let path = write_fixture(
            r#"[
                {"_id": "tr_1", "projectID": "p1", "createdAt": "2025-02-01T08:00:00Z"},
                {"_id": "tr_2", "projectID": "p2", "createdAt": "2025-02-01T09:00:00Z"},
                {"_id": "tr_3", "createdAt": "2025-02-08T00:00:00Z"}
            ]"#,
        );
        let source = FixtureSource::load(&path, "p1").unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(source.len(), 3);

        let range = DateRange::new(
            Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 8, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let records = source.list_conversations("p1", &range).await.unwrap();
        // tr_3 starts exactly at the exclusive end
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["tr_1"]);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let source = FixtureSource::default();
        let err = source.get_conversation("tr_x").await.unwrap_err();
        assert!(matches!(err, PulseError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let path = write_fixture("{ not json");
        let result = FixtureSource::load(&path, "p1");
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(PulseError::Json(_))));
    }
}
