use serde::Serialize;

use crate::models::snapshot::KpiSnapshot;
use crate::period::DateRange;

/// Delta of one metric between the current and previous period.
///
/// `percentage` is `None` when the previous value is zero and the current is
/// not; both fields are `None` when either side of the metric is missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricChange {
    pub absolute: Option<f64>,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricChanges {
    pub conversations: MetricChange,
    pub unique_users: MetricChange,
    pub avg_chat_score: MetricChange,
    pub positive_sentiment: MetricChange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub current_range: DateRange,
    pub previous_range: DateRange,
    pub current: KpiSnapshot,
    pub previous: KpiSnapshot,
    pub changes: MetricChanges,
}
