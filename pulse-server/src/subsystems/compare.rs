//! Period-over-period comparison.
//!
//! The previous window always has the same length as the current one and
//! ends exactly where it starts. Both windows are aggregated concurrently;
//! if either fetch fails the comparison fails.

use pulse_core::models::{ComparisonResult, KpiSnapshot, MetricChange, MetricChanges};
use pulse_core::{ConversationSource, DateRange, Result};

use crate::subsystems::aggregate::{aggregate_period, AggregateOptions};

/// Percentage change from `previous` to `current`.
///
/// Zero when both are zero, `None` when only the previous value is zero.
pub fn percentage_delta(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        if current == 0.0 {
            Some(0.0)
        } else {
            None
        }
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

pub fn change(current: f64, previous: f64) -> MetricChange {
    MetricChange {
        absolute: Some(current - previous),
        percentage: percentage_delta(current, previous),
    }
}

/// Change of a nullable metric; undefined when either side is missing.
pub fn optional_change(current: Option<f64>, previous: Option<f64>) -> MetricChange {
    match (current, previous) {
        (Some(c), Some(p)) => change(c, p),
        _ => MetricChange {
            absolute: None,
            percentage: None,
        },
    }
}

pub fn metric_changes(current: &KpiSnapshot, previous: &KpiSnapshot) -> MetricChanges {
    MetricChanges {
        conversations: change(
            current.conversation_count as f64,
            previous.conversation_count as f64,
        ),
        unique_users: change(
            current.unique_user_count as f64,
            previous.unique_user_count as f64,
        ),
        avg_chat_score: optional_change(current.avg_score, previous.avg_score),
        positive_sentiment: optional_change(current.positive_share(), previous.positive_share()),
    }
}

pub fn compare(current: KpiSnapshot, previous: KpiSnapshot) -> ComparisonResult {
    let changes = metric_changes(&current, &previous);
    ComparisonResult {
        current_range: current.range,
        previous_range: previous.range,
        current,
        previous,
        changes,
    }
}

pub async fn compare_periods(
    source: &dyn ConversationSource,
    project_id: &str,
    current_range: &DateRange,
    options: &AggregateOptions,
) -> Result<ComparisonResult> {
    let previous_range = current_range.previous()?;

    let (current, previous) = tokio::try_join!(
        aggregate_period(source, project_id, current_range, options),
        aggregate_period(source, project_id, &previous_range, options),
    )?;

    tracing::debug!(
        project_id,
        current = %current_range,
        previous = %previous_range,
        "Compared periods"
    );

    Ok(compare(current, previous))
}
