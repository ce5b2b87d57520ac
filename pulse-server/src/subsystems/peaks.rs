//! Usage peaks: when conversations happen.
//!
//! The heatmap is indexed `[weekday][hour]` with Monday first and UTC hours.

use chrono::{Datelike, Timelike};
use pulse_core::models::{ConversationRecord, SeriesPoint};
use pulse_core::{ConversationSource, DateRange, Granularity, PulseError, Result};
use serde::Serialize;

use crate::subsystems::aggregate::{in_range, interaction_series};

const SLOTS: usize = 7 * 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakSlot {
    /// e.g. `Mon 14:00-15:00`
    pub period: String,
    pub weekday: u8,
    pub hour: u8,
    pub count: u64,
    /// Percentage of all conversations in the range, one decimal.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsagePeaks {
    pub granularity: Granularity,
    pub series: Vec<SeriesPoint>,
    pub top: Vec<PeakSlot>,
    pub heatmap: Vec<Vec<u64>>,
}

pub fn validate_top(top: usize) -> Result<usize> {
    if top == 0 || top > SLOTS {
        return Err(PulseError::InvalidParameter(format!(
            "top must be between 1 and {}, got {}",
            SLOTS, top
        )));
    }
    Ok(top)
}

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

fn slot_label(weekday: usize, hour: usize) -> String {
    let day = WEEKDAYS.get(weekday).copied().unwrap_or("?");
    format!("{} {:02}:00-{:02}:00", day, hour, hour + 1)
}

pub fn heatmap(records: &[&ConversationRecord]) -> Vec<Vec<u64>> {
    let mut grid = vec![vec![0u64; 24]; 7];
    for record in records {
        let day = record.started_at.weekday().num_days_from_monday() as usize;
        let hour = record.started_at.hour() as usize;
        grid[day][hour] += 1;
    }
    grid
}

pub fn peaks(records: &[ConversationRecord], range: &DateRange, top: usize) -> UsagePeaks {
    let records = in_range(records, range);
    let total = records.len() as u64;
    let (granularity, series) = interaction_series(&records, range);
    let grid = heatmap(&records);

    let mut slots: Vec<(usize, usize, u64)> = grid
        .iter()
        .enumerate()
        .flat_map(|(day, hours)| {
            hours
                .iter()
                .enumerate()
                .filter(|(_, &count)| count > 0)
                .map(move |(hour, &count)| (day, hour, count))
        })
        .collect();
    // busiest first; ties in calendar order
    slots.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| (a.0, a.1).cmp(&(b.0, b.1))));

    let top = slots
        .into_iter()
        .take(top)
        .map(|(day, hour, count)| PeakSlot {
            period: slot_label(day, hour),
            weekday: day as u8,
            hour: hour as u8,
            count,
            share: (count as f64 / total as f64 * 1000.0).round() / 10.0,
        })
        .collect();

    UsagePeaks {
        granularity,
        series,
        top,
        heatmap: grid,
    }
}

pub async fn usage_peaks(
    source: &dyn ConversationSource,
    project_id: &str,
    range: &DateRange,
    top: usize,
) -> Result<UsagePeaks> {
    let top = validate_top(top)?;
    let records = source.list_conversations(project_id, range).await?;
    Ok(peaks(&records, range, top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::aggregate::tests::{at, record};

    #[test]
    fn test_slot_label() {
        assert_eq!(slot_label(0, 14), "Mon 14:00-15:00");
        assert_eq!(slot_label(6, 23), "Sun 23:00-24:00");
    }

    #[test]
    fn test_peaks_rank_busiest_slots() {
        // 2025-02-03 is a Monday
        let records = vec![
            record("tr_1", "u", at(3, 14)),
            record("tr_2", "u", at(3, 14)),
            record("tr_3", "u", at(3, 14)),
            record("tr_4", "u", at(4, 9)),
            record("tr_5", "u", at(2, 9)),
            record("tr_6", "u", at(4, 9)),
        ];
        let range = DateRange::new(at(1, 0), at(8, 0)).unwrap();
        let result = peaks(&records, &range, 2);

        assert_eq!(result.heatmap.len(), 7);
        assert!(result.heatmap.iter().all(|row| row.len() == 24));
        assert_eq!(result.heatmap[0][14], 3);
        assert_eq!(result.heatmap[6][9], 1);

        assert_eq!(result.top.len(), 2);
        assert_eq!(result.top[0].period, "Mon 14:00-15:00");
        assert_eq!(result.top[0].share, 50.0);
        assert_eq!(result.top[1].period, "Tue 09:00-10:00");
        assert_eq!(result.top[1].share, 33.3);
        assert_eq!(result.series.len(), 7);
    }

    #[test]
    fn test_empty_range_has_no_top_slots() {
        let range = DateRange::new(at(1, 0), at(8, 0)).unwrap();
        let result = peaks(&[], &range, 5);
        assert!(result.top.is_empty());
        assert_eq!(result.heatmap.iter().flatten().sum::<u64>(), 0);
    }

    #[test]
    fn test_validate_top() {
        assert!(validate_top(0).is_err());
        assert!(validate_top(169).is_err());
        assert_eq!(validate_top(5).unwrap(), 5);
    }
}
