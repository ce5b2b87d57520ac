//! Report export.
//!
//! A snapshot or comparison is first flattened into an `ExportReport` (ordered
//! sections of rows), which is then rendered in the requested format. Only CSV
//! is rendered; PDF is recognised but reported as unsupported.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use pulse_core::models::{ComparisonResult, KpiSnapshot, MetricChanges};
use pulse_core::{PulseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(PulseError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSection {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportSection {
    fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub sections: Vec<ExportSection>,
}

impl ExportReport {
    /// Single-period report; the change column is left empty.
    pub fn from_snapshot(snapshot: &KpiSnapshot) -> Self {
        Self::build(snapshot, None)
    }

    /// Current period values with their change against the previous period.
    pub fn from_comparison(comparison: &ComparisonResult) -> Self {
        Self::build(&comparison.current, Some(&comparison.changes))
    }

    fn build(snapshot: &KpiSnapshot, changes: Option<&MetricChanges>) -> Self {
        let change_cell = |pick: fn(&MetricChanges) -> Option<f64>| {
            changes.map(|c| format_change(pick(c))).unwrap_or_default()
        };

        let mut summary = ExportSection::new(&["Metric", "Value", "Change"]);
        summary.row(vec![
            "Total Conversations".to_string(),
            snapshot.conversation_count.to_string(),
            change_cell(|c| c.conversations.percentage),
        ]);
        summary.row(vec![
            "Unique Users".to_string(),
            snapshot.unique_user_count.to_string(),
            change_cell(|c| c.unique_users.percentage),
        ]);
        summary.row(vec![
            "Avg Chat Score".to_string(),
            snapshot
                .avg_score
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(|| "n/a".to_string()),
            change_cell(|c| c.avg_chat_score.percentage),
        ]);
        summary.row(vec![
            "Positive Sentiment".to_string(),
            snapshot
                .positive_share()
                .map(|p| format!("{:.1}%", p))
                .unwrap_or_else(|| "n/a".to_string()),
            change_cell(|c| c.positive_sentiment.percentage),
        ]);

        let mut intents = ExportSection::new(&["Top Intents", "Count"]);
        for intent in &snapshot.top_intents {
            intents.row(vec![intent.name.clone(), intent.count.to_string()]);
        }

        let mut questions = ExportSection::new(&["Top Questions", "Count", "Category"]);
        for question in &snapshot.top_questions {
            questions.row(vec![
                question.question.clone(),
                question.count.to_string(),
                question.category.clone(),
            ]);
        }

        Self {
            sections: vec![summary, intents, questions],
        }
    }
}

/// `+12.4%` / `-3.0%` with one decimal, `n/a` when undefined.
pub fn format_change(percentage: Option<f64>) -> String {
    match percentage {
        Some(p) => {
            let rounded = (p * 10.0).round() / 10.0;
            // avoid "-0.0%"
            let rounded = if rounded == 0.0 { 0.0 } else { rounded };
            format!("{:+.1}%", rounded)
        }
        None => "n/a".to_string(),
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn csv_line(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| csv_field(c))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn render_csv(report: &ExportReport) -> String {
    let blocks: Vec<String> = report
        .sections
        .iter()
        .map(|section| {
            std::iter::once(csv_line(&section.header))
                .chain(section.rows.iter().map(|r| csv_line(r)))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();

    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

/// A rendered export ready to be sent as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub content_type: &'static str,
    pub filename: String,
    pub body: String,
}

pub fn render(report: &ExportReport, format: ExportFormat, date: NaiveDate) -> Result<ExportFile> {
    match format {
        ExportFormat::Csv => Ok(ExportFile {
            content_type: "text/csv; charset=utf-8",
            filename: format!("chat-analytics-{}.csv", date.format("%Y-%m-%d")),
            body: render_csv(report),
        }),
        ExportFormat::Pdf => Err(PulseError::UnsupportedFormat(
            "pdf export is not available".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::aggregate::tests::at;
    use crate::subsystems::aggregate::{aggregate, AggregateOptions};
    use crate::subsystems::compare::compare;
    use pulse_core::models::{IntentCount, QuestionCount};
    use pulse_core::DateRange;

    fn snapshot(conversations: u64) -> KpiSnapshot {
        let range = DateRange::new(at(1, 0), at(8, 0)).unwrap();
        let mut snapshot = aggregate(&[], &range, &AggregateOptions::default());
        snapshot.conversation_count = conversations;
        snapshot
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("pdf".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(PulseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_format_change() {
        assert_eq!(format_change(Some(12.397)), "+12.4%");
        assert_eq!(format_change(Some(-3.0)), "-3.0%");
        assert_eq!(format_change(Some(0.0)), "+0.0%");
        assert_eq!(format_change(Some(-0.01)), "+0.0%");
        assert_eq!(format_change(None), "n/a");
    }

    #[test]
    fn test_comparison_csv_literal_row() {
        let comparison = compare(snapshot(12847), snapshot(11430));
        let csv = render_csv(&ExportReport::from_comparison(&comparison));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Metric,Value,Change");
        assert_eq!(lines[1], "Total Conversations,12847,+12.4%");
        assert!(csv.contains("Avg Chat Score,n/a,n/a"));
        assert!(csv.ends_with('\n'));
        assert!(!csv.ends_with("\n\n"));
    }

    #[test]
    fn test_snapshot_csv_sections_and_quoting() {
        let mut snap = snapshot(3);
        snap.avg_score = Some(4.24);
        snap.top_intents.push(IntentCount {
            name: "Billing, Refunds".to_string(),
            count: 2,
            share: 66.7,
        });
        snap.top_questions.push(QuestionCount {
            question: "What does \"pro\" include?".to_string(),
            count: 1,
            category: "Pricing".to_string(),
        });

        let csv = render_csv(&ExportReport::from_snapshot(&snap));
        let expected = "Metric,Value,Change\n\
            Total Conversations,3,\n\
            Unique Users,0,\n\
            Avg Chat Score,4.2,\n\
            Positive Sentiment,n/a,\n\
            \n\
            Top Intents,Count\n\
            \"Billing, Refunds\",2\n\
            \n\
            Top Questions,Count,Category\n\
            \"What does \"\"pro\"\" include?\",1,Pricing\n";
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_render_csv_file_and_pdf_unsupported() {
        let report = ExportReport::from_snapshot(&snapshot(0));
        let date = NaiveDate::from_ymd_opt(2025, 2, 8).unwrap();

        let file = render(&report, ExportFormat::Csv, date).unwrap();
        assert_eq!(file.filename, "chat-analytics-2025-02-08.csv");
        assert!(file.content_type.starts_with("text/csv"));

        let err = render(&report, ExportFormat::Pdf, date).unwrap_err();
        assert!(matches!(err, PulseError::UnsupportedFormat(_)));
    }
}
