//! Metrics aggregation: reduces one project's conversations in one period
//! into a `KpiSnapshot`.
//!
//! - Only records starting inside `[start, end)` are counted
//! - Average score and sentiment percentages are `None` when nothing is scored / labelled
//! - Intents and questions are ranked by count, ties broken by name
//! - The interaction series has one point per bucket, empty buckets included
//!
//! Aggregation is all-or-nothing: an upstream error is returned unchanged and
//! no partial snapshot is produced.

use std::collections::{BTreeMap, HashMap, HashSet};

use pulse_core::config::QueryConfig;
use pulse_core::models::{
    ConversationRecord, IntentCount, KpiSnapshot, QuestionCount, ScoreBucket, ScoreHistogram,
    Sentiment, SentimentDistribution, SeriesPoint,
};
use pulse_core::{ConversationSource, DateRange, Granularity, PulseError, Result};

/// Upper bound for caller-supplied intent limits.
pub const MAX_INTENT_LIMIT: usize = 500;

/// Category reported for questions whose conversations carry no intent.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub intent_limit: usize,
    pub question_limit: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            intent_limit: 50,
            question_limit: 10,
        }
    }
}

impl AggregateOptions {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            intent_limit: config.default_intent_limit.clamp(1, MAX_INTENT_LIMIT),
            question_limit: config.top_questions_limit,
        }
    }

    /// Override the intent limit with a caller value, which must be in `1..=500`.
    pub fn with_intent_limit(mut self, limit: Option<usize>) -> Result<Self> {
        if let Some(limit) = limit {
            if limit == 0 || limit > MAX_INTENT_LIMIT {
                return Err(PulseError::InvalidParameter(format!(
                    "limit must be between 1 and {}, got {}",
                    MAX_INTENT_LIMIT, limit
                )));
            }
            self.intent_limit = limit;
        }
        Ok(self)
    }
}

/// Fetch the period's records and aggregate them.
pub async fn aggregate_period(
    source: &dyn ConversationSource,
    project_id: &str,
    range: &DateRange,
    options: &AggregateOptions,
) -> Result<KpiSnapshot> {
    let records = source.list_conversations(project_id, range).await?;
    let snapshot = aggregate(&records, range, options);

    tracing::info!(
        project_id,
        range = %range,
        source = source.name(),
        conversations = snapshot.conversation_count,
        unique_users = snapshot.unique_user_count,
        "Aggregated period"
    );

    Ok(snapshot)
}

/// Ranked intents only, without computing the rest of the snapshot.
pub async fn intent_ranking(
    source: &dyn ConversationSource,
    project_id: &str,
    range: &DateRange,
    limit: usize,
) -> Result<Vec<IntentCount>> {
    let records = source.list_conversations(project_id, range).await?;
    Ok(top_intents(&in_range(&records, range), limit))
}

pub async fn score_distribution(
    source: &dyn ConversationSource,
    project_id: &str,
    range: &DateRange,
) -> Result<ScoreHistogram> {
    let records = source.list_conversations(project_id, range).await?;
    Ok(score_histogram(&records, range))
}

/// Records that start inside `range`, in input order.
pub fn in_range<'a>(records: &'a [ConversationRecord], range: &DateRange) -> Vec<&'a ConversationRecord> {
    records
        .iter()
        .filter(|r| range.contains(r.started_at))
        .collect()
}

pub fn aggregate(
    records: &[ConversationRecord],
    range: &DateRange,
    options: &AggregateOptions,
) -> KpiSnapshot {
    let records = in_range(records, range);

    let unique_users: HashSet<&str> = records.iter().map(|r| r.user_id.as_str()).collect();
    let sentiment = sentiment_distribution(&records);
    let (granularity, interactions) = interaction_series(&records, range);

    KpiSnapshot {
        range: *range,
        conversation_count: records.len() as u64,
        unique_user_count: unique_users.len() as u64,
        avg_score: average_score(&records),
        sentiment,
        sentiment_percentages: sentiment.percentages(),
        top_intents: top_intents(&records, options.intent_limit),
        granularity,
        interactions,
        top_questions: top_questions(&records, options.question_limit),
    }
}

pub fn average_score(records: &[&ConversationRecord]) -> Option<f64> {
    let scores: Vec<f64> = records.iter().filter_map(|r| r.evaluation_score).collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

pub fn sentiment_distribution(records: &[&ConversationRecord]) -> SentimentDistribution {
    let mut dist = SentimentDistribution::default();
    for record in records {
        match record.sentiment {
            Some(Sentiment::Positive) => dist.positive += 1,
            Some(Sentiment::Neutral) => dist.neutral += 1,
            Some(Sentiment::Negative) => dist.negative += 1,
            None => {}
        }
    }
    dist
}

/// Intents by count descending, then name ascending, truncated to `limit`.
pub fn top_intents(records: &[&ConversationRecord], limit: usize) -> Vec<IntentCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for intent in records.iter().filter_map(|r| r.detected_intent.as_deref()) {
        *counts.entry(intent).or_insert(0) += 1;
    }
    let tagged: u64 = counts.values().sum();

    let mut intents: Vec<IntentCount> = counts
        .into_iter()
        .map(|(name, count)| IntentCount {
            name: name.to_string(),
            count,
            share: count as f64 / tagged as f64 * 100.0,
        })
        .collect();

    intents.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    intents.truncate(limit);
    intents
}

/// Bucketed conversation counts covering the whole range without gaps.
pub fn interaction_series(
    records: &[&ConversationRecord],
    range: &DateRange,
) -> (Granularity, Vec<SeriesPoint>) {
    let granularity = range.granularity();
    let buckets = range.bucket_starts(granularity);
    let mut counts = vec![0u64; buckets.len()];

    if let Some(&first) = buckets.first() {
        let step = granularity.step().num_seconds();
        for record in records {
            let offset = (granularity.truncate(record.started_at) - first).num_seconds() / step;
            if let Some(slot) = usize::try_from(offset).ok().and_then(|i| counts.get_mut(i)) {
                *slot += 1;
            }
        }
    }

    let series = buckets
        .into_iter()
        .zip(counts)
        .map(|(period, count)| SeriesPoint { period, count })
        .collect();
    (granularity, series)
}

struct QuestionGroup {
    display: String,
    count: u64,
    intents: BTreeMap<String, u64>,
}

/// Most frequent opening user questions, grouped case-insensitively.
pub fn top_questions(records: &[&ConversationRecord], limit: usize) -> Vec<QuestionCount> {
    let mut groups: HashMap<String, QuestionGroup> = HashMap::new();

    for record in records {
        let Some(text) = record.first_user_message() else {
            continue;
        };
        let display = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let group = groups
            .entry(display.to_lowercase())
            .or_insert_with(|| QuestionGroup {
                display: display.clone(),
                count: 0,
                intents: BTreeMap::new(),
            });
        group.count += 1;
        if display < group.display {
            group.display = display;
        }
        if let Some(intent) = &record.detected_intent {
            *group.intents.entry(intent.clone()).or_insert(0) += 1;
        }
    }

    let mut questions: Vec<QuestionCount> = groups
        .into_values()
        .map(|group| {
            let mut category: Option<(&str, u64)> = None;
            for (name, &count) in &group.intents {
                if category.map_or(true, |(_, best)| count > best) {
                    category = Some((name, count));
                }
            }
            QuestionCount {
                category: category.map_or(UNCATEGORIZED, |(name, _)| name).to_string(),
                question: group.display,
                count: group.count,
            }
        })
        .collect();

    questions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.question.cmp(&b.question)));
    questions.truncate(limit);
    questions
}

/// Distribution of chat scores over integer buckets 0-5.
pub fn score_histogram(records: &[ConversationRecord], range: &DateRange) -> ScoreHistogram {
    let records = in_range(records, range);
    let mut counts = [0u64; 6];
    for score in records.iter().filter_map(|r| r.evaluation_score) {
        let bucket = (score.round().max(0.0) as usize).min(5);
        counts[bucket] += 1;
    }

    ScoreHistogram {
        buckets: counts
            .iter()
            .enumerate()
            .map(|(score, &count)| ScoreBucket {
                score: score as u8,
                count,
            })
            .collect(),
        rated: counts.iter().sum(),
        average: average_score(&records),
    }
}
