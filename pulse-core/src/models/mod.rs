pub mod comparison;
pub mod conversation;
pub mod snapshot;
pub mod transcript;

pub use comparison::{ComparisonResult, MetricChange, MetricChanges};
pub use conversation::{ConversationRecord, LogEntry, Role, Sentiment};
pub use snapshot::{
    IntentCount, KpiSnapshot, QuestionCount, ScoreBucket, ScoreHistogram, SentimentDistribution,
    SentimentPercentages, SeriesPoint,
};
pub use transcript::{TranscriptDetail, TranscriptPage, TranscriptSummary};
