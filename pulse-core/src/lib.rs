pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod period;
pub mod upstream;

pub use cache::{CacheKey, CachedSource, TtlCache};
pub use config::PulseConfig;
pub use error::{PulseError, Result};
pub use period::{Clock, DateRange, FixedClock, Granularity, PeriodQuery, RangePreset, SystemClock};
pub use upstream::{ConversationSource, FixtureSource, PlatformClient};
