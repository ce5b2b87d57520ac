use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream timed out after {seconds}s")]
    UpstreamTimeout { seconds: u64 },

    #[error("Upstream sent a malformed response: {0}")]
    UpstreamMalformed(String),

    #[error("Upstream rejected request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("Missing upstream API key")]
    MissingApiKey,

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PulseError {
    /// Whether an upstream read that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PulseError::UpstreamUnavailable(_) | PulseError::UpstreamTimeout { .. }
        )
    }

    /// Short machine-readable tag used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PulseError::InvalidRange(_) => "invalid_range",
            PulseError::InvalidParameter(_) => "invalid_parameter",
            PulseError::NotFound(_) => "not_found",
            PulseError::UnsupportedFormat(_) => "unsupported_format",
            PulseError::UpstreamUnavailable(_) => "upstream_unavailable",
            PulseError::UpstreamTimeout { .. } => "upstream_timeout",
            PulseError::UpstreamRejected { .. } => "upstream_rejected",
            PulseError::UpstreamMalformed(_) => "upstream_malformed",
            PulseError::MissingApiKey | PulseError::Config(_) => "config",
            PulseError::Io(_) | PulseError::Json(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, PulseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_errors_are_retryable() {
        assert!(PulseError::UpstreamUnavailable("503".into()).is_retryable());
        assert!(PulseError::UpstreamTimeout { seconds: 30 }.is_retryable());
        assert!(!PulseError::NotFound("tr_1".into()).is_retryable());
        assert!(!PulseError::UpstreamRejected { status: 401, message: "bad key".into() }.is_retryable());
        assert!(!PulseError::InvalidRange("start >= end".into()).is_retryable());
        assert!(!PulseError::UpstreamMalformed("expected value".into()).is_retryable());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(PulseError::InvalidRange("x".into()).kind(), "invalid_range");
        assert_eq!(PulseError::UpstreamTimeout { seconds: 1 }.kind(), "upstream_timeout");
        assert_eq!(PulseError::UnsupportedFormat("pdf".into()).kind(), "unsupported_format");
    }
}
