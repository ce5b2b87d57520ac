use std::sync::Arc;

use pulse_core::{CachedSource, ConversationSource, FixtureSource, PlatformClient, PulseConfig, Result};

/// Project assigned to fixture transcripts that carry no `projectID`.
pub const FIXTURE_DEFAULT_PROJECT: &str = "default";

/// Build the conversation source selected by config: the fixture file when
/// `upstream.fixture_path` is set, the platform API otherwise. Wrapped in the
/// TTL cache unless caching is disabled.
pub fn create_source_from_config(config: &PulseConfig) -> Result<Arc<dyn ConversationSource>> {
    let base: Arc<dyn ConversationSource> = match &config.upstream.fixture_path {
        Some(path) => Arc::new(FixtureSource::load(path, FIXTURE_DEFAULT_PROJECT)?),
        None => Arc::new(PlatformClient::new(config.upstream.clone())?),
    };

    if !config.cache.enabled {
        tracing::info!(source = base.name(), "Conversation source ready (cache disabled)");
        return Ok(base);
    }

    tracing::info!(
        source = base.name(),
        ttl_seconds = config.cache.ttl_seconds,
        max_entries = config.cache.max_entries,
        "Conversation source ready"
    );
    Ok(Arc::new(CachedSource::new(base, &config.cache)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::PulseError;

    #[test]
    fn test_fixture_path_selects_fixture_source() {
        let path = std::env::temp_dir().join(format!("pulse-source-{}.json", std::process::id()));
        std::fs::write(&path, "[]").unwrap();

        let mut config = PulseConfig::default();
        config.upstream.fixture_path = Some(path.display().to_string());
        config.cache.enabled = false;
        let source = create_source_from_config(&config).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(source.name(), "fixture");
    }

    #[test]
    fn test_missing_fixture_file_is_io_error() {
        let mut config = PulseConfig::default();
        config.upstream.fixture_path = Some("/nonexistent/pulse/fixture.json".to_string());
        let err = create_source_from_config(&config).err().unwrap();
        assert!(matches!(err, PulseError::Io(_)));
    }
}
