//! HTTP client for the chatbot platform's transcript API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::UpstreamConfig;
use crate::error::{PulseError, Result};
use crate::models::ConversationRecord;
use crate::period::DateRange;
use crate::upstream::{ConversationSource, WirePage, WireTranscript};

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    limit: u32,
    filter: ListFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFilter {
    start_time: String,
    end_time: String,
}

/// Platform client. Every call carries the configured timeout; idempotent
/// reads are retried with exponential backoff on timeouts, connection
/// failures, 429 and 5xx.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: Client,
    config: UpstreamConfig,
    api_key: String,
    base_url: Url,
}

impl PlatformClient {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let base_url = config.base_url.clone();
        Self::with_base_url(config, base_url)
    }

    /// Create a client with a custom base URL (for testing / staging)
    pub fn with_base_url(config: UpstreamConfig, base_url: String) -> Result<Self> {
        let api_key = config.resolved_api_key().ok_or(PulseError::MissingApiKey)?;

        let base_url = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                PulseError::Config(config::ConfigError::Message(format!(
                    "invalid upstream base_url '{}'",
                    base_url
                )))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PulseError::UpstreamUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            api_key,
            base_url,
        })
    }

    /// `{base_url}/v1/transcript/{segments..}` with every segment percent-encoded.
    /// Identifiers that could step outside the transcript API are refused.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == ".." || s.contains(&['/', '\\'][..]))
        {
            return Err(PulseError::InvalidParameter(format!(
                "invalid identifier '{}'",
                bad
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PulseError::InvalidParameter("upstream base_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["v1", "transcript"])
            .extend(segments);
        Ok(url)
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.config.retry_delay_ms.max(1))
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries)
    }

    async fn list_page(
        &self,
        project_id: &str,
        range: &DateRange,
        cursor: Option<&str>,
    ) -> Result<WirePage> {
        let url = self.endpoint(&["project", project_id])?;
        let request = ListRequest {
            limit: self.config.page_size,
            filter: ListFilter {
                start_time: range.start().to_rfc3339_opts(SecondsFormat::Millis, true),
                end_time: range.end().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            cursor,
        };

        let response = self
            .client
            .post(url)
            .header("Authorization", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let response = self
            .check_status(response, || format!("project {}", project_id))
            .await?;
        response.json().await.map_err(|e| self.transport_error(e))
    }

    async fn fetch_transcript(&self, transcript_id: &str) -> Result<WireTranscript> {
        let url = self.endpoint(&[transcript_id])?;

        let response = self
            .client
            .get(url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let response = self
            .check_status(response, || format!("transcript {}", transcript_id))
            .await?;
        response.json().await.map_err(|e| self.transport_error(e))
    }

    async fn check_status(
        &self,
        response: Response,
        subject: impl FnOnce() -> String,
    ) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %body, "Upstream returned error status");

        if status == StatusCode::NOT_FOUND {
            return Err(PulseError::NotFound(subject()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PulseError::UpstreamUnavailable(format!("{} {}", status, body)));
        }
        Err(PulseError::UpstreamRejected {
            status: status.as_u16(),
            message: body,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> PulseError {
        if err.is_timeout() {
            PulseError::UpstreamTimeout {
                seconds: self.config.timeout_seconds,
            }
        } else if err.is_decode() {
            PulseError::UpstreamMalformed(err.to_string())
        } else {
            PulseError::UpstreamUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl ConversationSource for PlatformClient {
    async fn list_conversations(
        &self,
        project_id: &str,
        range: &DateRange,
    ) -> Result<Vec<ConversationRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..self.config.max_pages {
            let current = cursor.take();
            let wire = RetryIf::spawn(
                self.retry_strategy(),
                || self.list_page(project_id, range, current.as_deref()),
                |e: &PulseError| e.is_retryable(),
            )
            .await
            .map_err(|e| {
                tracing::error!(project_id, page, error = %e, "Transcript page fetch failed");
                e
            })?;

            let fetched = wire.items.len();
            records.extend(wire.items.into_iter().map(|w| w.into_record(project_id)));

            match wire.cursor.filter(|c| !c.is_empty()) {
                Some(next) if fetched > 0 => cursor = Some(next),
                _ => {
                    tracing::debug!(project_id, pages = page + 1, records = records.len(), "Fetched transcripts");
                    return Ok(records);
                }
            }
        }

        Err(PulseError::UpstreamUnavailable(format!(
            "transcript listing exceeded {} pages",
            self.config.max_pages
        )))
    }

    async fn get_conversation(&self, transcript_id: &str) -> Result<ConversationRecord> {
        let wire = RetryIf::spawn(
            self.retry_strategy(),
            || self.fetch_transcript(transcript_id),
            |e: &PulseError| e.is_retryable(),
        )
        .await?;
        let fallback = wire.project_id.clone().unwrap_or_default();
        Ok(wire.into_record(&fallback))
    }

    fn name(&self) -> &str {
        "platform"
    }
}

// ============================================================================
// TESTS
// ============================================================================
