//! Pulse HTTP REST API
//!
//! Axum-based HTTP server exposing the analytics queries as read-only JSON
//! endpoints (plus a CSV export).
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints (all GET):
//! - /health                : liveness plus active source
//! - /version               : server version info
//! - /api/metrics/overview  : KPI snapshot for one period
//! - /api/metrics/compare   : current vs previous period
//! - /api/metrics/peaks     : interaction series, weekday/hour heatmap
//! - /api/metrics/scores    : chat score histogram
//! - /api/topics/intents    : ranked intents
//! - /api/topics/gaps       : content gap recommendations
//! - /api/transcripts/list  : paginated transcript summaries
//! - /api/transcripts/:id   : one transcript with logs
//! - /api/export            : CSV report download

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use pulse_core::period;
use pulse_core::{Clock, ConversationSource, DateRange, PeriodQuery, PulseConfig, PulseError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::subsystems::aggregate::{self, AggregateOptions};
use crate::subsystems::export::{self, ExportFile, ExportFormat, ExportReport};
use crate::subsystems::gaps::{self, GapThresholds};
use crate::subsystems::transcripts::{self, TranscriptQuery};
use crate::subsystems::{compare, peaks};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub source: Arc<dyn ConversationSource>,
    pub config: PulseConfig,
    pub clock: Arc<dyn Clock>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/metrics/overview", get(overview_handler))
        .route("/api/metrics/compare", get(compare_handler))
        .route("/api/metrics/peaks", get(peaks_handler))
        .route("/api/metrics/scores", get(scores_handler))
        .route("/api/topics/intents", get(intents_handler))
        .route("/api/topics/gaps", get(gaps_handler))
        .route("/api/transcripts/list", get(transcripts_list_handler))
        .route("/api/transcripts/:id", get(transcript_detail_handler))
        .route("/api/export", get(export_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    source: Arc<dyn ConversationSource>,
    config: PulseConfig,
    clock: Arc<dyn Clock>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState {
        source,
        config,
        clock,
    });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Pulse HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// Query string accepted by every analytics route. Numeric fields arrive as
/// text so that malformed values surface as `invalid_parameter` errors.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsParams {
    pub project_id: Option<String>,
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub search: Option<String>,
    pub max_score: Option<String>,
    pub top: Option<String>,
    pub format: Option<String>,
}

impl AnalyticsParams {
    pub fn period(&self) -> PeriodQuery {
        PeriodQuery {
            range: self.range.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
        }
    }

    fn project_id(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
            kind: kind.into(),
        }
    }
}

impl From<&PulseError> for ErrorResponse {
    fn from(err: &PulseError) -> Self {
        Self::new(err.to_string(), err.kind())
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: reports the active conversation source.
pub fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "source": state.source.name(),
        }),
    )
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "pulse/1",
    })
}

pub async fn overview_inner(
    state: &HttpState,
    params: AnalyticsParams,
) -> (StatusCode, serde_json::Value) {
    let result: pulse_core::Result<_> = async {
        let (project_id, range) = scope(state, &params)?;
        let options = AggregateOptions::from_config(&state.config.query);
        aggregate::aggregate_period(state.source.as_ref(), &project_id, &range, &options).await
    }
    .await;
    respond(result)
}

pub async fn compare_inner(
    state: &HttpState,
    params: AnalyticsParams,
) -> (StatusCode, serde_json::Value) {
    let result: pulse_core::Result<_> = async {
        let (project_id, range) = scope(state, &params)?;
        let options = AggregateOptions::from_config(&state.config.query);
        compare::compare_periods(state.source.as_ref(), &project_id, &range, &options).await
    }
    .await;
    respond(result)
}

pub async fn peaks_inner(
    state: &HttpState,
    params: AnalyticsParams,
) -> (StatusCode, serde_json::Value) {
    let result: pulse_core::Result<_> = async {
        let (project_id, range) = scope(state, &params)?;
        let top = parse_count("top", params.top.as_deref())?.unwrap_or(state.config.query.peak_slots);
        peaks::usage_peaks(state.source.as_ref(), &project_id, &range, top).await
    }
    .await;
    respond(result)
}

pub async fn scores_inner(
    state: &HttpState,
    params: AnalyticsParams,
) -> (StatusCode, serde_json::Value) {
    let result: pulse_core::Result<_> = async {
        let (project_id, range) = scope(state, &params)?;
        aggregate::score_distribution(state.source.as_ref(), &project_id, &range).await
    }
    .await;
    respond(result)
}

pub async fn intents_inner(
    state: &HttpState,
    params: AnalyticsParams,
) -> (StatusCode, serde_json::Value) {
    let result: pulse_core::Result<serde_json::Value> = async {
        let (project_id, range) = scope(state, &params)?;
        let options = AggregateOptions::from_config(&state.config.query)
            .with_intent_limit(parse_count("limit", params.limit.as_deref())?)?;
        let intents = aggregate::intent_ranking(
            state.source.as_ref(),
            &project_id,
            &range,
            options.intent_limit,
        )
        .await?;
        Ok(serde_json::json!({ "intents": intents }))
    }
    .await;
    respond(result)
}

pub async fn gaps_inner(
    state: &HttpState,
    params: AnalyticsParams,
) -> (StatusCode, serde_json::Value) {
    let result: pulse_core::Result<serde_json::Value> = async {
        let (project_id, range) = scope(state, &params)?;
        let thresholds = GapThresholds::from_config(&state.config.query);
        let recommendations =
            gaps::find_gaps(state.source.as_ref(), &project_id, &range, &thresholds).await?;
        Ok(serde_json::json!({ "recommendations": recommendations }))
    }
    .await;
    respond(result)
}

pub async fn transcripts_list_inner(
    state: &HttpState,
    params: AnalyticsParams,
) -> (StatusCode, serde_json::Value) {
    let result: pulse_core::Result<_> = async {
        let (project_id, range) = scope(state, &params)?;
        let mut query = TranscriptQuery::new(project_id, range);
        query.search = params.search.clone();
        query.limit = parse_count("limit", params.limit.as_deref())?
            .unwrap_or(state.config.query.default_page_size);
        query.offset = parse_count("offset", params.offset.as_deref())?.unwrap_or(0);
        query.max_score = parse_score("maxScore", params.max_score.as_deref())?;
        transcripts::list(state.source.as_ref(), &query, state.config.query.max_page_size).await
    }
    .await;
    respond(result)
}

pub async fn transcript_detail_inner(
    state: &HttpState,
    transcript_id: &str,
    params: AnalyticsParams,
) -> (StatusCode, serde_json::Value) {
    let result =
        transcripts::get(state.source.as_ref(), transcript_id, params.project_id()).await;
    respond(result)
}

/// Inner export: validates the format before touching the upstream, then
/// renders the current-vs-previous report.
pub async fn export_inner(
    state: &HttpState,
    params: AnalyticsParams,
) -> std::result::Result<ExportFile, (StatusCode, serde_json::Value)> {
    let result: pulse_core::Result<ExportFile> = async {
        let format = match params.format.as_deref() {
            Some(raw) => raw.parse::<ExportFormat>()?,
            None => ExportFormat::Csv,
        };
        if format != ExportFormat::Csv {
            return Err(PulseError::UnsupportedFormat(format!(
                "{} export is not available",
                format
            )));
        }
        let (project_id, range) = scope(state, &params)?;
        let options = AggregateOptions::from_config(&state.config.query);
        let comparison =
            compare::compare_periods(state.source.as_ref(), &project_id, &range, &options).await?;
        let report = ExportReport::from_comparison(&comparison);
        export::render(&report, format, state.clock.now().date_naive())
    }
    .await;

    result.map_err(|e| error_body(&e))
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn overview_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    let (status, body) = overview_inner(&state, params).await;
    (status, Json(body))
}

pub async fn compare_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    let (status, body) = compare_inner(&state, params).await;
    (status, Json(body))
}

pub async fn peaks_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    let (status, body) = peaks_inner(&state, params).await;
    (status, Json(body))
}

pub async fn scores_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    let (status, body) = scores_inner(&state, params).await;
    (status, Json(body))
}

pub async fn intents_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    let (status, body) = intents_inner(&state, params).await;
    (status, Json(body))
}

pub async fn gaps_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    let (status, body) = gaps_inner(&state, params).await;
    (status, Json(body))
}

pub async fn transcripts_list_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    let (status, body) = transcripts_list_inner(&state, params).await;
    (status, Json(body))
}

pub async fn transcript_detail_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    let (status, body) = transcript_detail_inner(&state, &id, params).await;
    (status, Json(body))
}

pub async fn export_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AnalyticsParams>,
) -> Response {
    match export_inner(&state, params).await {
        Ok(file) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, file.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", file.filename),
                ),
            ],
            file.body,
        )
            .into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// HTTP status for each error kind.
pub fn error_status(err: &PulseError) -> StatusCode {
    match err {
        PulseError::InvalidRange(_) | PulseError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        PulseError::NotFound(_) => StatusCode::NOT_FOUND,
        PulseError::UnsupportedFormat(_) => StatusCode::NOT_IMPLEMENTED,
        PulseError::UpstreamUnavailable(_)
        | PulseError::UpstreamRejected { .. }
        | PulseError::UpstreamMalformed(_) => StatusCode::BAD_GATEWAY,
        PulseError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PulseError::MissingApiKey
        | PulseError::Config(_)
        | PulseError::Io(_)
        | PulseError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_body(err: &PulseError) -> (StatusCode, serde_json::Value) {
    let status = error_status(err);
    if status.is_server_error() {
        tracing::error!(kind = err.kind(), error = %err, "Request failed");
    } else {
        tracing::debug!(kind = err.kind(), error = %err, "Request rejected");
    }
    let body = serde_json::to_value(ErrorResponse::from(err))
        .unwrap_or_else(|_| serde_json::json!({ "error": err.to_string(), "status": "error" }));
    (status, body)
}

/// Convert a subsystem result into an HTTP status and JSON body.
pub fn respond<T: Serialize>(result: pulse_core::Result<T>) -> (StatusCode, serde_json::Value) {
    match result.and_then(|v| serde_json::to_value(v).map_err(PulseError::from)) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => error_body(&e),
    }
}

/// Validate `projectId` and resolve the period. Runs before any upstream call.
fn scope(state: &HttpState, params: &AnalyticsParams) -> pulse_core::Result<(String, DateRange)> {
    let project_id = params
        .project_id()
        .ok_or_else(|| PulseError::InvalidParameter("projectId is required".to_string()))?
        .to_string();
    let range = period::resolve(
        &params.period(),
        state.clock.now(),
        state.config.query.max_range_days,
    )?;
    Ok((project_id, range))
}

fn parse_count(name: &str, raw: Option<&str>) -> pulse_core::Result<Option<usize>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
            PulseError::InvalidParameter(format!(
                "{} must be a non-negative integer, got '{}'",
                name, raw
            ))
        }),
        None => Ok(None),
    }
}

fn parse_score(name: &str, raw: Option<&str>) -> pulse_core::Result<Option<f64>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| PulseError::InvalidParameter(format!("{} must be a number, got '{}'", name, raw))),
        None => Ok(None),
    }
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
