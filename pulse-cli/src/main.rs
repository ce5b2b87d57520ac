//! pulse-cli: terminal client for the Pulse analytics HTTP API
//!
//! # Subcommands
//! - `overview -p <project> [--range <preset> | --start <d> --end <d>] [--json]`
//! - `compare  -p <project> [...] [--json]`    : current vs previous period
//! - `transcripts -p <project> [...] [--search <s>] [-n <limit>] [--offset <n>] [--max-score <x>]`
//! - `export -p <project> [...] [-o <file>]`   : download the CSV report
//! - `status`                                   : show server health

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_RANGE: &str = "last-7-days";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "pulse-cli",
    version,
    about = "Pulse chatbot analytics: KPIs, comparisons and transcripts from the terminal"
)]
struct Cli {
    /// Pulse HTTP server URL (overrides PULSE_HTTP_URL env var)
    #[arg(long, env = "PULSE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Args)]
struct PeriodArgs {
    /// Chatbot project id
    #[arg(short, long)]
    project: String,

    /// Range preset: last-7-days, last-30-days, last-90-days
    #[arg(short, long)]
    range: Option<String>,

    /// Explicit start (YYYY-MM-DD or RFC 3339), used with --end
    #[arg(long, requires = "end")]
    start: Option<String>,

    /// Explicit exclusive end, used with --start
    #[arg(long, requires = "start")]
    end: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// KPI snapshot for one period
    Overview {
        #[command(flatten)]
        period: PeriodArgs,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Compare a period with the one before it
    Compare {
        #[command(flatten)]
        period: PeriodArgs,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List transcripts, newest first
    Transcripts {
        #[command(flatten)]
        period: PeriodArgs,

        /// Case-insensitive match on transcript or user id
        #[arg(long)]
        search: Option<String>,

        /// Page size
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Items to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Only transcripts scored at or below this value
        #[arg(long)]
        max_score: Option<f64>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Download the CSV report
    Export {
        #[command(flatten)]
        period: PeriodArgs,

        /// Output file (defaults to the server-suggested name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show Pulse server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptItem {
    pub id: String,
    pub start_time: String,
    pub user_id: String,
    pub duration_seconds: u64,
    pub score: Option<f64>,
    pub sentiment: Option<String>,
    pub intent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptPage {
    pub items: Vec<TranscriptItem>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

// ============================================================================
// Formatting
// ============================================================================

/// Query pairs for the period flags. A preset wins; with neither a preset
/// nor explicit bounds the default preset is sent.
pub fn period_params(
    project: &str,
    range: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![("projectId", project.to_string())];
    match (range, start, end) {
        (Some(range), _, _) => params.push(("range", range.to_string())),
        (None, Some(start), Some(end)) => {
            params.push(("start", start.to_string()));
            params.push(("end", end.to_string()));
        }
        _ => params.push(("range", DEFAULT_RANGE.to_string())),
    }
    params
}

/// `+12.4%` / `-3.0%`, `n/a` for a null percentage.
pub fn signed_percent(value: &serde_json::Value) -> String {
    match value.as_f64() {
        Some(p) => {
            let rounded = (p * 10.0).round() / 10.0;
            let rounded = if rounded == 0.0 { 0.0 } else { rounded };
            format!("{:+.1}%", rounded)
        }
        None => "n/a".to_string(),
    }
}

fn optional_number(value: &serde_json::Value, suffix: &str) -> String {
    value
        .as_f64()
        .map(|v| format!("{:.1}{}", v, suffix))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn format_overview(body: &serde_json::Value) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "Period:        {} .. {}",
        body["range"]["start"].as_str().unwrap_or("?"),
        body["range"]["end"].as_str().unwrap_or("?")
    ));
    out.push(format!("Conversations: {}", body["conversations"]));
    out.push(format!("Unique users:  {}", body["uniqueUsers"]));
    out.push(format!("Avg score:     {}", optional_number(&body["avgChatScore"], "")));
    out.push(format!(
        "Positive:      {}",
        optional_number(&body["sentimentPercentages"]["pos"], "%")
    ));

    if let Some(intents) = body["topIntents"].as_array().filter(|i| !i.is_empty()) {
        out.push(String::new());
        out.push("Top intents:".to_string());
        for intent in intents.iter().take(5) {
            out.push(format!(
                "  {:<30} {:>6}",
                intent["name"].as_str().unwrap_or("?"),
                intent["count"]
            ));
        }
    }
    out.join("\n")
}

pub fn format_comparison(body: &serde_json::Value) -> String {
    let changes = &body["changes"];
    let rows = [
        ("Conversations", "conversations", "conversations"),
        ("Unique users", "uniqueUsers", "uniqueUsers"),
        ("Avg score", "avgChatScore", "avgChatScore"),
    ];

    let mut out = vec![format!(
        "{:<15} {:>10} {:>10} {:>9}",
        "Metric", "Current", "Previous", "Change"
    )];
    for (label, field, change) in rows {
        out.push(format!(
            "{:<15} {:>10} {:>10} {:>9}",
            label,
            display_value(&body["current"][field]),
            display_value(&body["previous"][field]),
            signed_percent(&changes[change]["percentage"])
        ));
    }
    out.push(format!(
        "{:<15} {:>10} {:>10} {:>9}",
        "Positive",
        optional_number(&body["current"]["sentimentPercentages"]["pos"], "%"),
        optional_number(&body["previous"]["sentimentPercentages"]["pos"], "%"),
        signed_percent(&changes["positiveSentiment"]["percentage"])
    ));
    out.join("\n")
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "n/a".to_string(),
        serde_json::Value::Number(n) if n.is_f64() => optional_number(value, ""),
        other => other.to_string(),
    }
}

pub fn format_transcripts(page: &TranscriptPage) -> String {
    if page.items.is_empty() {
        return format!("No transcripts (total {})", page.total);
    }
    let mut out = Vec::new();
    for t in &page.items {
        out.push(format!(
            "{}  {}  user={}  {}s  score={}  {}  {}",
            t.start_time,
            t.id,
            t.user_id,
            t.duration_seconds,
            t.score.map(|s| format!("{:.1}", s)).unwrap_or_else(|| "-".to_string()),
            t.sentiment.as_deref().unwrap_or("-"),
            t.intent.as_deref().unwrap_or("-"),
        ));
    }
    out.push(format!(
        "Showing {}-{} of {}",
        page.offset + 1,
        page.offset + page.items.len(),
        page.total
    ));
    out.join("\n")
}

/// Extract the filename from a `Content-Disposition: attachment; filename="..."` value.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty() && !name.contains(['/', '\\']))
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Turn a non-2xx response into an error carrying the server's message.
fn check(resp: reqwest::blocking::Response) -> anyhow::Result<reqwest::blocking::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    let message = body["error"].as_str().unwrap_or("no error message");
    bail!("server returned {}: {}", status, message)
}

fn get_json(
    server: &str,
    path: &str,
    params: &[(&str, String)],
) -> anyhow::Result<serde_json::Value> {
    let url = format!("{}{}", server, path);
    let resp = client(60)?
        .get(&url)
        .query(params)
        .send()
        .with_context(|| format!("connection failed to {}", url))?;
    Ok(check(resp)?.json()?)
}

fn print_json(body: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(body)?);
    Ok(())
}

fn params_for(period: &PeriodArgs) -> Vec<(&'static str, String)> {
    period_params(
        &period.project,
        period.range.as_deref(),
        period.start.as_deref(),
        period.end.as_deref(),
    )
}

fn do_overview(server: &str, period: &PeriodArgs, json: bool) -> anyhow::Result<()> {
    let body = get_json(server, "/api/metrics/overview", &params_for(period))?;
    if json {
        return print_json(&body);
    }
    println!("{}", format_overview(&body));
    Ok(())
}

fn do_compare(server: &str, period: &PeriodArgs, json: bool) -> anyhow::Result<()> {
    let body = get_json(server, "/api/metrics/compare", &params_for(period))?;
    if json {
        return print_json(&body);
    }
    println!("{}", format_comparison(&body));
    Ok(())
}

fn do_transcripts(
    server: &str,
    period: &PeriodArgs,
    search: Option<String>,
    limit: usize,
    offset: usize,
    max_score: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let mut params = params_for(period);
    params.push(("limit", limit.to_string()));
    params.push(("offset", offset.to_string()));
    if let Some(search) = search {
        params.push(("search", search));
    }
    if let Some(max_score) = max_score {
        params.push(("maxScore", max_score.to_string()));
    }

    let body = get_json(server, "/api/transcripts/list", &params)?;
    if json {
        return print_json(&body);
    }
    let page: TranscriptPage =
        serde_json::from_value(body).context("failed to parse transcript page")?;
    println!("{}", format_transcripts(&page));
    Ok(())
}

fn do_export(server: &str, period: &PeriodArgs, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut params = params_for(period);
    params.push(("format", "csv".to_string()));

    let url = format!("{}/api/export", server);
    let resp = client(120)?
        .get(&url)
        .query(&params)
        .send()
        .with_context(|| format!("connection failed to {}", url))?;
    let resp = check(resp)?;

    let suggested = resp
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition);
    let path = output
        .or_else(|| suggested.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("chat-analytics.csv"));

    let body = resp.text()?;
    std::fs::write(&path, body).with_context(|| format!("cannot write {}", path.display()))?;
    println!("Report written to {}", path.display());
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client(10)?
        .get(&url)
        .send()
        .with_context(|| format!("cannot reach {}", url))?;

    if !resp.status().is_success() {
        bail!("server unhealthy (HTTP {})", resp.status());
    }
    let body: serde_json::Value = resp.json().unwrap_or_default();
    println!("Pulse server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
    println!("Source:       {}", body["source"].as_str().unwrap_or("?"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Overview { period, json } => do_overview(&server, &period, json),
        Commands::Compare { period, json } => do_compare(&server, &period, json),
        Commands::Transcripts {
            period,
            search,
            limit,
            offset,
            max_score,
            json,
        } => do_transcripts(&server, &period, search, limit, offset, max_score, json),
        Commands::Export { period, output } => do_export(&server, &period, output),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("pulse-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ========================================================================
    // TEST 1: preset wins over explicit bounds
    // ========================================================================
    #[test]
    fn test_period_params_preset_wins() {
        let params = period_params("p1", Some("last-30-days"), Some("2025-02-01"), Some("2025-02-08"));
        assert_eq!(
            params,
            vec![("projectId", "p1".to_string()), ("range", "last-30-days".to_string())]
        );
    }

    // ========================================================================
    // TEST 2: explicit bounds pass through, otherwise default preset
    // ========================================================================
    #[test]
    fn test_period_params_explicit_and_default() {
        let params = period_params("p1", None, Some("2025-02-01"), Some("2025-02-08"));
        assert_eq!(params[1], ("start", "2025-02-01".to_string()));
        assert_eq!(params[2], ("end", "2025-02-08".to_string()));

        let params = period_params("p1", None, None, None);
        assert_eq!(params[1], ("range", DEFAULT_RANGE.to_string()));
    }

    // ========================================================================
    // TEST 3: signed_percent: sign, rounding, null
    // ========================================================================
    #[test]
    fn test_signed_percent() {
        assert_eq!(signed_percent(&json!(25.0)), "+25.0%");
        assert_eq!(signed_percent(&json!(-3.04)), "-3.0%");
        assert_eq!(signed_percent(&json!(0)), "+0.0%");
        assert_eq!(signed_percent(&serde_json::Value::Null), "n/a");
    }

    // ========================================================================
    // TEST 4: overview output includes KPIs and n/a for null averages
    // ========================================================================
    #[test]
    fn test_format_overview() {
        let body = json!({
            "range": {"start": "2025-02-01T00:00:00Z", "end": "2025-02-08T00:00:00Z"},
            "conversations": 100,
            "uniqueUsers": 40,
            "avgChatScore": null,
            "sentimentPercentages": null,
            "topIntents": [{"name": "Pricing", "count": 34, "share": 34.0}]
        });
        let text = format_overview(&body);
        assert!(text.contains("Conversations: 100"));
        assert!(text.contains("Avg score:     n/a"));
        assert!(text.contains("Pricing"));
    }

    // ========================================================================
    // TEST 5: comparison table shows changes
    // ========================================================================
    #[test]
    fn test_format_comparison() {
        let body = json!({
            "current": {"conversations": 100, "uniqueUsers": 40, "avgChatScore": 4.5},
            "previous": {"conversations": 80, "uniqueUsers": 20, "avgChatScore": null},
            "changes": {
                "conversations": {"absolute": 20.0, "percentage": 25.0},
                "uniqueUsers": {"absolute": 20.0, "percentage": 100.0},
                "avgChatScore": {"absolute": null, "percentage": null},
                "positiveSentiment": {"absolute": null, "percentage": null}
            }
        });
        let text = format_comparison(&body);
        let conversations = text.lines().nth(1).unwrap();
        assert!(conversations.starts_with("Conversations"));
        assert!(conversations.contains("+25.0%"));
        assert!(text.lines().nth(3).unwrap().contains("4.5"));
        assert!(text.lines().nth(3).unwrap().contains("n/a"));
    }

    // ========================================================================
    // TEST 6: transcript page rendering
    // ========================================================================
    #[test]
    fn test_format_transcripts() {
        let page: TranscriptPage = serde_json::from_value(json!({
            "items": [{
                "id": "tr_1", "startTime": "2025-02-07T10:00:00Z", "userId": "u1",
                "durationSeconds": 95, "score": 2.0, "sentiment": "negative", "intent": null
            }],
            "total": 41, "limit": 20, "offset": 20
        }))
        .unwrap();
        let text = format_transcripts(&page);
        assert!(text.contains("tr_1"));
        assert!(text.contains("score=2.0"));
        assert!(text.ends_with("Showing 21-21 of 41"));

        let empty = TranscriptPage { items: Vec::new(), total: 0, limit: 20, offset: 0 };
        assert_eq!(format_transcripts(&empty), "No transcripts (total 0)");
    }

    // ========================================================================
    // TEST 7: filename extraction from Content-Disposition
    // ========================================================================
    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"chat-analytics-2025-02-07.csv\""),
            Some("chat-analytics-2025-02-07.csv".to_string())
        );
        assert_eq!(filename_from_disposition("attachment"), None);
        assert_eq!(filename_from_disposition("attachment; filename=\"../etc/passwd\""), None);
    }
}
