//! emotion-cli — command-line client for the Emotion frame analysis API
//!
//! Plays the part of the webcam client: starts a session, submits image
//! files as frames and prints the emotion reading.
//!
//! # Subcommands
//! - `start [--device <json>] [--consent <json>]` — start a session, print its id
//! - `analyze --session <id> <image>... [--json]` — analyse one or more image files
//! - `status`                                      — show server health

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const API_PREFIX: &str = "/api/v1";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "emotion-cli",
    version,
    about = "Emotion frame analysis — command-line client"
)]
struct Cli {
    /// Emotion HTTP server URL (overrides EMOTION_HTTP_URL env var)
    #[arg(long, env = "EMOTION_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start a new analysis session
    Start {
        /// Device information as a JSON object
        #[arg(long, default_value = "{}")]
        device: String,

        /// Consent flags as a JSON object
        #[arg(long, default_value = "{}")]
        consent: String,
    },

    /// Submit image files as frames for a session
    Analyze {
        /// Session id returned by `start`
        #[arg(short, long)]
        session: String,

        /// Image files to analyse, in order
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Print raw JSON responses
        #[arg(long)]
        json: bool,
    },

    /// Show Emotion server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFrameResponse {
    pub status: String,
    pub received_at: i64,
    pub dominant: Option<String>,
    pub intensity: Option<f64>,
    pub scores: Option<BTreeMap<String, f64>>,
}

// ============================================================================
// Payload helpers
// ============================================================================

/// Guess the image media type from the file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// Encode raw image bytes as a `data:<mime>;base64,` URL.
pub fn frame_payload(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, BASE64_STANDARD.encode(bytes))
}

/// One-line human summary of a reading.
pub fn format_reading(label: &str, resp: &AnalyzeFrameResponse) -> String {
    let dominant = resp.dominant.as_deref().unwrap_or("-");
    let intensity = resp
        .intensity
        .map(|i| format!("{:.0}%", i * 100.0))
        .unwrap_or_else(|| "-".to_string());

    let mut line = format!("{label}: {dominant} ({intensity})");
    if let Some(scores) = &resp.scores {
        let mut ranked: Vec<(&String, &f64)> = scores.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(a.1));
        let top: Vec<String> = ranked
            .iter()
            .take(3)
            .map(|(k, v)| format!("{k}={v:.2}"))
            .collect();
        line.push_str(&format!("  [{}]", top.join(", ")));
    }
    line
}

fn parse_object(raw: &str, what: &str) -> anyhow::Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("--{} is not valid JSON: {}", what, e))?;
    if !value.is_object() {
        anyhow::bail!("--{} must be a JSON object", what);
    }
    Ok(value)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn do_start(server: &str, device: &str, consent: &str) -> anyhow::Result<()> {
    let body = serde_json::json!({
        "deviceInfo": parse_object(device, "device")?,
        "consent": parse_object(consent, "consent")?,
    });

    let url = format!("{}{}/session/start", server, API_PREFIX);
    let resp = client(10)?.post(&url).json(&body).send()?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        anyhow::bail!("server returned {}: {}", status, body);
    }

    let session: StartSessionResponse = resp.json()?;
    println!("{}", session.session_id);
    Ok(())
}

fn do_analyze(server: &str, session: &str, images: &[PathBuf], json_output: bool) -> anyhow::Result<()> {
    let http = client(30)?;
    let url = format!("{}{}/analyze/frame", server, API_PREFIX);

    for path in images {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;

        let body = serde_json::json!({
            "sessionId": session,
            "timestampMs": chrono::Utc::now().timestamp_millis(),
            "frameBase64": frame_payload(&bytes, mime_for_path(path)),
        });

        let resp = http.post(&url).json(&body).send()?;
        let status = resp.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!("session {} not found — start a new one with `emotion-cli start`", session);
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            anyhow::bail!("server returned {}: {}", status, body);
        }

        if json_output {
            let value: serde_json::Value = resp.json()?;
            println!("{}", serde_json::to_string(&value)?);
        } else {
            let reading: AnalyzeFrameResponse = resp.json()?;
            println!("{}", format_reading(&path.display().to_string(), &reading));
        }
    }

    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client(10)?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Emotion server:  {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("SQLite:          {}", body["sqlite"].as_str().unwrap_or("?"));
            println!("Inference:       {}", body["inference"].as_str().unwrap_or("?"));
            println!("Active sessions: {}", body["active_sessions"]);
        }
        Ok(r) => {
            anyhow::bail!("server unhealthy (HTTP {})", r.status());
        }
        Err(e) => {
            anyhow::bail!("cannot reach {} — {}", url, e);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Start { device, consent } => do_start(&server, &device, &consent),
        Commands::Analyze { session, images, json } => do_analyze(&server, &session, &images, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("emotion-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
