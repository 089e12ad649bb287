//! Append-only analytics and interaction sinks.
//!
//! Two sinks with deliberately different privacy postures:
//! - [`AnalyticsLog`] records aggregate counters (emotion, harassment
//!   flag/score, latency) and **never** the message text.
//! - [`InteractionLog`] records one line per request **including the raw
//!   message text**, by explicit design choice.
//! Both asymmetries are intentional and must be preserved together.
//!
//! Every write error is logged and swallowed; sink failures never affect the
//! response.

use crate::classify::SeverityTier;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Rounds a confidence score to 3 decimal places for reporting. Widens to
/// f64 first so the rounded value serializes exactly.
pub(crate) fn round3(value: f32) -> f64 {
    ((value as f64) * 1000.0).round() / 1000.0
}

/// Rounds a latency in milliseconds to 2 decimal places for reporting.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn append_line(path: &Path, line: &str) {
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{line}"));
    if let Err(e) = result {
        warn!(target: "solace::analytics", "Sink write to {} failed: {}", path.display(), e);
    }
}

/// JSONL analytics sink at `{log_dir}/analytics.jsonl`. No raw message text.
#[derive(Debug, Clone)]
pub struct AnalyticsLog {
    path: PathBuf,
}

impl AnalyticsLog {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let dir = log_dir.as_ref();
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(target: "solace::analytics", "Could not create log dir {}: {}", dir.display(), e);
        }
        Self { path: dir.join("analytics.jsonl") }
    }

    /// Per-request analytics entry.
    pub fn log_request(
        &self,
        emotion: &str,
        harassment_detected: bool,
        harassment_confidence: f32,
        response_time_ms: f64,
    ) {
        let entry = serde_json::json!({
            "kind": "analytics",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "emotion": emotion,
            "harassment_detected": harassment_detected,
            "harassment_confidence": round3(harassment_confidence),
            "response_time_ms": round2(response_time_ms),
        });
        append_line(&self.path, &entry.to_string());
    }

    /// Incident entry, written in addition to the analytics entry when the
    /// harassment flag is set.
    pub fn log_incident(&self, severity: f32, emotion: &str, response_time_ms: f64) {
        let entry = serde_json::json!({
            "kind": "incident",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "severity": round3(severity),
            "emotion": emotion,
            "harassment_detected": true,
            "response_time_ms": round2(response_time_ms),
        });
        append_line(&self.path, &entry.to_string());
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Line-per-interaction sink at `{log_dir}/interactions.log`. Includes the
/// raw message text.
#[derive(Debug, Clone)]
pub struct InteractionLog {
    path: PathBuf,
}

impl InteractionLog {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let dir = log_dir.as_ref();
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(target: "solace::analytics", "Could not create log dir {}: {}", dir.display(), e);
        }
        Self { path: dir.join("interactions.log") }
    }

    pub fn record(&self, session_key: &str, message: &str, emotion: &str, tier: SeverityTier) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        append_line(
            &self.path,
            &format!(
                "[{timestamp}] Session: {session_key} | Emotion: {emotion} | Harassment: {tier} | Message: {message}"
            ),
        );
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
