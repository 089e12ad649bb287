//! Alert dispatcher: fire-and-forget side channel for Medium/High severity.
//!
//! Alerts go to the tracing log and a broadcast channel (consumed by the
//! gateway's console banner task); when `SOLACE_ALERT_WEBHOOK_URL` is set,
//! the event is also POSTed from a spawned task. Every internal failure is
//! caught and dropped — alerting never affects the user-facing response.

use crate::classify::SeverityTier;
use crate::config::env_opt_string;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, warn};

const ENV_WEBHOOK_URL: &str = "SOLACE_ALERT_WEBHOOK_URL";

/// One raised alert. The raw message text is part of the side-channel
/// payload, as in the console alert it replaces.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub session: String,
    pub message: String,
    pub severity: SeverityTier,
    pub score: f32,
    pub timestamp: String,
}

/// Best-effort alert fan-out. `trigger` is synchronous from the caller's
/// point of view; the webhook POST runs detached.
pub struct AlertDispatcher {
    tx: broadcast::Sender<AlertEvent>,
    webhook_url: Option<String>,
    webhook_client: Option<reqwest::Client>,
}

impl AlertDispatcher {
    /// Dispatcher without a webhook (tests, or webhook env unset).
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx, webhook_url: None, webhook_client: None }
    }

    /// Reads `SOLACE_ALERT_WEBHOOK_URL`; unset means log-only alerts.
    pub fn from_env() -> Self {
        let webhook_url = env_opt_string(ENV_WEBHOOK_URL);
        let webhook_client = webhook_url.as_ref().and_then(|_| {
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .ok()
        });
        if webhook_url.is_some() && webhook_client.is_none() {
            warn!(target: "solace::alert", "{} set but reqwest client failed to build; webhook disabled", ENV_WEBHOOK_URL);
        }
        let (tx, _) = broadcast::channel(64);
        Self { tx, webhook_url, webhook_client }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }

    /// Raises one alert. Never returns an error.
    pub fn trigger(&self, session_key: &str, message: &str, severity: SeverityTier, score: f32) {
        let event = AlertEvent {
            session: session_key.to_string(),
            message: message.to_string(),
            severity,
            score,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        warn!(
            target: "solace::alert",
            session = %event.session,
            severity = %event.severity,
            score = event.score,
            "Harassment alert raised"
        );
        let _ = self.tx.send(event.clone());
        self.maybe_send_webhook(event);
    }

    fn maybe_send_webhook(&self, event: AlertEvent) {
        let Some(ref url) = self.webhook_url else { return };
        let Some(ref client) = self.webhook_client else { return };
        let url = url.clone();
        let client = client.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    warn!(target: "solace::alert", "Alert webhook returned {}", resp.status());
                }
                Err(e) => {
                    error!(target: "solace::alert", "Alert webhook POST failed: {}", e);
                }
            }
        });
    }
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains alert events into a console banner. Spawned by the gateway.
pub async fn handle_alert_events(mut rx: broadcast::Receiver<AlertEvent>) {
    while let Ok(event) = rx.recv().await {
        warn!(
            target: "solace::alert",
            "\n🚨 ALERT: Harassment Detected!\n🧍 Session: {}\n🧩 Severity: {} ({:.2})\n💬 Message: {}\n⏰ Time: {}\n",
            event.session, event.severity, event.score, event.message, event.timestamp
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_broadcasts_exactly_one_event() {
        let dispatcher = AlertDispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.trigger("s1", "a threat", SeverityTier::High, 0.8);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.session, "s1");
        assert_eq!(event.severity, SeverityTier::High);
        assert!(rx.try_recv().is_err(), "only one event per trigger");
    }

    #[tokio::test]
    async fn trigger_without_subscribers_does_not_panic() {
        let dispatcher = AlertDispatcher::new();
        dispatcher.trigger("s1", "a threat", SeverityTier::Medium, 0.4);
    }
}
