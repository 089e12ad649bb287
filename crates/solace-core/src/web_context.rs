//! Web context fetcher: short external snippets for recency/factual queries.
//!
//! Uses the Google Custom Search JSON API. Every failure mode — missing
//! credentials, timeout, HTTP error, empty result — is treated as "no
//! context" and never escalated.

use crate::config::env_opt_string;
use std::time::Duration;
use tracing::warn;

const ENV_SEARCH_API_KEY: &str = "SOLACE_SEARCH_API_KEY";
const ENV_SEARCH_ENGINE_ID: &str = "SOLACE_SEARCH_ENGINE_ID";
const SEARCH_API_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Snippets fetched per query.
const MAX_SNIPPETS: usize = 3;
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Search client for web augmentation. Constructed only when both
/// credentials are present.
pub struct WebContextFetcher {
    client: reqwest::Client,
    api_key: String,
    engine_id: String,
}

impl WebContextFetcher {
    /// Reads `SOLACE_SEARCH_API_KEY` and `SOLACE_SEARCH_ENGINE_ID`.
    /// Returns `None` when either is missing — web augmentation is then
    /// disabled for the whole process.
    pub fn from_env() -> Option<Self> {
        let api_key = env_opt_string(ENV_SEARCH_API_KEY)?;
        let engine_id = env_opt_string(ENV_SEARCH_ENGINE_ID)?;
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .ok()?;
        Some(Self { client, api_key, engine_id })
    }

    /// Top snippets for the query joined with `" | "`, or `None` on any
    /// failure or empty result.
    pub async fn fetch(&self, query: &str) -> Option<String> {
        let response = self
            .client
            .get(SEARCH_API_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", "3"),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "solace::web", "Web search request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(target: "solace::web", "Web search returned HTTP {}", response.status());
            return None;
        }

        match response.json::<serde_json::Value>().await {
            Ok(json) => snippets_from_response(&json),
            Err(e) => {
                warn!(target: "solace::web", "Web search response parse failed: {}", e);
                None
            }
        }
    }
}

/// Extracts up to [`MAX_SNIPPETS`] non-empty snippets from a Custom Search
/// response body. `None` when there are no usable snippets.
fn snippets_from_response(json: &serde_json::Value) -> Option<String> {
    let items = json.get("items")?.as_array()?;
    let snippets: Vec<&str> = items
        .iter()
        .take(MAX_SNIPPETS)
        .filter_map(|item| item.get("snippet").and_then(|s| s.as_str()))
        .filter(|s| !s.trim().is_empty())
        .collect();
    if snippets.is_empty() {
        return None;
    }
    Some(snippets.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_are_capped_and_joined() {
        let json = serde_json::json!({
            "items": [
                { "snippet": "first" },
                { "snippet": "second" },
                { "snippet": "third" },
                { "snippet": "fourth" }
            ]
        });
        assert_eq!(
            snippets_from_response(&json).as_deref(),
            Some("first | second | third")
        );
    }

    #[test]
    fn empty_or_missing_items_yield_none() {
        assert_eq!(snippets_from_response(&serde_json::json!({})), None);
        assert_eq!(
            snippets_from_response(&serde_json::json!({ "items": [] })),
            None
        );
        assert_eq!(
            snippets_from_response(&serde_json::json!({ "items": [{ "snippet": "  " }] })),
            None
        );
    }
}
