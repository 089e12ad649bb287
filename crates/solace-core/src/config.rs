//! Gateway configuration loaded from `config/gateway.toml` and environment.
//!
//! Secrets (LLM key, search key, webhook URL) are environment-only and are
//! read by the components that use them; this struct carries the non-secret
//! service settings.

use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_legal_data_path() -> String {
    "legal/sections.json".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

/// Service configuration.
///
/// | Key | Default | Description |
/// |-----|---------|-------------|
/// | app_name | Solace Gateway | Application identity for /health and logs. |
/// | port | 8000 | HTTP port for the gateway. |
/// | llm_mode | mock | "mock" \| "live" — live requires SOLACE_LLM_API_KEY. |
/// | log_dir | ./logs | Directory for the analytics and interaction sinks. |
/// | legal_data_path | legal/sections.json | Legal section dataset; missing file disables annotation. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity (e.g. "Solace Gateway").
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// LLM mode ("mock" or "live").
    pub llm_mode: String,
    /// Directory for append-only sinks (analytics.jsonl, interactions.log).
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Path to the legal section dataset. Absence is non-fatal.
    #[serde(default = "default_legal_data_path")]
    pub legal_data_path: String,
}

impl CoreConfig {
    /// Load config from file and environment.
    /// Precedence: env `SOLACE_CONFIG` path > `config/gateway.toml` > defaults,
    /// then a `SOLACE`-prefixed environment source on top.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("SOLACE_CONFIG").unwrap_or_else(|_| "config/gateway".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Solace Gateway")?
            .set_default("port", 8000_i64)?
            .set_default("llm_mode", "mock")?
            .set_default("log_dir", "./logs")?
            .set_default("legal_data_path", "legal/sections.json")?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("SOLACE").separator("__"))
            .build()?;

        built.try_deserialize()
    }

    /// True when the gateway should call the live LLM backend.
    pub fn llm_live(&self) -> bool {
        self.llm_mode.trim().eq_ignore_ascii_case("live")
    }
}

/// Optional env var: trimmed, empty treated as unset.
pub fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_live_is_case_insensitive() {
        let config = CoreConfig {
            app_name: "t".into(),
            port: 0,
            llm_mode: "Live".into(),
            log_dir: "./logs".into(),
            legal_data_path: "legal/sections.json".into(),
        };
        assert!(config.llm_live());
    }
}
