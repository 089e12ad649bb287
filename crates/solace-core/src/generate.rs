//! Resilient generation client: prompt assembly, retry with backoff, the
//! output-limit fallback, and the terminal emergency reply.
//!
//! `ResponseGenerator::generate` never fails — every failure path resolves to
//! a concrete reply string. A missing API key, by contrast, is a startup
//! fault: `ModelClient::from_env` refuses to construct, and the gateway
//! refuses to start.

use crate::classify::{SeverityTier, HARASSMENT_FLAG_THRESHOLD};
use crate::config::env_opt_string;
use crate::memory::{Speaker, Turn, PROMPT_CONTEXT_TURNS};
use crate::web_context::WebContextFetcher;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const ENV_LLM_API_URL: &str = "SOLACE_LLM_API_URL";
const ENV_LLM_API_KEY: &str = "SOLACE_LLM_API_KEY";
const ENV_LLM_MODEL: &str = "SOLACE_LLM_MODEL";
const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// Attempts per request, including the first. Backoff between attempts is
/// 1 s then 2 s; delays are per-request sleeps and never block other tasks.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed sampling for the main support prompt. Not request-controlled.
const PRIMARY_PARAMS: SamplingParams =
    SamplingParams { temperature: 0.8, max_tokens: 800, top_p: Some(0.9) };

/// Smaller output budget for the simplified prompt after an output-limit
/// signal.
const FALLBACK_PARAMS: SamplingParams =
    SamplingParams { temperature: 0.7, max_tokens: 300, top_p: None };

/// Messages that suggest the user wants current/factual information; web
/// augmentation is only attempted when one of these matches.
const WEB_KEYWORDS: &[&str] = &[
    "today", "latest", "who won", "news", "update", "recent", "current", "2024", "2025",
    "now", "happening", "trending", "what is", "when did",
];

/// Prefixes some backends prepend to the reply; stripped before returning.
const REPLY_PREFIXES: &[&str] = &["Solace:", "AI:", "Response:"];

const EMERGENCY_HARASSMENT_REPLY: &str = "I hear you, and I want you to know this is completely unacceptable. You deserve to feel safe and respected. Please consider reaching out to trusted support resources - you don't have to face this alone. 💙";

const EMERGENCY_SUPPORT_REPLY: &str = "Thank you for sharing this with me. I'm here to listen and support you through whatever you're experiencing. Your feelings matter and you're not alone in this. 🌟";

/// Static last-resort reply, selected by the harassment flag.
pub fn emergency_reply(harassment: bool) -> &'static str {
    if harassment {
        EMERGENCY_HARASSMENT_REPLY
    } else {
        EMERGENCY_SUPPORT_REPLY
    }
}

/// Output-length and sampling knobs for one backend call.
#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
}

/// Backend call failure. `OutputLimit` is distinguished so the client can
/// fall back to a shorter prompt instead of plain retrying.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("output length limit exceeded")]
    OutputLimit,
    #[error("{0}")]
    Other(String),
}

/// The single external text-generation call. Implementations must be
/// stateless and reentrant once constructed.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, prompt: &str, params: SamplingParams) -> Result<String, BackendError>;
}

/// Everything the prompt builder needs for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub message: String,
    pub emotion: String,
    /// Harassment flag at the 0.55 threshold (recomputed internally as well).
    pub harassment: bool,
    pub score: f32,
    /// Up to 6 prior turns, oldest first.
    pub history: Vec<Turn>,
    pub enable_web: bool,
}

/// Reply text plus whether external web context was actually used.
/// Requested is not the same as used: `web_used` is true only when a keyword
/// trigger matched and the fetch returned non-empty data.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub reply: String,
    pub web_used: bool,
}

// ---------------------------------------------------------------------------
// OpenAI-compatible live client
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Live OpenAI-compatible chat-completions client (OpenRouter by default).
///
/// Env:
/// - `SOLACE_LLM_API_KEY` (required)
/// - `SOLACE_LLM_API_URL` (default: OpenRouter chat completions)
/// - `SOLACE_LLM_MODEL` (default: `meta-llama/llama-3.3-70b-instruct`)
pub struct ModelClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl ModelClient {
    /// Fails when the API key is missing or blank — callers must treat that
    /// as a startup abort, not a per-request condition.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let api_key = env_opt_string(ENV_LLM_API_KEY)
            .ok_or("SOLACE_LLM_API_KEY is required for live mode but was not found in the environment")?;
        let url = env_opt_string(ENV_LLM_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let model = env_opt_string(ENV_LLM_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, api_key, model, url })
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ModelClient {
    async fn complete(&self, prompt: &str, params: SamplingParams) -> Result<String, BackendError> {
        let request_body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
            temperature: Some(params.temperature),
            max_tokens: Some(params.max_tokens),
            top_p: params.top_p,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://solace-gateway.local")
            .header("X-Title", "Solace-Gateway")
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| BackendError::Other(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            if body.contains("MAX_TOKENS") {
                return Err(BackendError::OutputLimit);
            }
            return Err(BackendError::Other(format!("API error ({status}): {body}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Other(format!("response parse failed: {e}")))?;
        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Other("response contained no choices".to_string()))?;

        let content = choice.message.content;
        if content.trim().is_empty() {
            if choice.finish_reason.as_deref() == Some("length") {
                return Err(BackendError::OutputLimit);
            }
            return Err(BackendError::Other("backend returned empty response".to_string()));
        }
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Resilient generator
// ---------------------------------------------------------------------------

/// Wraps a [`GenerationBackend`] with web augmentation, retry/backoff, the
/// output-limit fallback, and the emergency reply.
pub struct ResponseGenerator {
    backend: Arc<dyn GenerationBackend>,
    web: Option<WebContextFetcher>,
}

impl ResponseGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>, web: Option<WebContextFetcher>) -> Self {
        Self { backend, web }
    }

    /// Generates a reply; all failure paths resolve to a concrete string.
    pub async fn generate(&self, req: &GenerationRequest) -> GenerationOutcome {
        let harassment = req.score >= HARASSMENT_FLAG_THRESHOLD;
        match self.try_generate(req).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(target: "solace::generate", "All generation attempts failed ({}); using emergency reply", e);
                GenerationOutcome { reply: emergency_reply(harassment).to_string(), web_used: false }
            }
        }
    }

    /// Retry/backoff/fallback without the terminal emergency reply. The
    /// proactive-support path uses this directly so it can apply its own
    /// severity-keyed fallback messages.
    pub async fn try_generate(
        &self,
        req: &GenerationRequest,
    ) -> Result<GenerationOutcome, BackendError> {
        let web_context = if req.enable_web && wants_web_context(&req.message) {
            match &self.web {
                Some(fetcher) => fetcher.fetch(&req.message).await,
                None => None,
            }
        } else {
            None
        };
        let web_used = web_context.is_some();

        let harassment = req.score >= HARASSMENT_FLAG_THRESHOLD;
        let tier = SeverityTier::from_score(req.score);
        let prompt = build_support_prompt(req, tier, harassment, web_context.as_deref());

        let mut last_err = BackendError::Other("no generation attempt made".to_string());
        for attempt in 1..=MAX_ATTEMPTS {
            match self.backend.complete(&prompt, PRIMARY_PARAMS).await {
                Ok(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Ok(GenerationOutcome {
                            reply: strip_reply_prefix(text).to_string(),
                            web_used,
                        });
                    }
                    last_err = BackendError::Other("backend returned empty text".to_string());
                }
                Err(BackendError::OutputLimit) => {
                    warn!(target: "solace::generate", attempt, "Output budget exceeded; retrying once with a simplified prompt");
                    if let Some(reply) = self.simplified_attempt(req, harassment).await {
                        return Ok(GenerationOutcome { reply, web_used });
                    }
                    return Err(BackendError::OutputLimit);
                }
                Err(e) => {
                    warn!(target: "solace::generate", attempt, "Generation attempt failed: {}", e);
                    last_err = e;
                }
            }
            if attempt < MAX_ATTEMPTS {
                let delay = Duration::from_secs(1u64 << (attempt - 1));
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_err)
    }

    /// One call with a strictly shorter prompt and a smaller output budget.
    async fn simplified_attempt(&self, req: &GenerationRequest, harassment: bool) -> Option<String> {
        let prompt = format!(
            "Provide empathetic support for this message: \"{}\"\n\nEmotion: {}. Harassment: {}.\nRespond with warm, supportive 2-3 sentences.",
            req.message, req.emotion, harassment
        );
        match self.backend.complete(&prompt, FALLBACK_PARAMS).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(strip_reply_prefix(text).to_string())
                }
            }
            Err(e) => {
                warn!(target: "solace::generate", "Simplified prompt attempt failed: {}", e);
                None
            }
        }
    }

    /// The backend, for collaborators that issue their own best-effort calls
    /// (legal suggestion).
    pub fn backend(&self) -> Arc<dyn GenerationBackend> {
        Arc::clone(&self.backend)
    }
}

fn wants_web_context(message: &str) -> bool {
    let lower = message.to_lowercase();
    WEB_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn strip_reply_prefix(text: &str) -> &str {
    for prefix in REPLY_PREFIXES {
        if let Some(stripped) = text.strip_prefix(prefix) {
            return stripped.trim_start();
        }
    }
    text
}

fn build_support_prompt(
    req: &GenerationRequest,
    tier: SeverityTier,
    harassment: bool,
    web_context: Option<&str>,
) -> String {
    let web_section = web_context
        .map(|c| format!("\n\n[Live Web Context: {c}]"))
        .unwrap_or_default();

    let mut history_context = String::new();
    if !req.history.is_empty() {
        let skip = req.history.len().saturating_sub(PROMPT_CONTEXT_TURNS);
        history_context.push_str("\nPrevious conversation:\n");
        for turn in req.history.iter().skip(skip) {
            let label = match turn.speaker {
                Speaker::User => "User",
                Speaker::Assistant => "Solace",
            };
            history_context.push_str(&format!("{}: {}\n", label, turn.text));
        }
    }

    let web_line = if web_context.is_some() {
        "\n- Web Search Enabled: Using live information"
    } else {
        ""
    };

    format!(
        "You are Solace, a compassionate companion for emotional support and harassment guidance.\n\
         You remember previous conversations and can reference them naturally.{web_section}\n\
         {history_context}\n\
         Current USER MESSAGE: \"{message}\"\n\n\
         CONTEXT:\n\
         - Emotion: {emotion}\n\
         - Harassment Detected: {harassment}\n\
         - Severity: {tier}\n\
         - Confidence Score: {score:.2}{web_line}\n\n\
         RESPONSE GUIDELINES:\n\
         1. Provide warm, empathetic, psychologically safe support\n\
         2. Keep the response conversational (3-5 sentences)\n\
         3. Reference the previous conversation naturally if relevant\n\
         4. If web context is provided, incorporate the factual information naturally\n\
         5. If harassment is detected, offer specific guidance on legal rights, mental health resources, and safety measures\n\
         6. Use natural language and avoid robotic phrases\n\
         7. Include one supportive emoji if appropriate\n\n\
         Generate your response:",
        message = req.message,
        emotion = req.emotion,
        harassment = harassment,
        tier = tier,
        score = req.score,
    )
}

// ---------------------------------------------------------------------------
// Mock backend (llm_mode = "mock" and tests)
// ---------------------------------------------------------------------------

const MOCK_REPLY: &str = "I'm here with you, and what you're feeling matters. Let's take this one step at a time. You're not alone in this. 💙";

/// Deterministic backend for offline mode and tests. Can be scripted to fail
/// a number of initial calls or to reject large output budgets.
#[derive(Debug, Default)]
pub struct MockBackend {
    fail_first: u32,
    limit_long_outputs: bool,
    calls: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `n` calls with a transient error.
    pub fn failing(n: u32) -> Self {
        Self { fail_first: n, ..Self::default() }
    }

    /// Fails every call with a transient error.
    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    /// Signals an output-limit condition for any budget above the fallback's.
    pub fn output_limited() -> Self {
        Self { limit_long_outputs: true, ..Self::default() }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for MockBackend {
    async fn complete(&self, _prompt: &str, params: SamplingParams) -> Result<String, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.limit_long_outputs && params.max_tokens > FALLBACK_PARAMS.max_tokens {
            return Err(BackendError::OutputLimit);
        }
        if n < self.fail_first {
            return Err(BackendError::Other("simulated backend outage".to_string()));
        }
        Ok(MOCK_REPLY.to_string())
    }
}
