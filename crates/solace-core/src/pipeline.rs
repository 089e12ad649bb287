//! Chat request orchestration: classification, memory, resilient generation,
//! legal annotation, alerting, and response assembly.
//!
//! Per request the pipeline runs
//! validate → classify → read context → generate → update memory →
//! annotate → alert → respond. The context read happens before the memory
//! write, so a request never sees its own turns. Memory, classifiers, and the
//! generation backend are shared, reentrant collaborators; the only mutable
//! shared state is the conversation store.

use crate::alert::AlertDispatcher;
use crate::analytics::{round2, round3, AnalyticsLog, InteractionLog};
use crate::classify::{
    ClassificationResult, EmotionClassifier, HarassmentClassifier, SeverityTier,
    HARASSMENT_FLAG_THRESHOLD,
};
use crate::error::{PipelineError, PipelineResult};
use crate::generate::{GenerationRequest, ResponseGenerator};
use crate::legal::{append_annotations, LegalMatcher};
use crate::memory::{ConversationMemory, PROMPT_CONTEXT_TURNS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Session key used when the client does not send one.
pub const DEFAULT_SESSION_KEY: &str = "anonymous";

/// Minimum score forwarded to generation on the proactive-support path.
const SUPPORT_SCORE_FLOOR: f32 = 0.6;

/// One `/api/chat` request.
#[derive(Debug, Clone)]
pub struct ChatInput {
    pub message: String,
    pub session_id: Option<String>,
    pub enable_web: bool,
}

/// Assembled `/api/chat` response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub emotion: String,
    pub harassment_level: SeverityTier,
    pub harassment_detected: bool,
    pub harassment_confidence: f64,
    pub keywords: Vec<String>,
    pub response_time_ms: f64,
    pub web_enabled: bool,
}

/// One `/api/trigger-support` request.
#[derive(Debug, Clone)]
pub struct SupportInput {
    pub message: String,
    pub severity: Option<String>,
}

/// Assembled `/api/trigger-support` response.
#[derive(Debug, Clone, Serialize)]
pub struct SupportReply {
    pub reply: String,
    pub severity: SeverityTier,
    pub emotion: String,
    pub harassment_score: f64,
}

/// Static supportive message keyed by severity, used when the proactive
/// support path cannot generate.
pub fn fallback_support_message(severity: SeverityTier) -> &'static str {
    match severity {
        SeverityTier::High => {
            "This sounds extremely serious, and I'm deeply sorry you're going through this. \
             Please prioritize your safety. You can reach out to authorities or trusted friends immediately. \
             I'm here with you 💜"
        }
        SeverityTier::Medium => {
            "That message sounds really hurtful. I'm here to support you. \
             You might want to report or block the person involved. \
             You deserve to feel safe and respected 💜"
        }
        SeverityTier::Low => {
            "I noticed something that might be bothering you. \
             Please remember, you're not alone — I'm here to listen 💜"
        }
    }
}

fn resolve_session_key(session_id: Option<&str>) -> &str {
    session_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION_KEY)
}

/// Owns the per-request sequencing and all cross-cutting error handling.
pub struct ChatPipeline {
    emotions: Arc<dyn EmotionClassifier>,
    harassment: Arc<dyn HarassmentClassifier>,
    generator: ResponseGenerator,
    memory: Arc<ConversationMemory>,
    legal: Arc<LegalMatcher>,
    alerts: AlertDispatcher,
    analytics: AnalyticsLog,
    interactions: InteractionLog,
}

impl ChatPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        emotions: Arc<dyn EmotionClassifier>,
        harassment: Arc<dyn HarassmentClassifier>,
        generator: ResponseGenerator,
        memory: Arc<ConversationMemory>,
        legal: Arc<LegalMatcher>,
        alerts: AlertDispatcher,
        analytics: AnalyticsLog,
        interactions: InteractionLog,
    ) -> Self {
        Self { emotions, harassment, generator, memory, legal, alerts, analytics, interactions }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Runs both classifiers over the message. Produced fresh per request;
    /// never persisted beyond the request's analytics entry.
    fn classify_message(&self, message: &str) -> ClassificationResult {
        let emotion = self.emotions.classify(message);
        let score = self.harassment.score(message);
        let (tier, keywords) = self.harassment.analyze(message);
        ClassificationResult { emotion, score, tier, keywords }
    }

    /// The main chat lifecycle.
    pub async fn handle_chat(&self, input: ChatInput) -> PipelineResult<ChatReply> {
        let message = input.message.trim();
        if message.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }
        let session_key = resolve_session_key(input.session_id.as_deref());
        let correlation_id = uuid::Uuid::new_v4();
        let started = Instant::now();

        let ClassificationResult { emotion, score, tier, keywords } =
            self.classify_message(message);
        let harassment_detected = score >= HARASSMENT_FLAG_THRESHOLD;

        info!(
            target: "solace::pipeline",
            %correlation_id,
            session = %session_key,
            emotion = %emotion,
            tier = %tier,
            "Chat request classified"
        );

        // Context read must precede the memory write so the prompt never
        // includes the turns created by this request.
        let history = self.memory.recent(session_key, PROMPT_CONTEXT_TURNS);

        let outcome = self
            .generator
            .generate(&GenerationRequest {
                message: message.to_string(),
                emotion: emotion.clone(),
                harassment: harassment_detected,
                score,
                history,
                enable_web: input.enable_web,
            })
            .await;

        self.memory.append_exchange(session_key, message, &outcome.reply);

        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.analytics.log_request(&emotion, harassment_detected, score, response_time_ms);
        if harassment_detected {
            self.analytics.log_incident(score, &emotion, response_time_ms);
        }

        let mut reply = outcome.reply;
        if tier >= SeverityTier::Medium && !self.legal.is_empty() {
            let mut annotations = self.legal.match_sections(message);
            if annotations.is_empty() {
                if let Some(suggestion) =
                    self.legal.suggest(message, self.generator.backend().as_ref()).await
                {
                    annotations.push(suggestion);
                }
            }
            append_annotations(&mut reply, &annotations);
        }

        self.interactions.record(session_key, message, &emotion, tier);

        if tier >= SeverityTier::Medium {
            self.alerts.trigger(session_key, message, tier, score);
        }

        Ok(ChatReply {
            reply: reply.trim().to_string(),
            emotion,
            harassment_level: tier,
            harassment_detected,
            harassment_confidence: round3(score),
            keywords,
            response_time_ms: round2(response_time_ms),
            web_enabled: outcome.web_used,
        })
    }

    /// Proactive support: classify, force the harassment framing, and fall
    /// back to a static severity-keyed message when generation fails. Skips
    /// memory, legal matching, and web augmentation.
    pub async fn handle_support_trigger(&self, input: SupportInput) -> PipelineResult<SupportReply> {
        let message = input.message.trim();
        if message.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }

        let provided = input
            .severity
            .as_deref()
            .and_then(SeverityTier::from_label)
            .unwrap_or(SeverityTier::Low);

        let classification = self.classify_message(message);
        let emotion = classification.emotion;
        let score = classification.score;
        let severity = provided.max(classification.tier);

        let request = GenerationRequest {
            message: format!("I received a notification that says: {message}"),
            emotion: emotion.clone(),
            harassment: true,
            score: score.max(SUPPORT_SCORE_FLOOR),
            history: Vec::new(),
            enable_web: false,
        };

        let reply = match self.generator.try_generate(&request).await {
            Ok(outcome) if !outcome.reply.trim().is_empty() => outcome.reply,
            Ok(_) => fallback_support_message(severity).to_string(),
            Err(e) => {
                warn!(target: "solace::pipeline", "Support generation failed ({}); using severity fallback", e);
                fallback_support_message(severity).to_string()
            }
        };

        Ok(SupportReply { reply, severity, emotion, harassment_score: round3(score) })
    }

    /// Clears conversation memory for the session. Always succeeds.
    pub fn reset(&self, session_id: Option<&str>) -> String {
        let session_key = resolve_session_key(session_id);
        if self.memory.contains(session_key) {
            self.memory.reset(session_key);
            format!("Conversation history reset for session {session_key}")
        } else {
            format!("No conversation history found for session {session_key}")
        }
    }
}
