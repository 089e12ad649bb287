//! solace-core: support companion core library.
//!
//! Everything behind the gateway's HTTP surface: emotion/harassment
//! classification, bounded per-session conversation memory, the resilient
//! generation client (retry, backoff, fallback, emergency reply), legal
//! reference matching, alert dispatch, and the append-only analytics and
//! interaction sinks, sequenced by [`ChatPipeline`].

mod alert;
mod analytics;
mod classify;
mod config;
mod error;
mod generate;
mod legal;
mod memory;
mod pipeline;
mod web_context;

pub use alert::{handle_alert_events, AlertDispatcher, AlertEvent};
pub use analytics::{AnalyticsLog, InteractionLog};
pub use classify::{
    ClassificationResult, EmotionClassifier, HarassmentClassifier, LexiconEmotionClassifier,
    LexiconHarassmentClassifier, SeverityTier, HARASSMENT_FLAG_THRESHOLD,
};
pub use config::{env_opt_string, CoreConfig};
pub use error::{PipelineError, PipelineResult};
pub use generate::{
    emergency_reply, BackendError, GenerationBackend, GenerationOutcome, GenerationRequest,
    MockBackend, ModelClient, ResponseGenerator, SamplingParams, MAX_ATTEMPTS,
};
pub use legal::{append_annotations, LegalAnnotation, LegalMatcher, LegalSection};
pub use memory::{ConversationMemory, Speaker, Turn, MAX_TURNS, PROMPT_CONTEXT_TURNS};
pub use pipeline::{
    fallback_support_message, ChatInput, ChatPipeline, ChatReply, SupportInput, SupportReply,
    DEFAULT_SESSION_KEY,
};
pub use web_context::WebContextFetcher;
