//! Error types for the chat request pipeline.
//!
//! Only `EmptyMessage` and `NotReady` are client-visible; everything else is
//! absorbed before it reaches the HTTP edge. Transient backend failures are
//! retried inside the generation client, and side-effect failures (alerting,
//! legal suggestion, sinks) are logged and dropped where they occur.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Request-level faults surfaced by the orchestration pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Empty or whitespace-only user message (user-correctable, 400).
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// Classifiers or pipeline not initialized yet (transient, 503).
    #[error("Models not loaded. Please wait for initialization.")]
    NotReady,

    /// Unrecoverable fault. The inner string is a short summary only; it is
    /// never sent to the client verbatim.
    #[error("Internal server error: {0}")]
    Internal(String),
}
