//! Error types for the discovery pipeline.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Generation error: {0}")]
    Llm(#[from] LlmError),

    #[error("Profile reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Interview error: {0}")]
    Interview(#[from] InterviewError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Text generation / transcription errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned status {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} returned empty output")]
    EmptyOutput { provider: String },

    #[error("Transcription not supported by provider {provider}")]
    TranscriptionUnsupported { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Profile reconciliation errors.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The profile row never became visible. Fatal to the pipeline.
    #[error("Profile for identity {identity} unavailable after {attempts} attempts")]
    ProfileUnavailable { identity: String, attempts: u32 },

    #[error("Database error during reconciliation: {0}")]
    Database(#[from] DatabaseError),
}

/// Interview state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    #[error("Session {id} not found")]
    SessionNotFound { id: Uuid },

    #[error("Invalid state: expected {expected}, session {id} is {actual}")]
    InvalidState {
        id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("Answer text must not be empty")]
    EmptyAnswer,

    #[error("An operation is already in flight for session {id}")]
    AlreadyInFlight { id: Uuid },

    #[error("Session {id} has {count} exchanges, expected {expected}")]
    IncompleteTranscript { id: Uuid, count: usize, expected: u32 },

    #[error("Question generation failed for round {round}: {reason}")]
    GenerationFailed { round: u32, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Generation error: {0}")]
    Llm(#[from] LlmError),
}

/// Tiny-step decomposition and progression errors.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Action {id} not found")]
    ActionNotFound { id: Uuid },

    #[error("No steps recorded for action {action_id}")]
    NoSteps { action_id: Uuid },

    #[error("Step {index} cannot complete while an earlier step is pending")]
    OutOfOrder { index: u32 },

    #[error("All steps for action {action_id} are already complete")]
    AlreadyComplete { action_id: Uuid },

    #[error("A decomposition is already in flight for action {id}")]
    AlreadyInFlight { id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
