//! Text generation for the discovery pipeline.
//!
//! Supports:
//! - **Anthropic**: Messages API over reqwest
//! - **OpenAI**: Chat Completions API over reqwest (plus Whisper transcription)
//!
//! The pipeline components depend only on the [`TextGenerator`] trait, so
//! tests substitute scripted doubles.

mod anthropic;
mod openai;

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAiGenerator;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;

/// Supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating a text generator.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Opaque text-generation capability consumed by the pipeline.
///
/// `generate` may fail or produce empty output; callers own retry and
/// fallback policy. `transcribe` is used only for optional voice input and
/// is not on the critical path.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a prompt. Empty model output is reported as
    /// [`LlmError::EmptyOutput`] so call sites treat it like any other
    /// generation failure.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Transcribe an audio file to text.
    async fn transcribe(&self, audio_path: &Path) -> Result<String, LlmError> {
        let _ = audio_path;
        Err(LlmError::TranscriptionUnsupported {
            provider: self.provider_name().to_string(),
        })
    }

    /// Provider name for logging and error reporting.
    fn provider_name(&self) -> &str;

    /// Model identifier in use.
    fn model_name(&self) -> &str;
}

/// Create a text generator from configuration.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => {
            let generator = AnthropicGenerator::new(config)?;
            tracing::info!("Using Anthropic (model: {})", config.model);
            Ok(Arc::new(generator))
        }
        LlmBackend::OpenAi => {
            let generator = OpenAiGenerator::new(config)?;
            tracing::info!("Using OpenAI (model: {})", config.model);
            Ok(Arc::new(generator))
        }
    }
}
