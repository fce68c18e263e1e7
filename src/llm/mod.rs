//! Language model backends that stream response text.
//!
//! Every backend turns a conversation into a [`TextStream`] of text
//! fragments. Fragments carry no framing guarantees; sentence and tag
//! handling happen downstream in the segmenter.

pub mod echo;
pub mod llamacpp;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod sse;
mod stream;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;

use crate::config::{CharacterConfig, LlmBackend, LlmConfig};
use crate::error::{ChatError, Result};
use crate::pipeline::messages::Message;

pub use echo::EchoBackend;
pub use llamacpp::LlamaCppBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// Ordered text fragments of one response. An `Err` item ends the stream.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A language model that streams its reply to a conversation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Open a response stream for `messages`.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be made or the provider rejects it before
    /// any text is produced. Failures after that surface as stream items.
    async fn send(&self, messages: &[Message]) -> Result<TextStream>;
}

/// Build the backend selected in `llm`.
///
/// # Errors
///
/// Returns [`ChatError::Config`] if the backend lacks required settings.
pub fn create_backend(llm: &LlmConfig, character: &CharacterConfig) -> Result<Arc<dyn ChatBackend>> {
    let backend: Arc<dyn ChatBackend> = match llm.backend {
        LlmBackend::Echo => Arc::new(EchoBackend),
        LlmBackend::OpenAi => {
            let api_key = llm.resolved_openai_key().ok_or_else(|| {
                ChatError::Config("OpenAI backend selected but no API key configured".to_owned())
            })?;
            Arc::new(OpenAiBackend::new(
                &llm.openai_url,
                &llm.openai_model,
                api_key,
                llm.max_tokens,
            )?)
        }
        LlmBackend::Ollama => Arc::new(OllamaBackend::new(
            &llm.ollama_url,
            &llm.ollama_model,
            &character.name,
        )?),
        LlmBackend::LlamaCpp => Arc::new(LlamaCppBackend::new(
            &llm.llamacpp_url,
            &character.name,
            llm.llamacpp_n_predict,
            llm.temperature,
        )?),
    };
    Ok(backend)
}

/// Shared HTTP client settings for provider adapters.
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))
}

/// Extract a human-readable message from a provider error body.
pub(crate) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_owned())
}
