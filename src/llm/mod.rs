// Language model capability module
// Chat completion used by the classifier and suggestion generator

pub mod ollama;
pub mod prompts;


use anyhow::Result;
use std::time::Duration;

pub use ollama::OllamaChatClient;

/// A single completion request with an explicit timeout.
///
/// The timeout bounds the whole HTTP call; an expired timeout is reported as
/// an error so callers can apply their fallback policy instead of waiting.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Capability interface for a black-box language model.
///
/// Implementations must treat the model as possibly returning malformed
/// output; parsing and validation belong to the caller.
pub trait LanguageModel: Send + Sync {
    /// Identifier of the completion model
    fn model_name(&self) -> &str;

    /// Run a completion, returning the raw response text
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Extract a JSON object from a model response.
///
/// Models frequently wrap JSON in markdown code fences or prepend
/// commentary; this finds the outermost `{ ... }` block after stripping
/// fences. Returns `None` when no braces are present.
#[inline]
pub fn extract_json_block(response: &str) -> Option<String> {
    let mut text = response.trim();

    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    let text = text.trim();

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    text.get(start..=end).map(str::to_string)
}
