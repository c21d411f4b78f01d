use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use itertools::Itertools;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::chunker::estimate_token_count;
use crate::config::LlmConfig;
use crate::database::lancedb::ScoredChunk;
use crate::llm::{CompletionRequest, LanguageModel, extract_json_block, prompts};
use crate::retriever::RetrievalResult;
use crate::triage::types::{ClassifiedAlert, Confidence, TriageSuggestion};

/// How many sources the degraded fallback lists for the operator
const FALLBACK_SOURCE_LIMIT: usize = 3;

/// Whether the suggestion came from the model or a fallback path
#[derive(Debug, Clone)]
pub enum Generation {
    /// Model-produced suggestion
    Model(TriageSuggestion),
    /// Model unavailable or malformed output; fallback pointing at the raw
    /// retrieved chunks
    Degraded(TriageSuggestion),
    /// Nothing retrieved above threshold; explicit no-match response
    NoMatch(TriageSuggestion),
}

impl Generation {
    #[inline]
    pub fn suggestion(self) -> TriageSuggestion {
        match self {
            Generation::Model(s) | Generation::Degraded(s) | Generation::NoMatch(s) => s,
        }
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Generation::Degraded(_))
    }
}

/// Builds a structured triage suggestion from a classified alert and
/// retrieved runbook context.
///
/// Never fails: model or parsing problems produce a labeled low-confidence
/// fallback, and an empty retrieval produces an explicit "no matching
/// runbook" response instead of an invented procedure.
pub struct SuggestionGenerator {
    llm: Arc<dyn LanguageModel>,
    config: LlmConfig,
    context_budget_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    immediate_actions: Vec<String>,
    #[serde(default)]
    root_cause_hypothesis: String,
    #[serde(default)]
    escalation_recommendation: String,
    #[serde(default)]
    confidence: String,
}

/// Bounded prompt context assembled from the most relevant chunks
struct ContextWindow {
    text: String,
    used: Vec<ScoredChunk>,
}

impl SuggestionGenerator {
    #[inline]
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        config: LlmConfig,
        context_budget_tokens: usize,
    ) -> Self {
        Self {
            llm,
            config,
            context_budget_tokens,
        }
    }

    #[inline]
    pub fn generate(&self, alert: &ClassifiedAlert, retrieval: &RetrievalResult) -> Generation {
        if retrieval.is_empty() {
            debug!("No runbook matched above threshold; returning no-match response");
            return Generation::NoMatch(no_match_suggestion(alert));
        }

        let context = build_context(&retrieval.chunks, self.context_budget_tokens);

        match self.generate_with_model(alert, &context) {
            Ok(suggestion) => Generation::Model(suggestion),
            Err(e) => {
                warn!("Suggestion downgraded to fallback: {:#}", e);
                Generation::Degraded(degraded_suggestion(retrieval))
            }
        }
    }

    fn generate_with_model(
        &self,
        alert: &ClassifiedAlert,
        context: &ContextWindow,
    ) -> Result<TriageSuggestion> {
        let request = CompletionRequest {
            system: prompts::TRIAGE_SYSTEM_PROMPT.to_string(),
            prompt: prompts::triage_prompt(
                &alert.title,
                alert.alert_type.as_str(),
                alert.severity.as_str(),
                &alert.description,
                &context.text,
            ),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            timeout: Duration::from_secs(self.config.timeout_seconds),
        };

        let response = self.llm.complete(&request)?;

        parse_suggestion(&response, &context.used).ok_or_else(|| {
            warn!("Malformed suggestion response: {:.200}", response);
            anyhow::anyhow!("Malformed suggestion response")
        })
    }
}

/// Format the most relevant chunks into a prompt context, truncated to the
/// token budget
fn build_context(chunks: &[ScoredChunk], budget_tokens: usize) -> ContextWindow {
    let mut parts: Vec<String> = Vec::new();
    let mut used = Vec::new();
    let mut used_tokens = 0;

    for (i, chunk) in chunks.iter().enumerate() {
        let section = chunk
            .metadata
            .heading_path
            .as_deref()
            .unwrap_or("(no section)");
        let part = format!(
            "### Source {}: {} - {} (relevance {:.0}%)\n{}\n",
            i + 1,
            chunk.metadata.document_id,
            section,
            chunk.score * 100.0,
            chunk.metadata.content
        );

        let part_tokens = estimate_token_count(&part);
        if used_tokens + part_tokens > budget_tokens {
            if parts.is_empty() {
                // Always include at least the top chunk, trimmed to budget
                parts.push(truncate_to_tokens(&part, budget_tokens));
                used.push(chunk.clone());
            }
            break;
        }

        parts.push(part);
        used.push(chunk.clone());
        used_tokens += part_tokens;
    }

    ContextWindow {
        text: parts.join("\n"),
        used,
    }
}

fn truncate_to_tokens(text: &str, budget_tokens: usize) -> String {
    let mut out = String::new();
    for word in text.split_whitespace() {
        if estimate_token_count(&out) + estimate_token_count(word) > budget_tokens {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn parse_suggestion(response: &str, used: &[ScoredChunk]) -> Option<TriageSuggestion> {
    let block = extract_json_block(response)?;
    let parsed: RawSuggestion = serde_json::from_str(&block).ok()?;

    // An empty summary or empty action list is not a usable suggestion
    if parsed.summary.trim().is_empty() || parsed.immediate_actions.is_empty() {
        return None;
    }

    Some(TriageSuggestion {
        summary: parsed.summary.trim().to_string(),
        immediate_actions: parsed
            .immediate_actions
            .into_iter()
            .map(|action| action.trim().to_string())
            .filter(|action| !action.is_empty())
            .collect(),
        root_cause_hypothesis: parsed.root_cause_hypothesis.trim().to_string(),
        escalation_recommendation: parsed.escalation_recommendation.trim().to_string(),
        confidence: Confidence::parse(&parsed.confidence).unwrap_or(Confidence::Medium),
        source_chunks: used.to_vec(),
    })
}

/// Fallback suggestion when the model is unavailable: low confidence, with
/// the retrieved runbook excerpts surfaced directly to the operator
fn degraded_suggestion(retrieval: &RetrievalResult) -> TriageSuggestion {
    let mut actions = vec![
        "Automated triage was unavailable; review the retrieved runbook sections manually"
            .to_string(),
    ];
    actions.extend(
        retrieval
            .chunks
            .iter()
            .take(FALLBACK_SOURCE_LIMIT)
            .map(|chunk| {
                let section = chunk
                    .metadata
                    .heading_path
                    .as_deref()
                    .unwrap_or("(no section)");
                format!(
                    "Consult {} - {} (relevance {:.0}%)",
                    chunk.metadata.document_id,
                    section,
                    chunk.score * 100.0
                )
            }),
    );
    actions.push(
        "Escalate to the on-call lead if the runbook sections do not resolve the alert"
            .to_string(),
    );

    TriageSuggestion {
        summary: format!(
            "Automated triage was unavailable for this alert. {} runbook section(s) matched: {}.",
            retrieval.len(),
            retrieval.source_documents().iter().join(", ")
        ),
        immediate_actions: actions,
        root_cause_hypothesis: "Not determined: automated analysis was unavailable.".to_string(),
        escalation_recommendation:
            "Follow the standard on-call escalation if the alert is not resolved promptly."
                .to_string(),
        confidence: Confidence::Low,
        source_chunks: retrieval.chunks.clone(),
    }
}

/// Explicit response when nothing in the corpus matched above threshold.
///
/// Inventing a plausible-sounding procedure here is the primary operational
/// risk of the system, so this path never consults the model.
fn no_match_suggestion(alert: &ClassifiedAlert) -> TriageSuggestion {
    TriageSuggestion {
        summary: format!(
            "No matching runbook found for \"{}\". The indexed runbooks do not cover this alert.",
            alert.title
        ),
        immediate_actions: vec![
            "Acknowledge the alert and begin manual investigation".to_string(),
            "Check recent deploys and infrastructure changes for likely causes".to_string(),
            "Escalate to the on-call engineer for the affected service".to_string(),
        ],
        root_cause_hypothesis:
            "Unknown: no runbook matched this alert above the similarity threshold.".to_string(),
        escalation_recommendation:
            "Escalate to the service owner and consider adding a runbook for this alert type."
                .to_string(),
        confidence: Confidence::Low,
        source_chunks: Vec::new(),
    }
}
