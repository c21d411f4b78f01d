// Triage module
// classify -> retrieve -> suggest, with explicit fallback behavior


pub mod classifier;
pub mod suggestion;
pub mod types;

use tracing::{debug, info};

use crate::Result;
use crate::config::SearchConfig;
use crate::retriever::Retriever;

pub use classifier::Classifier;
pub use suggestion::{Generation, SuggestionGenerator};
pub use types::{
    AlertType, ClassifiedAlert, Confidence, Severity, TriageOutcome, TriageState, TriageSuggestion,
};

/// Top-level triage pipeline.
///
/// Per request: classify (never fails; downgrades to heuristics), retrieve
/// (the only hard error: the index is a pipeline precondition), generate
/// (never fails; degrades to a labeled low-confidence fallback). No retries
/// happen at this layer; they live inside the model clients.
pub struct TriageService {
    classifier: Classifier,
    retriever: Retriever,
    generator: SuggestionGenerator,
    search: SearchConfig,
}

impl TriageService {
    #[inline]
    pub fn new(
        classifier: Classifier,
        retriever: Retriever,
        generator: SuggestionGenerator,
        search: SearchConfig,
    ) -> Self {
        Self {
            classifier,
            retriever,
            generator,
            search,
        }
    }

    /// Run the full triage pipeline for a raw alert
    #[inline]
    pub async fn triage(&self, raw_alert_text: &str) -> Result<TriageOutcome> {
        let alert = self.classifier.classify(raw_alert_text);
        info!(
            "Classified alert: type={}, severity={}, title=\"{}\"",
            alert.alert_type, alert.severity, alert.title
        );

        let query = format!("{} {}", alert.title, raw_alert_text);
        let retrieval = self
            .retriever
            .search(&query, self.search.top_k, self.search.min_score)
            .await?;
        debug!("Retrieved {} runbook chunks", retrieval.len());

        let generation = self.generator.generate(&alert, &retrieval);
        let state = if generation.is_degraded() {
            TriageState::SuggestionDegraded
        } else {
            TriageState::Suggested
        };

        info!(
            "Triage complete: state={:?}, confidence={}",
            state,
            match &generation {
                Generation::Model(s) | Generation::Degraded(s) | Generation::NoMatch(s) =>
                    s.confidence,
            }
        );

        Ok(TriageOutcome {
            alert,
            suggestion: generation.suggestion(),
            state,
        })
    }
}
