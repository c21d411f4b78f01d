#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end tests for the triage pipeline: index a small runbook corpus,
//! retrieve against it, and run the full classify -> retrieve -> suggest
//! sequence with fake embedding and language-model adapters.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use runbook_triage::chunker::ChunkingConfig;
use runbook_triage::config::{LlmConfig, SearchConfig};
use runbook_triage::corpus::MarkdownCorpus;
use runbook_triage::database::lancedb::VectorIndex;
use runbook_triage::database::sqlite::Database;
use runbook_triage::embeddings::EmbeddingProvider;
use runbook_triage::indexer::Indexer;
use runbook_triage::llm::{CompletionRequest, LanguageModel};
use runbook_triage::retriever::Retriever;
use runbook_triage::triage::{
    AlertType, Classifier, Confidence, Severity, SuggestionGenerator, TriageService, TriageState,
};

const AXES: [&str; 6] = ["disk", "memory", "timeout", "cpu", "network", "http"];

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = AXES
        .iter()
        .map(|axis| lower.matches(axis).count() as f32)
        .collect();
    vector.push(0.25);

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    for value in &mut vector {
        *value /= norm;
    }
    vector
}

#[derive(Debug, Default)]
struct StubEmbedder;

impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embedder"
    }

    fn dimension(&self) -> usize {
        AXES.len() + 1
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Routes canned responses by prompt shape; either leg can simulate an outage
struct RoutedLlm {
    classification: Option<&'static str>,
    triage: Option<&'static str>,
}

impl LanguageModel for RoutedLlm {
    fn model_name(&self) -> &str {
        "routed-llm"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = if request.prompt.contains("classify it") {
            self.classification
        } else {
            self.triage
        };
        response
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Simulated model outage"))
    }
}

const CLASSIFICATION_RESPONSE: &str = r#"{
    "alert_type": "infrastructure",
    "severity": "critical",
    "title": "Disk usage critical on web-01",
    "affected_component": "web-01"
}"#;

const TRIAGE_RESPONSE: &str = r#"{
    "summary": "web-01 is nearly out of disk; the service will fail without cleanup.",
    "immediate_actions": ["Free disk space under /var/log", "Verify usage drops below 80%"],
    "root_cause_hypothesis": "Log rotation stopped working.",
    "escalation_recommendation": "Escalate to infrastructure on-call if cleanup does not help.",
    "confidence": "high"
}"#;

fn runbooks_dir(root: &Path) -> PathBuf {
    root.join("runbooks")
}

fn write_runbook(root: &Path, relative: &str, content: &str) {
    let path = runbooks_dir(root).join(relative);
    fs::create_dir_all(path.parent().expect("runbook path should have a parent"))
        .expect("should create runbook directory");
    fs::write(path, content).expect("should write runbook");
}

/// The three-runbook corpus from the reference scenario
fn seed_corpus(root: &Path) {
    write_runbook(
        root,
        "infrastructure/disk-full.md",
        "# Disk Full Runbook\n\n## Diagnosis\n\nCheck disk usage with df and \
         locate the largest directories on the affected disk.\n\n## Remediation\n\n\
         Free disk space by rotating logs and clearing old artifacts, then \
         verify disk usage drops.\n",
    );
    write_runbook(
        root,
        "infrastructure/memory-pressure.md",
        "# Memory Pressure Runbook\n\n## Diagnosis\n\nInspect memory usage per \
         process and check whether the OOM killer fired.\n\n## Remediation\n\n\
         Restart the process leaking memory and add a memory limit.\n",
    );
    write_runbook(
        root,
        "application/request-timeouts.md",
        "# Request Timeout Runbook\n\n## Diagnosis\n\nFind which upstream hits \
         the timeout and inspect connection pool saturation.\n\n## Remediation\n\n\
         Tune the timeout and recycle exhausted connection pools.\n",
    );
}

struct Pipeline {
    indexer: Indexer,
    retriever: Retriever,
    service: TriageService,
    vector_index: Arc<VectorIndex>,
    database: Database,
}

async fn build_pipeline(root: &Path, llm: Arc<dyn LanguageModel>) -> Pipeline {
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(StubEmbedder);

    let database = Database::new(root.join("metadata.db"))
        .await
        .expect("should create database");
    let vector_index = Arc::new(
        VectorIndex::new(root.join("vectors"), embeddings.dimension())
            .await
            .expect("should create vector index"),
    );

    let indexer = Indexer::new(
        MarkdownCorpus::new(runbooks_dir(root)),
        database.clone(),
        Arc::clone(&vector_index),
        Arc::clone(&embeddings),
        ChunkingConfig::default(),
    );

    let llm_config = LlmConfig::default();
    let search = SearchConfig::default();

    let retriever = Retriever::new(Arc::clone(&vector_index), Arc::clone(&embeddings));
    let service = TriageService::new(
        Classifier::new(Arc::clone(&llm), llm_config.clone()),
        Retriever::new(Arc::clone(&vector_index), embeddings),
        SuggestionGenerator::new(llm, llm_config, search.context_budget_tokens),
        search,
    );

    Pipeline {
        indexer,
        retriever,
        service,
        vector_index,
        database,
    }
}

#[tokio::test]
async fn disk_alert_scenario_end_to_end() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    seed_corpus(temp_dir.path());

    let llm = Arc::new(RoutedLlm {
        classification: Some(CLASSIFICATION_RESPONSE),
        triage: Some(TRIAGE_RESPONSE),
    });
    let pipeline = build_pipeline(temp_dir.path(), llm).await;

    let summary = pipeline
        .indexer
        .reindex(false)
        .await
        .expect("reindex should succeed");
    assert_eq!(summary.added, 3);
    assert!(!summary.has_failures());

    // Querying for a disk alert must rank the disk runbook first
    let result = pipeline
        .retriever
        .search("server disk full at 95%", 5, 0.3)
        .await
        .expect("search should succeed");
    assert!(!result.is_empty());
    assert_eq!(
        result.chunks[0].metadata.document_id,
        "infrastructure/disk-full.md"
    );

    // Full pipeline
    let outcome = pipeline
        .service
        .triage("server disk full at 95% on web-01")
        .await
        .expect("triage should succeed");

    assert_eq!(outcome.state, TriageState::Suggested);
    assert_eq!(outcome.alert.alert_type, AlertType::Infrastructure);
    assert_eq!(outcome.alert.severity, Severity::Critical);
    assert_eq!(outcome.suggestion.confidence, Confidence::High);
    assert!(
        outcome
            .suggestion
            .source_chunks
            .iter()
            .any(|c| c.metadata.document_id == "infrastructure/disk-full.md")
    );
}

#[tokio::test]
async fn classification_falls_back_when_model_is_down() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    seed_corpus(temp_dir.path());

    let llm = Arc::new(RoutedLlm {
        classification: None,
        triage: None,
    });
    let pipeline = build_pipeline(temp_dir.path(), llm).await;
    pipeline
        .indexer
        .reindex(false)
        .await
        .expect("reindex should succeed");

    let outcome = pipeline
        .service
        .triage("server disk full at 95% on web-01")
        .await
        .expect("triage must not fail on model outage");

    // Heuristic classification of the reference alert
    assert_eq!(outcome.alert.alert_type, AlertType::Infrastructure);
    assert_eq!(outcome.alert.severity, Severity::Critical);

    // Degraded suggestion is still fully populated and labeled
    assert_eq!(outcome.state, TriageState::SuggestionDegraded);
    assert_eq!(outcome.suggestion.confidence, Confidence::Low);
    assert!(!outcome.suggestion.immediate_actions.is_empty());
    assert!(
        outcome
            .suggestion
            .immediate_actions
            .iter()
            .any(|a| a.contains("disk-full"))
    );
}

#[tokio::test]
async fn unmatched_alert_is_reported_honestly() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    seed_corpus(temp_dir.path());

    let llm = Arc::new(RoutedLlm {
        classification: None,
        triage: Some(TRIAGE_RESPONSE),
    });
    let pipeline = build_pipeline(temp_dir.path(), llm).await;
    pipeline
        .indexer
        .reindex(false)
        .await
        .expect("reindex should succeed");

    let outcome = pipeline
        .service
        .triage("certificate renewal failed for the internal CA")
        .await
        .expect("triage should succeed");

    assert!(outcome.suggestion.summary.contains("No matching runbook"));
    assert_eq!(outcome.suggestion.confidence, Confidence::Low);
    assert!(outcome.suggestion.source_chunks.is_empty());
    // The canned triage response must not leak through
    assert!(!outcome.suggestion.summary.contains("web-01"));
}

#[tokio::test]
async fn reindex_is_incremental_across_runs() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    seed_corpus(temp_dir.path());

    let llm = Arc::new(RoutedLlm {
        classification: None,
        triage: None,
    });
    let pipeline = build_pipeline(temp_dir.path(), llm).await;

    let first = pipeline
        .indexer
        .reindex(false)
        .await
        .expect("reindex should succeed");
    assert_eq!(first.added, 3);

    let second = pipeline
        .indexer
        .reindex(false)
        .await
        .expect("reindex should succeed");
    assert_eq!(second.added, 0);
    assert_eq!(second.unchanged, 3);

    // Edit one runbook; only that document is re-processed
    write_runbook(
        temp_dir.path(),
        "infrastructure/memory-pressure.md",
        "# Memory Pressure Runbook\n\nRevised: capture a heap profile before \
         restarting the process leaking memory.\n",
    );

    let third = pipeline
        .indexer
        .reindex(false)
        .await
        .expect("reindex should succeed");
    assert_eq!(third.updated, 1);
    assert_eq!(third.unchanged, 2);

    // Removing a runbook cleans up its entries
    fs::remove_file(runbooks_dir(temp_dir.path()).join("application/request-timeouts.md"))
        .expect("should remove runbook");

    let fourth = pipeline
        .indexer
        .reindex(false)
        .await
        .expect("reindex should succeed");
    assert_eq!(fourth.deleted, 1);

    assert_eq!(
        pipeline
            .database
            .count_documents()
            .await
            .expect("count should succeed"),
        2
    );

    let timeout_results = pipeline
        .vector_index
        .query(&keyword_vector("request timeout"), 10, 0.0)
        .await
        .expect("query should succeed");
    assert!(
        timeout_results
            .iter()
            .all(|r| r.metadata.document_id != "application/request-timeouts.md")
    );
}
