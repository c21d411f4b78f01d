use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::corpus::MarkdownCorpus;
use crate::database::lancedb::VectorIndex;
use crate::database::sqlite::Database;
use crate::embeddings::{EmbeddingProvider, OllamaEmbeddingClient};
use crate::indexer::Indexer;
use crate::llm::{LanguageModel, OllamaChatClient};
use crate::retriever::Retriever;
use crate::triage::{Classifier, SuggestionGenerator, TriageService, TriageState};

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir().context("Failed to determine config directory")?;
    Config::load(config_dir)
}

async fn open_index(config: &Config) -> Result<(Database, Arc<VectorIndex>)> {
    std::fs::create_dir_all(&config.base_dir).with_context(|| {
        format!(
            "Failed to create base directory: {}",
            config.base_dir.display()
        )
    })?;

    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize database")?;

    let vector_index = Arc::new(
        VectorIndex::new(
            config.vector_database_path(),
            config.ollama.embedding_dimension as usize,
        )
        .await
        .context("Failed to initialize vector index")?,
    );

    Ok((database, vector_index))
}

/// Re-index the runbook corpus
#[inline]
pub async fn reindex(force: bool) -> Result<()> {
    let config = load_config()?;
    let (database, vector_index) = open_index(&config).await?;

    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(
        OllamaEmbeddingClient::new(&config.ollama)
            .context("Failed to initialize embedding client")?,
    );

    info!("Starting re-index of {}", config.runbooks_path().display());

    let indexer = Indexer::new(
        MarkdownCorpus::new(config.runbooks_path()),
        database,
        vector_index,
        embeddings,
        config.chunking.clone(),
    );

    let summary = indexer.reindex(force).await?;

    println!("Re-index complete:");
    println!("  Added:     {}", summary.added);
    println!("  Updated:   {}", summary.updated);
    println!("  Deleted:   {}", summary.deleted);
    println!("  Unchanged: {}", summary.unchanged);

    if summary.has_failures() {
        println!(
            "  {} {}",
            style("Failed:").red(),
            summary.failed.len()
        );
        for (id, error) in &summary.failed {
            println!("    {} - {}", id, error);
        }
    }

    Ok(())
}

/// Plain semantic search over the indexed runbooks
#[inline]
pub async fn search(query: &str, limit: Option<usize>, min_score: Option<f32>) -> Result<()> {
    let config = load_config()?;
    let (_database, vector_index) = open_index(&config).await?;

    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(
        OllamaEmbeddingClient::new(&config.ollama)
            .context("Failed to initialize embedding client")?,
    );

    let retriever = Retriever::new(vector_index, embeddings);
    let result = retriever
        .search(
            query,
            limit.unwrap_or(config.search.top_k),
            min_score.unwrap_or(config.search.min_score),
        )
        .await?;

    if result.is_empty() {
        println!("No runbook sections matched above the similarity threshold.");
        return Ok(());
    }

    println!("Found {} matching sections:\n", result.len());
    for (i, chunk) in result.chunks.iter().enumerate() {
        let section = chunk
            .metadata
            .heading_path
            .as_deref()
            .unwrap_or("(no section)");
        println!(
            "{} {} - {} ({:.0}%)",
            style(format!("{}.", i + 1)).bold(),
            chunk.metadata.document_id,
            section,
            chunk.score * 100.0
        );

        for line in chunk.metadata.content.lines().take(4) {
            println!("   {}", line);
        }
        println!();
    }

    Ok(())
}

/// Run the full triage pipeline for a raw alert
#[inline]
pub async fn triage(alert_text: &str) -> Result<()> {
    let config = load_config()?;
    let (_database, vector_index) = open_index(&config).await?;

    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(
        OllamaEmbeddingClient::new(&config.ollama)
            .context("Failed to initialize embedding client")?,
    );
    let llm: Arc<dyn LanguageModel> = Arc::new(
        OllamaChatClient::new(&config.ollama, &config.llm)
            .context("Failed to initialize language model client")?,
    );

    let service = TriageService::new(
        Classifier::new(Arc::clone(&llm), config.llm.clone()),
        Retriever::new(vector_index, embeddings),
        SuggestionGenerator::new(llm, config.llm.clone(), config.search.context_budget_tokens),
        config.search.clone(),
    );

    let outcome = service.triage(alert_text).await?;

    println!("{}", style("Classification").bold().underlined());
    println!("  Title:     {}", outcome.alert.title);
    println!("  Type:      {}", outcome.alert.alert_type);
    println!(
        "  Severity:  {}",
        style_severity(outcome.alert.severity.as_str())
    );
    if !outcome.alert.affected_component.is_empty() {
        println!("  Component: {}", outcome.alert.affected_component);
    }
    println!();

    println!("{}", style("Suggestion").bold().underlined());
    if outcome.state == TriageState::SuggestionDegraded {
        println!(
            "  {}",
            style("(automated analysis unavailable; fallback guidance below)").yellow()
        );
    }
    println!("  Summary: {}", outcome.suggestion.summary);
    println!("  Immediate actions:");
    for (i, action) in outcome.suggestion.immediate_actions.iter().enumerate() {
        println!("    {}. {}", i + 1, action);
    }
    println!(
        "  Root cause: {}",
        outcome.suggestion.root_cause_hypothesis
    );
    println!(
        "  Escalation: {}",
        outcome.suggestion.escalation_recommendation
    );
    println!("  Confidence: {}", outcome.suggestion.confidence);

    if !outcome.suggestion.source_chunks.is_empty() {
        println!();
        println!("{}", style("Sources").bold().underlined());
        for chunk in &outcome.suggestion.source_chunks {
            let section = chunk
                .metadata
                .heading_path
                .as_deref()
                .unwrap_or("(no section)");
            println!(
                "  {} - {} ({:.0}%)",
                chunk.metadata.document_id,
                section,
                chunk.score * 100.0
            );
        }
    }

    Ok(())
}

fn style_severity(severity: &str) -> String {
    match severity {
        "critical" => style(severity).red().bold().to_string(),
        "high" => style(severity).red().to_string(),
        "medium" => style(severity).yellow().to_string(),
        _ => style(severity).dim().to_string(),
    }
}

/// Show status of the index and configured models
#[inline]
pub async fn show_status() -> Result<()> {
    let config = load_config()?;
    let (database, vector_index) = open_index(&config).await?;

    let documents = database.list_documents().await?;
    let chunk_count = vector_index.count().await?;

    println!("Runbook corpus: {}", config.runbooks_path().display());
    println!("Indexed documents: {}", documents.len());
    println!("Indexed chunks: {}", chunk_count);
    println!("Embedding model: {}", config.ollama.model);
    println!("Language model: {}", config.llm.model);

    if !documents.is_empty() {
        println!();
        println!("Documents:");
        for record in &documents {
            println!(
                "  {} [{}] ({} chunks, indexed {})",
                record.id,
                record.category,
                record.chunk_count,
                record.indexed_date.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    let embeddings = OllamaEmbeddingClient::new(&config.ollama)?;
    match embeddings.ping() {
        Ok(()) => println!("\nOllama: {}", style("reachable").green()),
        Err(e) => println!("\nOllama: {} ({:#})", style("unreachable").red(), e),
    }

    Ok(())
}

/// Print the resolved configuration, or write a default config file
#[inline]
pub fn show_config(show: bool) -> Result<()> {
    let config = load_config()?;

    if show {
        let content =
            toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
        println!("# {}", config.config_file_path().display());
        print!("{}", content);
        return Ok(());
    }

    if config.config_file_path().exists() {
        println!(
            "Configuration file already exists: {}",
            config.config_file_path().display()
        );
        println!("Edit it directly, or run with --show to print the resolved values.");
    } else {
        config.save().context("Failed to write configuration")?;
        println!(
            "Wrote default configuration to {}",
            config.config_file_path().display()
        );
    }

    Ok(())
}
