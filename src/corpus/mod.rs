// Corpus enumeration module
// Walks the runbook directory and produces fingerprinted documents


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Category of a runbook, inferred from its top-level subdirectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Infrastructure,
    Application,
    Monitoring,
    General,
}

impl DocumentCategory {
    /// Map a path component to a category; unknown directories fall back to
    /// `General`
    #[inline]
    pub fn from_path_component(component: &str) -> Self {
        match component.to_ascii_lowercase().as_str() {
            "infrastructure" => DocumentCategory::Infrastructure,
            "application" => DocumentCategory::Application,
            "monitoring" => DocumentCategory::Monitoring,
            _ => DocumentCategory::General,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            DocumentCategory::Infrastructure => "infrastructure",
            DocumentCategory::Application => "application",
            DocumentCategory::Monitoring => "monitoring",
            DocumentCategory::General => "general",
        }
    }

    /// Parse a stored category string; unknown values map to `General`
    #[inline]
    pub fn parse(value: &str) -> Self {
        Self::from_path_component(value)
    }
}

impl fmt::Display for DocumentCategory {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single runbook source file with its content fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusDocument {
    /// Stable path-derived identifier (relative path, `/`-separated)
    pub id: String,
    pub category: DocumentCategory,
    pub content: String,
    /// SHA-256 hex digest of `content`
    pub fingerprint: String,
}

impl CorpusDocument {
    #[inline]
    pub fn new(id: String, category: DocumentCategory, content: String) -> Self {
        let fingerprint = fingerprint(&content);
        Self {
            id,
            category,
            content,
            fingerprint,
        }
    }

    /// Human-readable title derived from the file stem
    #[inline]
    pub fn title(&self) -> &str {
        let name = self.id.rsplit('/').next().unwrap_or(&self.id);
        name.strip_suffix(".md").unwrap_or(name)
    }
}

/// Compute the content fingerprint used for change detection.
///
/// A content hash rather than a modification timestamp: touching a file
/// without changing it must not trigger a re-index, and clock skew must not
/// mask a real change.
#[inline]
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Result of enumerating the corpus: readable documents plus per-file
/// failures that did not abort the walk
#[derive(Debug, Default)]
pub struct CorpusListing {
    pub documents: Vec<CorpusDocument>,
    pub failures: Vec<(String, String)>,
}

/// A directory of markdown runbooks
#[derive(Debug, Clone)]
pub struct MarkdownCorpus {
    root: PathBuf,
}

impl MarkdownCorpus {
    #[inline]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate all markdown documents under the corpus root in
    /// deterministic (sorted) order.
    ///
    /// A file that cannot be read is recorded in `failures` and skipped; the
    /// rest of the corpus is still returned.
    #[inline]
    pub fn enumerate(&self) -> Result<CorpusListing> {
        if !self.root.is_dir() {
            anyhow::bail!(
                "Runbooks directory does not exist: {}",
                self.root.display()
            );
        }

        let mut listing = CorpusListing::default();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to walk corpus entry: {}", e);
                    listing
                        .failures
                        .push((self.root.display().to_string(), e.to_string()));
                    continue;
                }
            };

            if !entry.file_type().is_file() || !is_markdown(entry.path()) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .context("Corpus entry outside of corpus root")?;
            let id = document_id(relative);
            let category = relative
                .components()
                .next()
                .and_then(|c| c.as_os_str().to_str())
                .map_or(DocumentCategory::General, |component| {
                    if relative.components().count() > 1 {
                        DocumentCategory::from_path_component(component)
                    } else {
                        DocumentCategory::General
                    }
                });

            match fs::read_to_string(entry.path()) {
                Ok(content) => {
                    debug!("Enumerated runbook {} ({} bytes)", id, content.len());
                    listing
                        .documents
                        .push(CorpusDocument::new(id, category, content));
                }
                Err(e) => {
                    warn!("Failed to read runbook {}: {}", id, e);
                    listing.failures.push((id, e.to_string()));
                }
            }
        }

        Ok(listing)
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

fn document_id(relative: &Path) -> String {
    let components: Vec<&str> = relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    components.join("/")
}
