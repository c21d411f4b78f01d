use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::lancedb::ScoredChunk;

/// Severity of a classified alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Parse a model-supplied severity string; `None` for unknown values
    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" | "info" => Some(Severity::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad category of a classified alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Infrastructure,
    Application,
    Monitoring,
    Unknown,
}

impl AlertType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            AlertType::Infrastructure => "infrastructure",
            AlertType::Application => "application",
            AlertType::Monitoring => "monitoring",
            AlertType::Unknown => "unknown",
        }
    }

    /// Parse a model-supplied alert type string; `None` for unknown values
    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "infrastructure" => Some(AlertType::Infrastructure),
            "application" => Some(AlertType::Application),
            "monitoring" => Some(AlertType::Monitoring),
            "unknown" => Some(AlertType::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for AlertType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence attached to a triage suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fields extracted from a raw alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedAlert {
    pub title: String,
    pub severity: Severity,
    pub alert_type: AlertType,
    /// Affected component when identifiable, empty otherwise
    pub affected_component: String,
    /// The raw alert text the classification was derived from
    pub description: String,
}

/// Structured triage proposal for an alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageSuggestion {
    pub summary: String,
    pub immediate_actions: Vec<String>,
    pub root_cause_hypothesis: String,
    pub escalation_recommendation: String,
    pub confidence: Confidence,
    /// The retrieved chunks actually used to build the suggestion
    pub source_chunks: Vec<ScoredChunk>,
}

/// Terminal state of a triage request.
///
/// Classification failure is not representable: the classifier downgrades to
/// a heuristic instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageState {
    /// The suggestion came from the language model (or the deliberate
    /// no-match response)
    Suggested,
    /// The language model was unavailable or returned malformed output; the
    /// suggestion is the degraded fallback
    SuggestionDegraded,
}

/// Result of a full triage request
#[derive(Debug, Clone)]
pub struct TriageOutcome {
    pub alert: ClassifiedAlert,
    pub suggestion: TriageSuggestion,
    pub state: TriageState,
}
