use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::llm::{CompletionRequest, LanguageModel, extract_json_block, prompts};
use crate::triage::types::{AlertType, ClassifiedAlert, Severity};

/// Low temperature keeps classification output stable across retries
const CLASSIFY_TEMPERATURE: f32 = 0.1;

const MAX_TITLE_LEN: usize = 100;

/// Extracts structured fields from a raw alert.
///
/// Never fails: when the language model is unreachable or returns output
/// that cannot be parsed, classification falls back to a deterministic
/// keyword heuristic, so the pipeline always gets *some* classification.
pub struct Classifier {
    llm: Arc<dyn LanguageModel>,
    config: LlmConfig,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    alert_type: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    affected_component: Option<String>,
}

impl Classifier {
    #[inline]
    pub fn new(llm: Arc<dyn LanguageModel>, config: LlmConfig) -> Self {
        Self { llm, config }
    }

    #[inline]
    pub fn classify(&self, raw_alert: &str) -> ClassifiedAlert {
        match self.classify_with_model(raw_alert) {
            Ok(alert) => {
                debug!(
                    "Model classification: type={}, severity={}",
                    alert.alert_type, alert.severity
                );
                alert
            }
            Err(e) => {
                warn!(
                    "Classification downgraded to heuristic rules: {:#}",
                    e
                );
                heuristic_classify(raw_alert)
            }
        }
    }

    fn classify_with_model(&self, raw_alert: &str) -> Result<ClassifiedAlert> {
        let request = CompletionRequest {
            system: String::new(),
            prompt: prompts::classification_prompt(raw_alert),
            temperature: CLASSIFY_TEMPERATURE,
            max_tokens: self.config.max_tokens,
            timeout: Duration::from_secs(self.config.timeout_seconds),
        };

        let response = self.llm.complete(&request)?;

        parse_classification(raw_alert, &response).ok_or_else(|| {
            warn!("Malformed classification response: {:.200}", response);
            anyhow::anyhow!("Malformed classification response")
        })
    }
}

fn parse_classification(raw_alert: &str, response: &str) -> Option<ClassifiedAlert> {
    let block = extract_json_block(response)?;
    let parsed: RawClassification = serde_json::from_str(&block).ok()?;

    // Unknown enum values degrade field-wise rather than discarding the
    // whole response
    let severity = Severity::parse(&parsed.severity).unwrap_or(Severity::Medium);
    let alert_type = AlertType::parse(&parsed.alert_type).unwrap_or(AlertType::Unknown);

    let title = if parsed.title.trim().is_empty() {
        default_title(raw_alert)
    } else {
        truncate_chars(parsed.title.trim(), MAX_TITLE_LEN)
    };

    Some(ClassifiedAlert {
        title,
        severity,
        alert_type,
        affected_component: parsed.affected_component.unwrap_or_default(),
        description: raw_alert.to_string(),
    })
}

/// Deterministic keyword/pattern classification used when the model is
/// unavailable
#[inline]
pub fn heuristic_classify(raw_alert: &str) -> ClassifiedAlert {
    let lower = raw_alert.to_lowercase();

    ClassifiedAlert {
        title: default_title(raw_alert),
        severity: heuristic_severity(&lower),
        alert_type: heuristic_alert_type(&lower),
        affected_component: extract_component(raw_alert),
        description: raw_alert.to_string(),
    }
}

const INFRASTRUCTURE_KEYWORDS: [&str; 10] = [
    "disk", "memory", "oom", "cpu", "network", "server", "node", "filesystem", "swap",
    "load average",
];

const APPLICATION_KEYWORDS: [&str; 10] = [
    "http", "5xx", "500", "exception", "crash", "timeout", "deadlock", "stack trace",
    "error rate", "panic",
];

const MONITORING_KEYWORDS: [&str; 7] = [
    "threshold", "metric", "anomaly", "alert storm", "heartbeat", "missing data", "flapping",
];

fn heuristic_alert_type(lower: &str) -> AlertType {
    let count = |keywords: &[&str]| -> usize {
        keywords
            .iter()
            .map(|keyword| lower.matches(keyword).count())
            .sum()
    };

    let scores = [
        (AlertType::Infrastructure, count(&INFRASTRUCTURE_KEYWORDS)),
        (AlertType::Application, count(&APPLICATION_KEYWORDS)),
        (AlertType::Monitoring, count(&MONITORING_KEYWORDS)),
    ];

    let (best_type, best_score) = scores
        .iter()
        .copied()
        .max_by_key(|(_, score)| *score)
        .unwrap_or((AlertType::Unknown, 0));

    // max_by_key returns the last maximum; prefer the first category in
    // table order on ties
    let (first_best, _) = scores
        .iter()
        .copied()
        .find(|(_, score)| *score == best_score)
        .unwrap_or((best_type, best_score));

    if best_score == 0 {
        AlertType::Unknown
    } else {
        first_best
    }
}

const CRITICAL_KEYWORDS: [&str; 8] = [
    "critical", "outage", "down", "data loss", "unavailable", "sev1", "p1", "emergency",
];

const HIGH_KEYWORDS: [&str; 5] = ["high", "degraded", "failing", "sev2", "p2"];

const LOW_KEYWORDS: [&str; 3] = ["low", "info", "notice"];

fn heuristic_severity(lower: &str) -> Severity {
    let max_percent = extract_percentages(lower)
        .into_iter()
        .fold(f32::NEG_INFINITY, f32::max);

    if CRITICAL_KEYWORDS.iter().any(|k| lower.contains(k)) || max_percent >= 95.0 {
        Severity::Critical
    } else if HIGH_KEYWORDS.iter().any(|k| lower.contains(k)) || max_percent >= 85.0 {
        Severity::High
    } else if LOW_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Severity::Low
    } else {
        Severity::Medium
    }
}

/// Pull out percentage figures like "95%" or "(97.5%)"
fn extract_percentages(text: &str) -> Vec<f32> {
    text.split_whitespace()
        .filter_map(|token| {
            let trimmed =
                token.trim_matches(|c: char| !c.is_ascii_digit() && c != '%' && c != '.');
            let number = trimmed.strip_suffix('%')?;
            number.parse::<f32>().ok()
        })
        .collect()
}

/// Best-effort extraction of a host-like component token (e.g. "web-01")
fn extract_component(raw_alert: &str) -> String {
    raw_alert
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-'))
        .find(|token| {
            token.contains('-')
                && token.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && token.chars().last().is_some_and(|c| c.is_ascii_digit())
        })
        .unwrap_or_default()
        .to_string()
}

fn default_title(raw_alert: &str) -> String {
    let first_line = raw_alert.lines().next().unwrap_or(raw_alert).trim();
    truncate_chars(first_line, MAX_TITLE_LEN)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LanguageModel;
    use anyhow::Result;

    /// Canned language model for exercising the classification paths
    struct CannedLlm {
        response: Option<&'static str>,
    }

    impl CannedLlm {
        fn returning(response: &'static str) -> Arc<Self> {
            Arc::new(Self {
                response: Some(response),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { response: None })
        }
    }

    impl LanguageModel for CannedLlm {
        fn model_name(&self) -> &str {
            "canned-llm"
        }

        fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            self.response
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("Simulated model outage"))
        }
    }

    fn classifier(llm: Arc<dyn LanguageModel>) -> Classifier {
        Classifier::new(llm, LlmConfig::default())
    }

    #[test]
    fn model_response_is_parsed() {
        let llm = CannedLlm::returning(
            r#"{"alert_type": "infrastructure", "severity": "critical",
                "title": "Disk usage critical on web-01",
                "affected_component": "web-01"}"#,
        );

        let alert = classifier(llm).classify("disk full at 97% on web-01");

        assert_eq!(alert.alert_type, AlertType::Infrastructure);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.title, "Disk usage critical on web-01");
        assert_eq!(alert.affected_component, "web-01");
        assert_eq!(alert.description, "disk full at 97% on web-01");
    }

    #[test]
    fn fenced_model_response_is_parsed() {
        let llm = CannedLlm::returning(
            "```json\n{\"alert_type\": \"application\", \"severity\": \"high\", \
             \"title\": \"Elevated 5xx rate\"}\n```",
        );

        let alert = classifier(llm).classify("5xx spike on checkout service");

        assert_eq!(alert.alert_type, AlertType::Application);
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn unknown_enum_values_degrade_field_wise() {
        let llm = CannedLlm::returning(
            r#"{"alert_type": "cosmic-rays", "severity": "apocalyptic", "title": "Odd alert"}"#,
        );

        let alert = classifier(llm).classify("something odd");

        assert_eq!(alert.alert_type, AlertType::Unknown);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.title, "Odd alert");
    }

    #[test]
    fn model_failure_falls_back_to_heuristic() {
        let alert =
            classifier(CannedLlm::failing()).classify("server disk full at 95% on web-01");

        assert_eq!(alert.alert_type, AlertType::Infrastructure);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.affected_component, "web-01");
        assert!(!alert.title.is_empty());
    }

    #[test]
    fn malformed_model_response_falls_back_to_heuristic() {
        let llm = CannedLlm::returning("I think this looks like a disk problem, maybe?");

        let alert = classifier(llm).classify("OOM killer invoked on worker-07");

        assert_eq!(alert.alert_type, AlertType::Infrastructure);
        assert_eq!(alert.affected_component, "worker-07");
    }

    #[test]
    fn heuristic_alert_types() {
        assert_eq!(
            heuristic_classify("disk usage at 50%").alert_type,
            AlertType::Infrastructure
        );
        assert_eq!(
            heuristic_classify("HTTP 500 errors from payments").alert_type,
            AlertType::Application
        );
        assert_eq!(
            heuristic_classify("metric threshold breached for queue depth").alert_type,
            AlertType::Monitoring
        );
        assert_eq!(
            heuristic_classify("something happened").alert_type,
            AlertType::Unknown
        );
    }

    #[test]
    fn heuristic_severity_from_percentages() {
        assert_eq!(
            heuristic_classify("disk at 96% on db-01").severity,
            Severity::Critical
        );
        assert_eq!(
            heuristic_classify("disk at 88% on db-01").severity,
            Severity::High
        );
        assert_eq!(
            heuristic_classify("disk at 70% on db-01").severity,
            Severity::Medium
        );
        assert_eq!(
            heuristic_classify("notice: disk at 40%").severity,
            Severity::Low
        );
    }

    #[test]
    fn heuristic_severity_keywords() {
        assert_eq!(
            heuristic_classify("service down: checkout unavailable").severity,
            Severity::Critical
        );
        assert_eq!(
            heuristic_classify("degraded response times on api").severity,
            Severity::High
        );
    }

    #[test]
    fn title_is_first_line_truncated() {
        let long_line = "x".repeat(300);
        let alert = heuristic_classify(&long_line);
        assert_eq!(alert.title.chars().count(), 100);

        let multi_line = heuristic_classify("first line\nsecond line");
        assert_eq!(multi_line.title, "first line");
    }

    #[test]
    fn percentage_extraction() {
        assert_eq!(extract_percentages("disk at 95% full"), vec![95.0]);
        assert_eq!(extract_percentages("(97.5%)"), vec![97.5]);
        assert_eq!(extract_percentages("usage >95% now"), vec![95.0]);
        assert!(extract_percentages("no percentages here").is_empty());
    }
}
