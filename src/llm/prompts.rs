//! Prompt templates for alert classification and triage suggestions

pub const TRIAGE_SYSTEM_PROMPT: &str = "\
You are an expert SRE/DevOps engineer assisting with production incident triage.
Your role is to:
1. Analyze the alert and assess its severity and impact
2. Suggest immediate actions based on relevant runbook procedures
3. Identify potential root causes
4. Recommend escalation paths if needed

Guidelines:
- Be concise and actionable
- Prioritize system stability
- Reference specific runbook procedures when available
- Only recommend procedures that appear in the provided runbook sections";

/// Build the classification prompt for a raw alert
#[inline]
pub fn classification_prompt(raw_alert: &str) -> String {
    format!(
        "Analyze this production alert and classify it.

Alert Text:
{raw_alert}

Respond with ONLY valid JSON in this exact format (no additional text):
{{
    \"alert_type\": \"infrastructure|application|monitoring|unknown\",
    \"severity\": \"critical|high|medium|low\",
    \"title\": \"brief descriptive title (max 100 chars)\",
    \"affected_component\": \"component name or empty string if unknown\"
}}

Classification Guidelines:
- alert_type:
  - \"infrastructure\": Server, network, disk, memory, CPU issues
  - \"application\": HTTP errors, exceptions, crashes, timeouts
  - \"monitoring\": Alert threshold breaches, metric anomalies

- severity:
  - \"critical\": Service down, data at risk, immediate action required
  - \"high\": Significant degradation, affects many users
  - \"medium\": Noticeable impact, needs attention soon
  - \"low\": Minor issue, can be scheduled"
    )
}

/// Build the triage prompt from classified alert fields and formatted
/// runbook context
#[inline]
pub fn triage_prompt(
    title: &str,
    alert_type: &str,
    severity: &str,
    description: &str,
    runbook_context: &str,
) -> String {
    format!(
        "## Alert Information
**Title:** {title}
**Type:** {alert_type}
**Severity:** {severity}
**Description:** {description}

## Relevant Runbook Sections
{runbook_context}

## Task
Based on the alert and runbook information above, respond with ONLY valid JSON
in this exact format (no additional text):
{{
    \"summary\": \"1-2 sentences: what is happening and why it matters\",
    \"immediate_actions\": [\"ordered, specific steps to take right now\"],
    \"root_cause_hypothesis\": \"what likely caused this issue\",
    \"escalation_recommendation\": \"whether to escalate, to whom, with what information\",
    \"confidence\": \"high|medium|low\"
}}

Keep the response concise and actionable. Focus on what needs to be done NOW.
Base immediate actions on the runbook sections provided above."
    )
}
