//! Prompts for clinical text analysis.
//!
//! Every prompt demands a bare JSON object in an exact shape so the strict
//! parser in [`crate::analysis`] can be applied without string repair.

use crate::analysis::{InsightsInput, InteractionQuery, SideEffectInput};

/// System prompt for side-effect assessment.
pub const SIDE_EFFECT_SYSTEM_PROMPT: &str = "You are a medical AI assistant specializing in drug side effect analysis. \
Provide accurate, helpful assessments while being cautious about medical advice. \
Always recommend consulting healthcare providers for serious concerns.";

/// System prompt for pairwise interaction judgment.
pub const INTERACTION_SYSTEM_PROMPT: &str = "You are a clinical pharmacist AI assistant specializing in drug interaction analysis. \
Provide accurate assessments of potential drug interactions based on pharmacological principles. \
Be conservative in your assessments and always recommend consulting healthcare providers for serious concerns.";

/// System prompt for analytics insights.
pub const INSIGHTS_SYSTEM_PROMPT: &str = "You are a medical data analyst AI assistant. Analyze drug side effect data to \
identify concerning patterns, potential interactions, and safety issues. \
Be thorough but focused on actionable insights.";

/// Build the user prompt for a side-effect assessment.
pub fn make_side_effect_prompt(input: &SideEffectInput) -> String {
    format!(
        r#"Analyze this side effect and respond with ONLY valid JSON (no markdown, no explanations):

Side Effect: {}
Severity: {}
Impact: {}
Drug: {}
Age: {}
Other Meds: {}

Respond with this exact JSON format:
{{
  "concernLevel": "low",
  "isConcerning": false,
  "urgency": "routine",
  "recommendations": ["consult doctor"],
  "reasoning": "analysis summary"
}}"#,
        input.description,
        input.severity,
        input.impact_on_daily_life.as_deref().unwrap_or("Not specified"),
        input.drug_name,
        input
            .patient_age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "Not specified".into()),
        if input.other_medications.is_empty() {
            "None".into()
        } else {
            input.other_medications.join(", ")
        },
    )
}

/// Build the user prompt for a pairwise interaction judgment.
pub fn make_interaction_prompt(query: &InteractionQuery) -> String {
    let excerpts = if query.report_excerpts.is_empty() {
        "None".into()
    } else {
        query.report_excerpts.join("; ")
    };

    format!(
        r#"Analyze potential drug interaction and respond with ONLY valid JSON:

Drug 1: {}
Drug 1 Description: {}

Drug 2: {}
Drug 2 Description: {}

Recent Patient Reports: {}

Respond with this exact JSON format:
{{
  "hasInteraction": false,
  "severity": "minor",
  "description": "no significant interaction detected",
  "confidence": 0.5
}}"#,
        query.drug_1.name,
        query.drug_1.description,
        query.drug_2.name,
        query.drug_2.description,
        excerpts,
    )
}

/// Build the user prompt for an insights summary.
pub fn make_insights_prompt(input: &InsightsInput) -> String {
    format!(
        r#"Analyze drug side effect data over the last {} days and respond with ONLY valid JSON:

Data: {}

Respond with this exact JSON format:
{{
  "patterns": [],
  "alerts": [],
  "summary": "no significant patterns detected"
}}"#,
        input.window_days,
        serde_json::to_string_pretty(&input.drug_stats).unwrap_or_else(|_| "{}".into()),
    )
}
