//! Structured judgments parsed from text-analysis model output.
//!
//! Parsing is strict: the payload is sliced to the outermost JSON object and
//! handed to serde. Anything that fails to parse or carries an out-of-range
//! confidence is an error; callers substitute the documented fallback values
//! instead of attempting further string repair.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analysis errors.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

// =========================================================================
// Side-effect assessment
// =========================================================================

/// Input for a single side-effect assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideEffectInput {
    /// Free-text description reported by the patient
    pub description: String,
    /// Reported severity ("mild", "moderate", "severe")
    pub severity: String,
    /// Impact on daily life, if reported
    pub impact_on_daily_life: Option<String>,
    /// Name of the suspected drug
    pub drug_name: String,
    /// Patient age, if available
    pub patient_age: Option<u32>,
    /// Other medications the patient is taking
    pub other_medications: Vec<String>,
}

/// Concern level assigned by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcernLevel {
    Low,
    Moderate,
    High,
}

/// Follow-up urgency assigned by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Routine,
    Urgent,
}

/// Structured judgment for one side-effect report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideEffectAssessment {
    pub concern_level: ConcernLevel,
    pub is_concerning: bool,
    pub urgency: Urgency,
    pub recommendations: Vec<String>,
    pub reasoning: String,
}

impl SideEffectAssessment {
    /// Deterministic fallback when the analysis service is unavailable or
    /// returns an unusable response: moderate concern, concerning only for
    /// severe reports.
    pub fn fallback(reported_severity: &str) -> Self {
        let severe = reported_severity.eq_ignore_ascii_case("severe");
        Self {
            concern_level: ConcernLevel::Moderate,
            is_concerning: severe,
            urgency: if severe {
                Urgency::Urgent
            } else {
                Urgency::Routine
            },
            recommendations: vec![
                "Monitor symptoms closely".into(),
                "Contact healthcare provider if symptoms worsen".into(),
            ],
            reasoning: "Analysis service unavailable, basic assessment applied".into(),
        }
    }
}

// =========================================================================
// Drug interaction judgment
// =========================================================================

/// One drug as presented to the interaction analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugSummary {
    pub name: String,
    pub description: String,
}

/// Input for a pairwise interaction judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionQuery {
    pub drug_1: DrugSummary,
    pub drug_2: DrugSummary,
    /// Recent anonymous side-effect report excerpts for either drug
    pub report_excerpts: Vec<String>,
}

/// Interaction severity as judged by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgedSeverity {
    Minor,
    Moderate,
    Major,
    Contraindicated,
}

impl JudgedSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            JudgedSeverity::Minor => "minor",
            JudgedSeverity::Moderate => "moderate",
            JudgedSeverity::Major => "major",
            JudgedSeverity::Contraindicated => "contraindicated",
        }
    }
}

/// Structured judgment for one drug pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionJudgment {
    pub has_interaction: bool,
    pub severity: JudgedSeverity,
    pub description: String,
    pub confidence: f64,
}

impl InteractionJudgment {
    /// Deterministic fallback: no interaction, zero confidence. Callers gate
    /// on confidence, so the fallback can never create a record.
    pub fn fallback() -> Self {
        Self {
            has_interaction: false,
            severity: JudgedSeverity::Minor,
            description: "Interaction analysis unavailable".into(),
            confidence: 0.0,
        }
    }
}

// =========================================================================
// Analytics insights
// =========================================================================

/// Input for a narrative insights summary over aggregated drug stats.
#[derive(Debug, Clone, Serialize)]
pub struct InsightsInput {
    pub drug_stats: serde_json::Value,
    pub window_days: i64,
}

/// Narrative insights over an analytics window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsSummary {
    pub patterns: Vec<String>,
    pub alerts: Vec<String>,
    pub summary: String,
}

impl InsightsSummary {
    /// Deterministic fallback: empty lists with a fixed summary string.
    pub fn fallback() -> Self {
        Self {
            patterns: Vec::new(),
            alerts: Vec::new(),
            summary: "Insights unavailable".into(),
        }
    }
}

// =========================================================================
// Parsing
// =========================================================================

/// Slice the outermost JSON object out of model text and parse it.
///
/// Models occasionally wrap the payload in prose; everything before the first
/// `{` and after the last `}` is discarded. No other repair is attempted.
pub fn parse_json_payload<T: DeserializeOwned>(text: &str) -> AnalysisResult<T> {
    let start = text
        .find('{')
        .ok_or_else(|| AnalysisError::InvalidFormat("no JSON object in response".into()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| AnalysisError::InvalidFormat("no closing brace in response".into()))?;
    if end < start {
        return Err(AnalysisError::InvalidFormat(
            "mismatched braces in response".into(),
        ));
    }

    Ok(serde_json::from_str(&text[start..=end])?)
}

/// Parse a side-effect assessment from model text.
pub fn parse_side_effect_assessment(text: &str) -> AnalysisResult<SideEffectAssessment> {
    parse_json_payload(text)
}

/// Parse an interaction judgment from model text, rejecting out-of-range
/// confidence instead of clamping it.
pub fn parse_interaction_judgment(text: &str) -> AnalysisResult<InteractionJudgment> {
    let judgment: InteractionJudgment = parse_json_payload(text)?;

    if !judgment.confidence.is_finite() || !(0.0..=1.0).contains(&judgment.confidence) {
        return Err(AnalysisError::InvalidFormat(format!(
            "confidence out of range: {}",
            judgment.confidence
        )));
    }

    Ok(judgment)
}

/// Parse an insights summary from model text.
pub fn parse_insights_summary(text: &str) -> AnalysisResult<InsightsSummary> {
    parse_json_payload(text)
}
