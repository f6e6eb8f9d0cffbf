//! Side-effect report model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity reported by the patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSeverity {
    Mild,
    Moderate,
    Severe,
}

impl ReportSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportSeverity::Mild => "mild",
            ReportSeverity::Moderate => "moderate",
            ReportSeverity::Severe => "severe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mild" => Some(ReportSeverity::Mild),
            "moderate" => Some(ReportSeverity::Moderate),
            "severe" => Some(ReportSeverity::Severe),
            _ => None,
        }
    }
}

/// A patient-submitted side-effect report.
///
/// Read-only to analytics. Only reports with `is_anonymous` set participate
/// in cross-patient statistics; counting a non-anonymous report in an
/// aggregate is a correctness bug, not a tuning choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SideEffectReport {
    pub id: String,
    pub drug_id: String,
    pub prescription_id: Option<String>,
    pub patient_id: String,
    /// Free-text description from the patient
    pub description: String,
    pub severity: ReportSeverity,
    /// Set by the AI judgment at submission time
    pub is_concerning: bool,
    /// Whether the report may feed cross-patient analytics
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl SideEffectReport {
    /// Create a new report. Defaults to non-anonymous and non-concerning.
    pub fn new(
        drug_id: impl Into<String>,
        patient_id: impl Into<String>,
        description: impl Into<String>,
        severity: ReportSeverity,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            drug_id: drug_id.into(),
            prescription_id: None,
            patient_id: patient_id.into(),
            description: description.into(),
            severity,
            is_concerning: false,
            is_anonymous: false,
            created_at: Utc::now(),
        }
    }

    /// Mark the report as eligible for cross-patient analytics.
    pub fn anonymous(mut self) -> Self {
        self.is_anonymous = true;
        self
    }
}

/// Report counts broken down by reported severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub mild: u32,
    pub moderate: u32,
    pub severe: u32,
}

impl SeverityCounts {
    pub fn total(&self) -> u32 {
        self.mild + self.moderate + self.severe
    }
}
