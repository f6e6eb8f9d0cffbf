//! Analytics alert models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DrugPair;

/// Kind of finding an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SideEffectSpike,
    DrugInteraction,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SideEffectSpike => "side_effect_spike",
            AlertType::DrugInteraction => "drug_interaction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "side_effect_spike" => Some(AlertType::SideEffectSpike),
            "drug_interaction" => Some(AlertType::DrugInteraction),
            _ => None,
        }
    }
}

/// Operational severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(AlertSeverity::Low),
            "medium" => Some(AlertSeverity::Medium),
            "high" => Some(AlertSeverity::High),
            "critical" => Some(AlertSeverity::Critical),
            _ => None,
        }
    }
}

/// What an alert is about, used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSubject {
    /// A single drug (spike alerts)
    Drug(String),
    /// An unordered drug pair (interaction alerts)
    Pair(DrugPair),
}

impl AlertSubject {
    /// Stable key: two alerts about the same subject share this key.
    pub fn key(&self) -> String {
        match self {
            AlertSubject::Drug(id) => format!("drug:{}", id),
            AlertSubject::Pair(pair) => format!("pair:{}", pair.key()),
        }
    }

    pub fn drug_ids(&self) -> Vec<String> {
        match self {
            AlertSubject::Drug(id) => vec![id.clone()],
            AlertSubject::Pair(pair) => vec![pair.first().to_string(), pair.second().to_string()],
        }
    }
}

/// A detector finding, not yet persisted.
///
/// Severity and confidence are supplied by the detector; the materializer
/// validates bounds but never recomputes them.
#[derive(Debug, Clone)]
pub struct AlertCandidate {
    pub alert_type: AlertType,
    pub subject: AlertSubject,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub confidence_score: f64,
    pub affected_patient_count: u32,
    /// Opaque evidence payload (counts, rates, window sizes)
    pub data_points: serde_json::Value,
    pub recommendations: Vec<String>,
}

/// A persisted analytics alert. Append-only: created by the materializer,
/// mutated only by a human resolving it, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsAlert {
    pub id: String,
    pub alert_type: AlertType,
    /// Dedup key derived from the subject
    pub subject_key: String,
    pub drug_ids: Vec<String>,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub confidence_score: f64,
    pub affected_patient_count: u32,
    pub data_points: serde_json::Value,
    pub recommendations: Vec<String>,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalyticsAlert {
    /// Materialize a validated candidate into a persistable alert.
    pub fn from_candidate(candidate: AlertCandidate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_type: candidate.alert_type,
            subject_key: candidate.subject.key(),
            drug_ids: candidate.subject.drug_ids(),
            title: candidate.title,
            description: candidate.description,
            severity: candidate.severity,
            confidence_score: candidate.confidence_score,
            affected_patient_count: candidate.affected_patient_count,
            data_points: candidate.data_points,
            recommendations: candidate.recommendations,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            created_at: Utc::now(),
        }
    }
}

/// Filter for alert listings.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub is_resolved: Option<bool>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_and_severity_round_trip() {
        for alert_type in [AlertType::SideEffectSpike, AlertType::DrugInteraction] {
            assert_eq!(AlertType::parse(alert_type.as_str()), Some(alert_type));
        }
        for severity in [
            AlertSeverity::Low,
            AlertSeverity::Medium,
            AlertSeverity::High,
            AlertSeverity::Critical,
        ] {
            assert_eq!(AlertSeverity::parse(severity.as_str()), Some(severity));
        }
    }

    #[test]
    fn test_subject_key_order_independent() {
        let a = AlertSubject::Pair(DrugPair::new("x", "y"));
        let b = AlertSubject::Pair(DrugPair::new("y", "x"));
        assert_eq!(a.key(), b.key());

        let drug = AlertSubject::Drug("d1".into());
        assert_eq!(drug.key(), "drug:d1");
        assert_eq!(drug.drug_ids(), vec!["d1".to_string()]);
    }

    #[test]
    fn test_from_candidate() {
        let candidate = AlertCandidate {
            alert_type: AlertType::SideEffectSpike,
            subject: AlertSubject::Drug("d1".into()),
            title: "Spike".into(),
            description: "desc".into(),
            severity: AlertSeverity::High,
            confidence_score: 0.8,
            affected_patient_count: 12,
            data_points: serde_json::json!({"recentCount": 25}),
            recommendations: vec!["review prescriptions".into()],
        };

        let alert = AnalyticsAlert::from_candidate(candidate);
        assert!(!alert.is_resolved);
        assert_eq!(alert.subject_key, "drug:d1");
        assert_eq!(alert.drug_ids, vec!["d1".to_string()]);
        assert!(alert.resolved_at.is_none());
    }
}
