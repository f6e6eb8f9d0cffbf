//! Known drug interaction models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Clinical severity of a drug-drug interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionSeverity {
    Minor,
    Moderate,
    Major,
    Contraindicated,
}

impl InteractionSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionSeverity::Minor => "minor",
            InteractionSeverity::Moderate => "moderate",
            InteractionSeverity::Major => "major",
            InteractionSeverity::Contraindicated => "contraindicated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minor" => Some(InteractionSeverity::Minor),
            "moderate" => Some(InteractionSeverity::Moderate),
            "major" => Some(InteractionSeverity::Major),
            "contraindicated" => Some(InteractionSeverity::Contraindicated),
            _ => None,
        }
    }

    /// Whether an interaction of this severity warrants an alert.
    /// Minor and moderate interactions are recorded but not alerted,
    /// to avoid alert fatigue.
    pub fn requires_alert(&self) -> bool {
        matches!(
            self,
            InteractionSeverity::Major | InteractionSeverity::Contraindicated
        )
    }
}

/// An unordered pair of drug ids.
///
/// Construction normalizes ordering (`first < second`), so both argument
/// orders map to the same pair and a single database row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DrugPair {
    first: String,
    second: String,
}

impl DrugPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let a = a.into();
        let b = b.into();
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    /// Stable key for dedup checks ("<first>:<second>").
    pub fn key(&self) -> String {
        format!("{}:{}", self.first, self.second)
    }
}

/// A curated or analytics-discovered drug-drug interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnownDrugInteraction {
    pub id: String,
    pub pair: DrugPair,
    pub severity: InteractionSeverity,
    pub description: String,
    /// Certainty of the record, in [0, 1]
    pub confidence: f64,
    /// True when raised by the analytics pass rather than clinical curation
    pub discovered_by_analytics: bool,
    pub created_at: DateTime<Utc>,
}

impl KnownDrugInteraction {
    /// A clinically curated interaction record.
    pub fn curated(
        pair: DrugPair,
        severity: InteractionSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pair,
            severity,
            description: description.into(),
            confidence: 1.0,
            discovered_by_analytics: false,
            created_at: Utc::now(),
        }
    }

    /// An interaction discovered by the analytics pass.
    pub fn discovered(
        pair: DrugPair,
        severity: InteractionSeverity,
        description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pair,
            severity,
            description: description.into(),
            confidence,
            discovered_by_analytics: true,
            created_at: Utc::now(),
        }
    }
}
