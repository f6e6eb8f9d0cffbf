//! Side-effect spike detection.
//!
//! Compares the anonymous report rate in the most recent window against the
//! window immediately before it. Windows are half-open, `[from, until)`, so
//! the two windows partition the lookback period and no report is counted
//! twice.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AnalyticsError, AnalyticsResult};
use crate::config::AnalyticsConfig;
use crate::db::Database;
use crate::models::{AlertCandidate, AlertSeverity, AlertSubject, AlertType};

/// Ratio above which a spike is rated high severity rather than medium.
const HIGH_SEVERITY_RATIO: f64 = 0.5;

/// Raw counts and rates behind a spike decision, kept for evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpikeMetrics {
    pub recent_count: u32,
    pub baseline_count: u32,
    /// Reports per day in the recent window
    pub recent_rate: f64,
    /// Reports per day in the baseline window
    pub baseline_rate: f64,
    /// Relative rate increase; equals `recent_rate` when the baseline is empty
    pub increase_ratio: f64,
    pub window_days: u32,
}

/// Outcome of spike detection for one drug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpikeAnalysis {
    pub drug_id: String,
    pub is_spike: bool,
    pub severity: Option<AlertSeverity>,
    /// `min(increase_ratio, 1.0)`; 0.0 when no spike
    pub confidence: f64,
    pub metrics: SpikeMetrics,
}

/// Detects report-rate spikes per drug.
pub struct SpikeDetector<'a> {
    db: &'a Database,
    config: &'a AnalyticsConfig,
}

impl<'a> SpikeDetector<'a> {
    pub fn new(db: &'a Database, config: &'a AnalyticsConfig) -> Self {
        Self { db, config }
    }

    /// Analyze one drug over `[now - window, now)` against the preceding
    /// window of the same length. Only anonymous reports are counted.
    pub fn detect(&self, drug_id: &str, window_days: u32) -> AnalyticsResult<SpikeAnalysis> {
        let now = Utc::now();
        let window = Duration::days(window_days as i64);
        let recent_start = now - window;
        let baseline_start = recent_start - window;

        let recent_count = self
            .db
            .count_anonymous_reports(drug_id, recent_start, now)?;
        let baseline_count =
            self.db
                .count_anonymous_reports(drug_id, baseline_start, recent_start)?;

        let days = window_days as f64;
        let recent_rate = recent_count as f64 / days;
        let baseline_rate = baseline_count as f64 / days;

        let (is_spike, increase_ratio) = if baseline_count == 0 {
            // No history to compare against: treat a burst of reports on a
            // previously quiet drug as a spike, with the raw rate standing
            // in for the increase ratio.
            (
                recent_count >= self.config.baseline_zero_min_reports,
                recent_rate,
            )
        } else {
            let ratio = (recent_rate - baseline_rate) / baseline_rate;
            (
                ratio > self.config.spike_threshold && recent_rate > self.config.min_recent_rate,
                ratio,
            )
        };

        let severity = is_spike.then(|| {
            if increase_ratio > HIGH_SEVERITY_RATIO {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            }
        });
        let confidence = if is_spike {
            increase_ratio.min(1.0)
        } else {
            0.0
        };

        debug!(
            drug_id,
            recent_count, baseline_count, increase_ratio, is_spike, "spike analysis"
        );

        Ok(SpikeAnalysis {
            drug_id: drug_id.to_string(),
            is_spike,
            severity,
            confidence,
            metrics: SpikeMetrics {
                recent_count,
                baseline_count,
                recent_rate,
                baseline_rate,
                increase_ratio,
                window_days,
            },
        })
    }

    /// Build an alert candidate for a spike analysis. Returns `None` when the
    /// analysis found no spike.
    pub fn candidate(&self, analysis: &SpikeAnalysis) -> AnalyticsResult<Option<AlertCandidate>> {
        if !analysis.is_spike {
            return Ok(None);
        }
        let severity = analysis
            .severity
            .ok_or_else(|| AnalyticsError::InvalidCandidate("spike without severity".into()))?;

        let drug = self
            .db
            .get_drug(&analysis.drug_id)?
            .ok_or_else(|| AnalyticsError::NotFound(format!("drug {}", analysis.drug_id)))?;

        let window = Duration::days(analysis.metrics.window_days as i64);
        let affected = self
            .db
            .count_distinct_reporters(&analysis.drug_id, Utc::now() - window)?;

        let increase_pct = (analysis.metrics.increase_ratio * 100.0).round();
        Ok(Some(AlertCandidate {
            alert_type: AlertType::SideEffectSpike,
            subject: AlertSubject::Drug(analysis.drug_id.clone()),
            title: format!("Side effect spike detected for {}", drug.name),
            description: format!(
                "Anonymous side-effect reports for {} increased {}% over the last {} days \
                 ({} recent vs {} baseline).",
                drug.name,
                increase_pct,
                analysis.metrics.window_days,
                analysis.metrics.recent_count,
                analysis.metrics.baseline_count,
            ),
            severity,
            confidence_score: analysis.confidence,
            affected_patient_count: affected,
            data_points: serde_json::to_value(&analysis.metrics)?,
            recommendations: vec![
                "Review recent prescriptions for this drug".into(),
                "Consider reaching out to patients with active prescriptions".into(),
                "Evaluate whether a batch or lot investigation is warranted".into(),
            ],
        }))
    }
}
