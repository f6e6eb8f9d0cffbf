//! Alert materialization.
//!
//! The materializer is the single write path for alerts: it validates a
//! detector's candidate, applies the dedup policy and persists the row.
//! Detectors never write alerts themselves.

use chrono::{Duration, Utc};
use tracing::info;

use super::{AnalyticsError, AnalyticsResult};
use crate::db::Database;
use crate::models::{AlertCandidate, AnalyticsAlert};

/// Materializes validated alert candidates into persisted alerts.
pub struct AlertMaterializer<'a> {
    db: &'a Database,
    /// An unresolved alert for the same subject within this many days
    /// suppresses a new one.
    dedup_window_days: u32,
}

impl<'a> AlertMaterializer<'a> {
    pub fn new(db: &'a Database, dedup_window_days: u32) -> Self {
        Self {
            db,
            dedup_window_days,
        }
    }

    /// Persist a candidate unless suppressed by deduplication.
    ///
    /// Returns the stored alert, or `None` when an unresolved alert for the
    /// same subject already exists inside the dedup window. The existing
    /// alert is left untouched; evidence from the suppressed candidate is
    /// discarded, not merged.
    pub fn raise(&self, mut candidate: AlertCandidate) -> AnalyticsResult<Option<AnalyticsAlert>> {
        if !candidate.confidence_score.is_finite()
            || !(0.0..=1.0).contains(&candidate.confidence_score)
        {
            return Err(AnalyticsError::InvalidCandidate(format!(
                "confidence out of range: {}",
                candidate.confidence_score
            )));
        }
        if candidate.title.is_empty() {
            return Err(AnalyticsError::InvalidCandidate("empty title".into()));
        }
        if candidate.recommendations.is_empty() {
            candidate.recommendations = vec!["Consult your healthcare provider".into()];
        }

        let alert = AnalyticsAlert::from_candidate(candidate);
        let cutoff = Utc::now() - Duration::days(self.dedup_window_days as i64);

        if !self.db.insert_alert_deduped(&alert, cutoff)? {
            info!(subject = %alert.subject_key, "alert suppressed by dedup");
            return Ok(None);
        }

        info!(
            id = %alert.id,
            alert_type = alert.alert_type.as_str(),
            subject = %alert.subject_key,
            severity = alert.severity.as_str(),
            "alert raised"
        );
        Ok(Some(alert))
    }
}
