//! Analytics report generation.
//!
//! A report is a read-only aggregation: per-drug statistics over the window,
//! recent alerts, and a narrative insights section. The insights call is the
//! only unreliable dependency, so its failure degrades to the documented
//! fallback instead of failing the report.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use medwatch_llm::{InsightsInput, InsightsSummary, TextAnalysisClient};

use super::{AnalyticsResult, SpikeAnalysis, SpikeDetector};
use crate::config::AnalyticsConfig;
use crate::db::Database;
use crate::models::{AnalyticsAlert, SeverityCounts};

/// Per-drug statistics over the report window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrugStats {
    pub drug_id: String,
    pub drug_name: String,
    /// Anonymous reports in the window
    pub total_reports: u32,
    pub severity_counts: SeverityCounts,
    pub concerning_reports: u32,
    pub distinct_reporters: u32,
    pub spike: SpikeAnalysis,
}

/// A complete analytics report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub window_days: u32,
    pub drug_stats: Vec<DrugStats>,
    pub recent_alerts: Vec<AnalyticsAlert>,
    pub unresolved_alert_count: u32,
    pub insights: InsightsSummary,
}

/// Builds analytics reports over a window.
pub struct ReportGenerator<'a> {
    db: &'a Database,
    client: &'a dyn TextAnalysisClient,
    config: &'a AnalyticsConfig,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(
        db: &'a Database,
        client: &'a dyn TextAnalysisClient,
        config: &'a AnalyticsConfig,
    ) -> Self {
        Self { db, client, config }
    }

    /// Generate a report over the last `window_days`. Statistics come straight
    /// from the database; a failed insights call falls back rather than
    /// failing the report.
    pub fn generate(&self, window_days: u32) -> AnalyticsResult<AnalyticsReport> {
        let now = Utc::now();
        let since = now - Duration::days(window_days as i64);
        let spike_detector = SpikeDetector::new(self.db, self.config);

        let mut drug_stats = Vec::new();
        for drug in self.db.list_active_drugs()? {
            let total_reports = self.db.count_anonymous_reports(&drug.id, since, now)?;
            // Drugs without anonymous reports in the window carry no signal
            if total_reports == 0 {
                continue;
            }
            let spike = spike_detector.detect(&drug.id, window_days)?;
            drug_stats.push(DrugStats {
                total_reports,
                severity_counts: self.db.severity_counts(&drug.id, since)?,
                concerning_reports: self.db.count_concerning_reports(&drug.id, since)?,
                distinct_reporters: self.db.count_distinct_reporters(&drug.id, since)?,
                spike,
                drug_id: drug.id,
                drug_name: drug.name,
            });
        }

        let insights_input = InsightsInput {
            drug_stats: serde_json::to_value(&drug_stats)?,
            window_days: window_days as i64,
        };
        let insights = match self.client.generate_insights(&insights_input) {
            Ok(insights) => insights,
            Err(e) => {
                warn!(error = %e, "insights unavailable, using fallback");
                InsightsSummary::fallback()
            }
        };

        Ok(AnalyticsReport {
            generated_at: now,
            window_days,
            drug_stats,
            recent_alerts: self.db.list_alerts_since(since)?,
            unresolved_alert_count: self.db.count_unresolved_alerts()?,
            insights,
        })
    }
}
