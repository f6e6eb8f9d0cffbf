//! Periodic analysis orchestration.
//!
//! One pass runs spike detection over every active drug, then the interaction
//! scan, materializing alerts for everything that clears the gates. Units are
//! isolated: a failing drug or pair is recorded in the outcome and the pass
//! continues. The only fatal precondition is database connectivity.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use medwatch_llm::TextAnalysisClient;

use super::{AlertMaterializer, AnalyticsResult, InteractionDetector, SpikeDetector, UnitError};
use crate::config::AnalyticsConfig;
use crate::db::Database;

/// Summary of one analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub window_days: u32,
    pub drugs_analyzed: u32,
    pub spikes_detected: u32,
    pub interactions_detected: u32,
    pub alerts_generated: u32,
    /// Unit failures recorded during the pass
    pub errors: Vec<UnitError>,
    pub unresolved_alerts: u32,
    pub unresolved_severe_alerts: u32,
    /// Anonymous reports received inside the window, across all drugs
    pub recent_report_count: u32,
}

/// Runs complete analysis passes.
pub struct AnalysisOrchestrator<'a> {
    db: &'a Database,
    client: &'a dyn TextAnalysisClient,
    config: &'a AnalyticsConfig,
}

impl<'a> AnalysisOrchestrator<'a> {
    pub fn new(
        db: &'a Database,
        client: &'a dyn TextAnalysisClient,
        config: &'a AnalyticsConfig,
    ) -> Self {
        Self { db, client, config }
    }

    /// Run one pass over the given window, defaulting to the configured one.
    pub fn run(&self, window_days: Option<u32>) -> AnalyticsResult<AnalysisOutcome> {
        // Connectivity is the one precondition the pass cannot work around.
        self.db.ping()?;

        let window_days = window_days.unwrap_or(self.config.window_days);
        info!(window_days, "analysis pass started");

        let materializer = AlertMaterializer::new(self.db, self.config.window_days);
        let mut errors = Vec::new();
        let mut alerts_generated = 0u32;

        // Spike detection, one drug at a time
        let spike_detector = SpikeDetector::new(self.db, self.config);
        let drugs = self.db.list_active_drugs()?;
        let drugs_analyzed = drugs.len() as u32;
        let mut spikes_detected = 0u32;

        for drug in &drugs {
            match self.check_spike(&spike_detector, &materializer, &drug.id, window_days) {
                Ok((spiked, alerted)) => {
                    spikes_detected += u32::from(spiked);
                    alerts_generated += u32::from(alerted);
                }
                Err(e) => {
                    error!(drug_id = %drug.id, error = %e, "spike check failed");
                    errors.push(UnitError::new(format!("drug:{}", drug.id), e.to_string()));
                }
            }
        }

        // Interaction scan; its per-pair errors fold into the outcome
        let interaction_detector = InteractionDetector::new(self.db, self.client, self.config);
        let scan = interaction_detector.detect_all()?;
        let interactions_detected = scan.findings.len() as u32;
        errors.extend(scan.errors);

        for finding in &scan.findings {
            let raised = interaction_detector
                .candidate(finding)
                .and_then(|candidate| materializer.raise(candidate));
            match raised {
                Ok(alert) => alerts_generated += u32::from(alert.is_some()),
                Err(e) => {
                    let unit = format!("pair:{}", finding.interaction.pair.key());
                    error!(unit = %unit, error = %e, "interaction alert failed");
                    errors.push(UnitError::new(unit, e.to_string()));
                }
            }
        }

        let since = Utc::now() - Duration::days(window_days as i64);
        let outcome = AnalysisOutcome {
            window_days,
            drugs_analyzed,
            spikes_detected,
            interactions_detected,
            alerts_generated,
            errors,
            unresolved_alerts: self.db.count_unresolved_alerts()?,
            unresolved_severe_alerts: self.db.count_unresolved_severe_alerts()?,
            recent_report_count: self.db.count_recent_anonymous_reports(since)?,
        };

        info!(
            spikes = outcome.spikes_detected,
            interactions = outcome.interactions_detected,
            alerts = outcome.alerts_generated,
            errors = outcome.errors.len(),
            "analysis pass finished"
        );
        Ok(outcome)
    }

    /// Returns (spike detected, alert generated).
    fn check_spike(
        &self,
        detector: &SpikeDetector<'_>,
        materializer: &AlertMaterializer<'_>,
        drug_id: &str,
        window_days: u32,
    ) -> AnalyticsResult<(bool, bool)> {
        let analysis = detector.detect(drug_id, window_days)?;
        if !analysis.is_spike {
            return Ok((false, false));
        }

        let alerted = match detector.candidate(&analysis)? {
            Some(candidate) => materializer.raise(candidate)?.is_some(),
            None => false,
        };
        Ok((true, alerted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Drug, Prescription, ReportSeverity, SideEffectReport};
    use medwatch_llm::{InteractionJudgment, JudgedSeverity, ScriptedClient};

    fn seed_spiking_drug(db: &Database, name: &str) -> Drug {
        let drug = Drug::new(name);
        db.insert_drug(&drug).unwrap();
        for i in 0..10 {
            let mut report = SideEffectReport::new(
                &drug.id,
                format!("{}-p{}", name, i),
                "rash",
                ReportSeverity::Severe,
            )
            .anonymous();
            report.created_at = Utc::now() - Duration::hours(6);
            db.insert_report(&report).unwrap();
        }
        drug
    }

    #[test]
    fn test_pass_raises_spike_alert() {
        let db = Database::open_in_memory().unwrap();
        seed_spiking_drug(&db, "Warfarin");

        let client = ScriptedClient::unavailable();
        let config = AnalyticsConfig::default();
        let orchestrator = AnalysisOrchestrator::new(&db, &client, &config);

        let outcome = orchestrator.run(None).unwrap();
        assert_eq!(outcome.window_days, 30);
        assert_eq!(outcome.drugs_analyzed, 1);
        assert_eq!(outcome.spikes_detected, 1);
        assert_eq!(outcome.alerts_generated, 1);
        assert_eq!(outcome.unresolved_alerts, 1);
        assert_eq!(outcome.recent_report_count, 10);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_pass_is_idempotent_for_alerts() {
        let db = Database::open_in_memory().unwrap();
        seed_spiking_drug(&db, "Warfarin");

        let client = ScriptedClient::unavailable();
        let config = AnalyticsConfig::default();
        let orchestrator = AnalysisOrchestrator::new(&db, &client, &config);

        let first = orchestrator.run(None).unwrap();
        assert_eq!(first.alerts_generated, 1);

        // Spike still detected, but the unresolved alert suppresses a new one
        let second = orchestrator.run(None).unwrap();
        assert_eq!(second.spikes_detected, 1);
        assert_eq!(second.alerts_generated, 0);
        assert_eq!(second.unresolved_alerts, 1);
    }

    #[test]
    fn test_pass_covers_interactions() {
        let db = Database::open_in_memory().unwrap();
        let warfarin = Drug::new("Warfarin");
        let aspirin = Drug::new("Aspirin");
        db.insert_drug(&warfarin).unwrap();
        db.insert_drug(&aspirin).unwrap();
        db.insert_prescription(&Prescription::new("p1", "doc", &warfarin.id))
            .unwrap();
        db.insert_prescription(&Prescription::new("p1", "doc", &aspirin.id))
            .unwrap();

        let client = ScriptedClient::with_interaction_judgment(InteractionJudgment {
            has_interaction: true,
            severity: JudgedSeverity::Contraindicated,
            description: "do not combine".into(),
            confidence: 0.95,
        });
        let config = AnalyticsConfig::default();
        let orchestrator = AnalysisOrchestrator::new(&db, &client, &config);

        let outcome = orchestrator.run(None).unwrap();
        assert_eq!(outcome.interactions_detected, 1);
        assert_eq!(outcome.alerts_generated, 1);
        assert_eq!(outcome.unresolved_severe_alerts, 1);
    }

    #[test]
    fn test_client_outage_degrades_not_fails() {
        let db = Database::open_in_memory().unwrap();
        seed_spiking_drug(&db, "Warfarin");

        // Two drugs prescribed together force an interaction check that fails
        let aspirin = Drug::new("Aspirin");
        let ibuprofen = Drug::new("Ibuprofen");
        db.insert_drug(&aspirin).unwrap();
        db.insert_drug(&ibuprofen).unwrap();
        db.insert_prescription(&Prescription::new("p1", "doc", &aspirin.id))
            .unwrap();
        db.insert_prescription(&Prescription::new("p1", "doc", &ibuprofen.id))
            .unwrap();

        let client = ScriptedClient::unavailable();
        let config = AnalyticsConfig::default();
        let orchestrator = AnalysisOrchestrator::new(&db, &client, &config);

        let outcome = orchestrator.run(None).unwrap();
        // Spike work unaffected by the interaction failure
        assert_eq!(outcome.spikes_detected, 1);
        assert_eq!(outcome.alerts_generated, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].unit.starts_with("pair:"));
    }

    #[test]
    fn test_window_override() {
        let db = Database::open_in_memory().unwrap();
        let client = ScriptedClient::unavailable();
        let config = AnalyticsConfig::default();
        let orchestrator = AnalysisOrchestrator::new(&db, &client, &config);

        let outcome = orchestrator.run(Some(7)).unwrap();
        assert_eq!(outcome.window_days, 7);
    }
}
