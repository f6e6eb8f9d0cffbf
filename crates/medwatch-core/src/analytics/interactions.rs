//! Drug interaction detection.
//!
//! Walks patients with two or more active prescriptions, derives the set of
//! unordered drug pairs in concurrent use, and judges each pair once per
//! pass: curated records short-circuit without a text-analysis call, unknown
//! pairs are judged by the client and persisted when the judgment clears the
//! confidence gate. Per-pair failures are recorded and never abort the scan.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use medwatch_llm::{
    DrugSummary, InteractionQuery, JudgedSeverity, TextAnalysisClient,
};

use super::{AnalyticsError, AnalyticsResult, UnitError};
use crate::config::AnalyticsConfig;
use crate::db::{Database, SideEffectFilter};
use crate::models::{
    AlertCandidate, AlertSeverity, AlertSubject, AlertType, Drug, DrugPair, InteractionSeverity,
    KnownDrugInteraction,
};

/// Report excerpts handed to the analysis per drug.
const MAX_EXCERPTS_PER_DRUG: usize = 5;

/// One alert-worthy interaction found in a scan.
#[derive(Debug, Clone)]
pub struct InteractionFinding {
    pub interaction: KnownDrugInteraction,
    /// Patients concurrently prescribed both drugs
    pub patient_ids: Vec<String>,
    /// True when this pass created the interaction record
    pub newly_discovered: bool,
}

/// Outcome of an interaction scan.
#[derive(Debug, Default)]
pub struct InteractionScan {
    pub pairs_examined: usize,
    pub findings: Vec<InteractionFinding>,
    pub errors: Vec<UnitError>,
}

/// Detects drug-drug interactions among concurrently prescribed drugs.
pub struct InteractionDetector<'a> {
    db: &'a Database,
    client: &'a dyn TextAnalysisClient,
    config: &'a AnalyticsConfig,
}

impl<'a> InteractionDetector<'a> {
    pub fn new(
        db: &'a Database,
        client: &'a dyn TextAnalysisClient,
        config: &'a AnalyticsConfig,
    ) -> Self {
        Self { db, client, config }
    }

    /// Scan every patient with two or more active prescriptions.
    pub fn detect_all(&self) -> AnalyticsResult<InteractionScan> {
        let prescriptions = self.db.list_active_prescriptions(None)?;

        let mut by_patient: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for prescription in prescriptions {
            by_patient
                .entry(prescription.patient_id)
                .or_default()
                .insert(prescription.drug_id);
        }

        Ok(self.scan_pairs(pair_patients(&by_patient)))
    }

    /// Scan only the pairs introduced by one prescription: every combination
    /// of its drug with the patient's other active drugs.
    pub fn detect_for_prescription(&self, prescription_id: &str) -> AnalyticsResult<InteractionScan> {
        let prescription = self
            .db
            .get_prescription(prescription_id)?
            .ok_or_else(|| AnalyticsError::NotFound(format!("prescription {}", prescription_id)))?;

        let active = self
            .db
            .list_active_prescriptions(Some(&prescription.patient_id))?;

        let mut pairs: BTreeMap<DrugPair, BTreeSet<String>> = BTreeMap::new();
        for other in active {
            if other.drug_id != prescription.drug_id {
                pairs
                    .entry(DrugPair::new(&prescription.drug_id, &other.drug_id))
                    .or_default()
                    .insert(prescription.patient_id.clone());
            }
        }

        Ok(self.scan_pairs(pairs))
    }

    fn scan_pairs(&self, pairs: BTreeMap<DrugPair, BTreeSet<String>>) -> InteractionScan {
        let mut scan = InteractionScan {
            pairs_examined: pairs.len(),
            ..Default::default()
        };

        for (pair, patients) in pairs {
            match self.evaluate_pair(&pair, &patients) {
                Ok(Some(finding)) => scan.findings.push(finding),
                Ok(None) => {}
                Err(e) => {
                    warn!(pair = %pair.key(), error = %e, "interaction check failed");
                    scan.errors
                        .push(UnitError::new(format!("pair:{}", pair.key()), e.to_string()));
                }
            }
        }

        scan
    }

    /// Judge one pair. Returns a finding only for severities that warrant
    /// an alert; minor and moderate interactions are recorded silently.
    fn evaluate_pair(
        &self,
        pair: &DrugPair,
        patients: &BTreeSet<String>,
    ) -> AnalyticsResult<Option<InteractionFinding>> {
        if let Some(known) = self.db.find_interaction(pair)? {
            debug!(pair = %pair.key(), severity = known.severity.as_str(), "known interaction");
            if !known.severity.requires_alert() {
                return Ok(None);
            }
            return Ok(Some(InteractionFinding {
                interaction: known,
                patient_ids: patients.iter().cloned().collect(),
                newly_discovered: false,
            }));
        }

        let drug_1 = self.require_drug(pair.first())?;
        let drug_2 = self.require_drug(pair.second())?;

        let query = InteractionQuery {
            drug_1: drug_summary(&drug_1),
            drug_2: drug_summary(&drug_2),
            report_excerpts: self.recent_excerpts(pair)?,
        };
        let judgment = self.client.analyze_drug_interaction(&query)?;

        // Confidence at or below the threshold is discarded entirely: no
        // record, no alert.
        if !judgment.has_interaction
            || judgment.confidence <= self.config.interaction_confidence_threshold
        {
            return Ok(None);
        }

        let severity = map_severity(judgment.severity);
        let discovered = KnownDrugInteraction::discovered(
            pair.clone(),
            severity,
            judgment.description,
            judgment.confidence,
        );

        let inserted = self.db.insert_interaction_if_absent(&discovered)?;
        let interaction = if inserted {
            discovered
        } else {
            // A concurrent pass recorded the pair first; its record wins.
            self.db
                .find_interaction(pair)?
                .ok_or_else(|| AnalyticsError::NotFound(format!("interaction {}", pair.key())))?
        };

        if !interaction.severity.requires_alert() {
            return Ok(None);
        }
        Ok(Some(InteractionFinding {
            interaction,
            patient_ids: patients.iter().cloned().collect(),
            newly_discovered: inserted,
        }))
    }

    /// Build an alert candidate for a finding.
    pub fn candidate(&self, finding: &InteractionFinding) -> AnalyticsResult<AlertCandidate> {
        let pair = &finding.interaction.pair;
        let drug_1 = self.require_drug(pair.first())?;
        let drug_2 = self.require_drug(pair.second())?;

        let severity = match finding.interaction.severity {
            InteractionSeverity::Contraindicated => AlertSeverity::Critical,
            _ => AlertSeverity::High,
        };

        let mut recommendations = vec![
            "Review medication regimens of affected patients".into(),
            "Consider alternative therapies".into(),
        ];
        if finding.interaction.severity == InteractionSeverity::Contraindicated {
            recommendations.insert(0, "Immediate clinical review required".into());
        }

        Ok(AlertCandidate {
            alert_type: AlertType::DrugInteraction,
            subject: AlertSubject::Pair(pair.clone()),
            title: format!(
                "{} interaction: {} and {}",
                capitalize(finding.interaction.severity.as_str()),
                drug_1.name,
                drug_2.name
            ),
            description: finding.interaction.description.clone(),
            severity,
            confidence_score: finding.interaction.confidence,
            affected_patient_count: finding.patient_ids.len() as u32,
            data_points: serde_json::json!({
                "interactionSeverity": finding.interaction.severity.as_str(),
                "discoveredByAnalytics": finding.interaction.discovered_by_analytics,
                "patientCount": finding.patient_ids.len(),
            }),
            recommendations,
        })
    }

    fn require_drug(&self, id: &str) -> AnalyticsResult<Drug> {
        self.db
            .get_drug(id)?
            .ok_or_else(|| AnalyticsError::NotFound(format!("drug {}", id)))
    }

    /// Recent anonymous report descriptions for both drugs, as context for
    /// the analysis. Identifiable reports never leave the database.
    fn recent_excerpts(&self, pair: &DrugPair) -> AnalyticsResult<Vec<String>> {
        let since = Utc::now() - Duration::days(self.config.window_days as i64);
        let mut excerpts = Vec::new();

        for drug_id in [pair.first(), pair.second()] {
            let reports = self.db.find_reports(&SideEffectFilter {
                drug_id: Some(drug_id.to_string()),
                is_anonymous: Some(true),
                created_after: Some(since),
                ..Default::default()
            })?;
            excerpts.extend(
                reports
                    .into_iter()
                    .take(MAX_EXCERPTS_PER_DRUG)
                    .map(|r| r.description),
            );
        }
        Ok(excerpts)
    }
}

fn pair_patients(
    by_patient: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<DrugPair, BTreeSet<String>> {
    let mut pairs: BTreeMap<DrugPair, BTreeSet<String>> = BTreeMap::new();
    for (patient, drugs) in by_patient {
        let drugs: Vec<&String> = drugs.iter().collect();
        for i in 0..drugs.len() {
            for j in (i + 1)..drugs.len() {
                pairs
                    .entry(DrugPair::new(drugs[i], drugs[j]))
                    .or_default()
                    .insert(patient.clone());
            }
        }
    }
    pairs
}

fn drug_summary(drug: &Drug) -> DrugSummary {
    DrugSummary {
        name: drug.name.clone(),
        description: drug.description.clone().unwrap_or_default(),
    }
}

fn map_severity(judged: JudgedSeverity) -> InteractionSeverity {
    match judged {
        JudgedSeverity::Minor => InteractionSeverity::Minor,
        JudgedSeverity::Moderate => InteractionSeverity::Moderate,
        JudgedSeverity::Major => InteractionSeverity::Major,
        JudgedSeverity::Contraindicated => InteractionSeverity::Contraindicated,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Prescription;
    use medwatch_llm::{InteractionJudgment, ScriptedClient};

    fn setup() -> (Database, Drug, Drug, AnalyticsConfig) {
        let db = Database::open_in_memory().unwrap();
        let warfarin = Drug::new("Warfarin");
        let aspirin = Drug::new("Aspirin");
        db.insert_drug(&warfarin).unwrap();
        db.insert_drug(&aspirin).unwrap();
        (db, warfarin, aspirin, AnalyticsConfig::default())
    }

    fn prescribe(db: &Database, patient: &str, drug_id: &str) {
        db.insert_prescription(&Prescription::new(patient, "doc", drug_id))
            .unwrap();
    }

    fn major_judgment(confidence: f64) -> InteractionJudgment {
        InteractionJudgment {
            has_interaction: true,
            severity: JudgedSeverity::Major,
            description: "increased bleeding risk".into(),
            confidence,
        }
    }

    #[test]
    fn test_known_interaction_skips_analysis() {
        let (db, warfarin, aspirin, config) = setup();
        let pair = DrugPair::new(&warfarin.id, &aspirin.id);
        db.insert_interaction_if_absent(&KnownDrugInteraction::curated(
            pair,
            InteractionSeverity::Major,
            "bleeding",
        ))
        .unwrap();
        prescribe(&db, "p1", &warfarin.id);
        prescribe(&db, "p1", &aspirin.id);

        let client = ScriptedClient::unavailable();
        let detector = InteractionDetector::new(&db, &client, &config);
        let scan = detector.detect_all().unwrap();

        assert_eq!(scan.findings.len(), 1);
        assert!(!scan.findings[0].newly_discovered);
        assert!(scan.errors.is_empty());
        assert_eq!(client.interaction_calls(), 0);
    }

    #[test]
    fn test_known_minor_interaction_produces_no_finding() {
        let (db, warfarin, aspirin, config) = setup();
        db.insert_interaction_if_absent(&KnownDrugInteraction::curated(
            DrugPair::new(&warfarin.id, &aspirin.id),
            InteractionSeverity::Minor,
            "slight absorption delay",
        ))
        .unwrap();
        prescribe(&db, "p1", &warfarin.id);
        prescribe(&db, "p1", &aspirin.id);

        let client = ScriptedClient::unavailable();
        let detector = InteractionDetector::new(&db, &client, &config);
        let scan = detector.detect_all().unwrap();

        assert_eq!(scan.pairs_examined, 1);
        assert!(scan.findings.is_empty());
        assert_eq!(client.interaction_calls(), 0);
    }

    #[test]
    fn test_discovery_persists_and_reports() {
        let (db, warfarin, aspirin, config) = setup();
        prescribe(&db, "p1", &warfarin.id);
        prescribe(&db, "p1", &aspirin.id);
        prescribe(&db, "p2", &warfarin.id);
        prescribe(&db, "p2", &aspirin.id);

        let client = ScriptedClient::with_interaction_judgment(major_judgment(0.9));
        let detector = InteractionDetector::new(&db, &client, &config);
        let scan = detector.detect_all().unwrap();

        // One judgment for the pair despite two patients sharing it
        assert_eq!(client.interaction_calls(), 1);
        assert_eq!(scan.findings.len(), 1);
        assert!(scan.findings[0].newly_discovered);
        assert_eq!(scan.findings[0].patient_ids.len(), 2);

        let stored = db
            .find_interaction(&DrugPair::new(&warfarin.id, &aspirin.id))
            .unwrap()
            .unwrap();
        assert!(stored.discovered_by_analytics);
        assert_eq!(stored.severity, InteractionSeverity::Major);
    }

    #[test]
    fn test_second_pass_uses_stored_record() {
        let (db, warfarin, aspirin, config) = setup();
        prescribe(&db, "p1", &warfarin.id);
        prescribe(&db, "p1", &aspirin.id);

        let client = ScriptedClient::with_interaction_judgment(major_judgment(0.9));
        let detector = InteractionDetector::new(&db, &client, &config);
        detector.detect_all().unwrap();

        let scan = detector.detect_all().unwrap();
        assert_eq!(scan.findings.len(), 1);
        assert!(!scan.findings[0].newly_discovered);
        // Second pass read the record instead of consulting the client again
        assert_eq!(client.interaction_calls(), 1);
    }

    #[test]
    fn test_confidence_gate_is_strict() {
        let (db, warfarin, aspirin, config) = setup();
        prescribe(&db, "p1", &warfarin.id);
        prescribe(&db, "p1", &aspirin.id);

        // Exactly at the threshold: discarded
        let client = ScriptedClient::with_interaction_judgment(major_judgment(0.7));
        let detector = InteractionDetector::new(&db, &client, &config);
        let scan = detector.detect_all().unwrap();

        assert!(scan.findings.is_empty());
        assert!(db
            .find_interaction(&DrugPair::new(&warfarin.id, &aspirin.id))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_moderate_discovery_recorded_but_not_alerted() {
        let (db, warfarin, aspirin, config) = setup();
        prescribe(&db, "p1", &warfarin.id);
        prescribe(&db, "p1", &aspirin.id);

        let client = ScriptedClient::with_interaction_judgment(InteractionJudgment {
            has_interaction: true,
            severity: JudgedSeverity::Moderate,
            description: "monitor INR".into(),
            confidence: 0.85,
        });
        let detector = InteractionDetector::new(&db, &client, &config);
        let scan = detector.detect_all().unwrap();

        assert!(scan.findings.is_empty());
        let stored = db
            .find_interaction(&DrugPair::new(&warfarin.id, &aspirin.id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.severity, InteractionSeverity::Moderate);
    }

    #[test]
    fn test_client_failure_is_recorded_not_fatal() {
        let (db, warfarin, aspirin, config) = setup();
        prescribe(&db, "p1", &warfarin.id);
        prescribe(&db, "p1", &aspirin.id);

        let client = ScriptedClient::unavailable();
        let detector = InteractionDetector::new(&db, &client, &config);
        let scan = detector.detect_all().unwrap();

        assert!(scan.findings.is_empty());
        assert_eq!(scan.errors.len(), 1);
        assert!(scan.errors[0].unit.starts_with("pair:"));
    }

    #[test]
    fn test_single_prescription_patients_ignored() {
        let (db, warfarin, aspirin, config) = setup();
        prescribe(&db, "p1", &warfarin.id);
        prescribe(&db, "p2", &aspirin.id);

        let client = ScriptedClient::with_interaction_judgment(major_judgment(0.9));
        let detector = InteractionDetector::new(&db, &client, &config);
        let scan = detector.detect_all().unwrap();

        assert_eq!(scan.pairs_examined, 0);
        assert_eq!(client.interaction_calls(), 0);
    }

    #[test]
    fn test_detect_for_prescription() {
        let (db, warfarin, aspirin, config) = setup();
        prescribe(&db, "p1", &warfarin.id);
        let prescription = Prescription::new("p1", "doc", &aspirin.id);
        db.insert_prescription(&prescription).unwrap();

        let client = ScriptedClient::with_interaction_judgment(major_judgment(0.9));
        let detector = InteractionDetector::new(&db, &client, &config);
        let scan = detector.detect_for_prescription(&prescription.id).unwrap();

        assert_eq!(scan.pairs_examined, 1);
        assert_eq!(scan.findings.len(), 1);

        let missing = detector.detect_for_prescription("nope");
        assert!(matches!(missing, Err(AnalyticsError::NotFound(_))));
    }

    #[test]
    fn test_candidate_severity_mapping() {
        let (db, warfarin, aspirin, config) = setup();
        let client = ScriptedClient::unavailable();
        let detector = InteractionDetector::new(&db, &client, &config);

        let pair = DrugPair::new(&warfarin.id, &aspirin.id);
        let finding = InteractionFinding {
            interaction: KnownDrugInteraction::curated(
                pair.clone(),
                InteractionSeverity::Contraindicated,
                "do not combine",
            ),
            patient_ids: vec!["p1".into()],
            newly_discovered: false,
        };

        let candidate = detector.candidate(&finding).unwrap();
        assert_eq!(candidate.alert_type, AlertType::DrugInteraction);
        assert_eq!(candidate.severity, AlertSeverity::Critical);
        assert_eq!(candidate.subject.key(), format!("pair:{}", pair.key()));
        assert_eq!(candidate.recommendations[0], "Immediate clinical review required");
    }
}
