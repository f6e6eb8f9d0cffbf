//! Core analytics engine for drug side-effect monitoring.
//!
//! Tracks drugs, prescriptions and patient-submitted side-effect reports in
//! SQLite, and runs a periodic analysis pass over them: spike detection on
//! anonymous report rates, drug-interaction discovery backed by a text
//! analysis service, and alert materialization with deduplication.
//!
//! [`MedWatch`] is the embedding surface: one handle owning the database,
//! the analysis client and the tuning configuration.

pub mod analytics;
pub mod config;
pub mod db;
pub mod models;

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

use medwatch_llm::{SideEffectAssessment, SideEffectInput, TextAnalysisClient};

pub use analytics::{
    AnalysisOrchestrator, AnalysisOutcome, AnalyticsError, AnalyticsReport, InteractionScan,
    SpikeAnalysis, UnitError,
};
pub use config::AnalyticsConfig;
pub use db::{Database, DbError, SideEffectFilter};
pub use models::*;

/// Top-level errors.
#[derive(Error, Debug)]
pub enum MedWatchError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    #[error("Internal lock poisoned")]
    LockPoisoned,
}

impl<T> From<PoisonError<T>> for MedWatchError {
    fn from(_: PoisonError<T>) -> Self {
        MedWatchError::LockPoisoned
    }
}

pub type MedWatchResult<T> = Result<T, MedWatchError>;

/// Application facade: owns the database, the text-analysis client and the
/// analytics configuration.
pub struct MedWatch {
    db: Mutex<Database>,
    client: Box<dyn TextAnalysisClient + Send + Sync>,
    config: AnalyticsConfig,
}

impl MedWatch {
    /// Open against a database file.
    pub fn open<P: AsRef<Path>>(
        path: P,
        client: Box<dyn TextAnalysisClient + Send + Sync>,
        config: AnalyticsConfig,
    ) -> MedWatchResult<Self> {
        Ok(Self {
            db: Mutex::new(Database::open(path)?),
            client,
            config,
        })
    }

    /// Open against an in-memory database.
    pub fn open_in_memory(
        client: Box<dyn TextAnalysisClient + Send + Sync>,
        config: AnalyticsConfig,
    ) -> MedWatchResult<Self> {
        Ok(Self {
            db: Mutex::new(Database::open_in_memory()?),
            client,
            config,
        })
    }

    // -- record keeping ----------------------------------------------------

    pub fn add_drug(&self, drug: &Drug) -> MedWatchResult<()> {
        let db = self.db.lock()?;
        db.insert_drug(drug)?;
        Ok(())
    }

    pub fn get_drug(&self, id: &str) -> MedWatchResult<Option<Drug>> {
        let db = self.db.lock()?;
        Ok(db.get_drug(id)?)
    }

    pub fn add_prescription(&self, prescription: &Prescription) -> MedWatchResult<()> {
        let db = self.db.lock()?;
        db.insert_prescription(prescription)?;
        Ok(())
    }

    /// Submit a side-effect report. The report is assessed by the analysis
    /// client to set its concerning flag; when the client is unavailable the
    /// deterministic fallback assessment applies, so submission never fails
    /// on an analysis outage.
    pub fn submit_report(
        &self,
        mut report: SideEffectReport,
    ) -> MedWatchResult<(SideEffectReport, SideEffectAssessment)> {
        let db = self.db.lock()?;

        let drug = db
            .get_drug(&report.drug_id)?
            .ok_or_else(|| DbError::NotFound(format!("drug {}", report.drug_id)))?;
        let other_medications = db
            .list_active_prescriptions(Some(&report.patient_id))?
            .into_iter()
            .filter(|p| p.drug_id != report.drug_id)
            .filter_map(|p| db.get_drug(&p.drug_id).ok().flatten())
            .map(|d| d.name)
            .collect();

        let input = SideEffectInput {
            description: report.description.clone(),
            severity: report.severity.as_str().to_string(),
            impact_on_daily_life: None,
            drug_name: drug.name,
            patient_age: None,
            other_medications,
        };
        let assessment = match self.client.analyze_side_effect(&input) {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(error = %e, "side-effect assessment unavailable, using fallback");
                SideEffectAssessment::fallback(report.severity.as_str())
            }
        };

        report.is_concerning = assessment.is_concerning;
        db.insert_report(&report)?;
        Ok((report, assessment))
    }

    pub fn find_reports(&self, filter: &SideEffectFilter) -> MedWatchResult<Vec<SideEffectReport>> {
        let db = self.db.lock()?;
        Ok(db.find_reports(filter)?)
    }

    pub fn add_known_interaction(
        &self,
        interaction: &KnownDrugInteraction,
    ) -> MedWatchResult<bool> {
        let db = self.db.lock()?;
        Ok(db.insert_interaction_if_absent(interaction)?)
    }

    // -- analytics ----------------------------------------------------------

    /// Run one periodic analysis pass.
    pub fn run_periodic_analysis(
        &self,
        window_days: Option<u32>,
    ) -> MedWatchResult<AnalysisOutcome> {
        let db = self.db.lock()?;
        let orchestrator = AnalysisOrchestrator::new(&db, self.client.as_ref(), &self.config);
        Ok(orchestrator.run(window_days)?)
    }

    /// Generate an analytics report over the last `window_days` (defaults to
    /// the configured window).
    pub fn generate_report(&self, window_days: Option<u32>) -> MedWatchResult<AnalyticsReport> {
        let db = self.db.lock()?;
        let generator =
            analytics::ReportGenerator::new(&db, self.client.as_ref(), &self.config);
        Ok(generator.generate(window_days.unwrap_or(self.config.window_days))?)
    }

    /// Run spike detection for one drug.
    pub fn detect_spike(
        &self,
        drug_id: &str,
        window_days: Option<u32>,
    ) -> MedWatchResult<SpikeAnalysis> {
        let db = self.db.lock()?;
        let detector = analytics::SpikeDetector::new(&db, &self.config);
        Ok(detector.detect(drug_id, window_days.unwrap_or(self.config.window_days))?)
    }

    /// Scan all patients with concurrent prescriptions for interactions.
    pub fn detect_interactions(&self) -> MedWatchResult<InteractionScan> {
        let db = self.db.lock()?;
        let detector =
            analytics::InteractionDetector::new(&db, self.client.as_ref(), &self.config);
        Ok(detector.detect_all()?)
    }

    /// Scan the interactions introduced by one prescription.
    pub fn detect_interactions_for(
        &self,
        prescription_id: &str,
    ) -> MedWatchResult<InteractionScan> {
        let db = self.db.lock()?;
        let detector =
            analytics::InteractionDetector::new(&db, self.client.as_ref(), &self.config);
        Ok(detector.detect_for_prescription(prescription_id)?)
    }

    // -- alerts ---------------------------------------------------------------

    pub fn list_alerts(&self, filter: &AlertFilter) -> MedWatchResult<Vec<AnalyticsAlert>> {
        let db = self.db.lock()?;
        Ok(db.list_alerts(filter)?)
    }

    pub fn get_alert(&self, id: &str) -> MedWatchResult<Option<AnalyticsAlert>> {
        let db = self.db.lock()?;
        Ok(db.get_alert(id)?)
    }

    /// Resolve an alert. Resolving twice keeps the original resolution.
    pub fn resolve_alert(
        &self,
        id: &str,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> MedWatchResult<AnalyticsAlert> {
        let db = self.db.lock()?;
        Ok(db.resolve_alert(id, resolved_by, notes)?)
    }
}
