//! Analytics engine: spike detection, interaction detection, alert
//! materialization, report generation and the periodic orchestrator.

mod alerting;
mod interactions;
mod orchestrator;
mod report;
mod spike;

pub use alerting::AlertMaterializer;
pub use interactions::{InteractionDetector, InteractionFinding, InteractionScan};
pub use orchestrator::{AnalysisOrchestrator, AnalysisOutcome};
pub use report::{AnalyticsReport, DrugStats, ReportGenerator};
pub use spike::{SpikeAnalysis, SpikeDetector, SpikeMetrics};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DbError;

/// Analytics errors.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Text analysis error: {0}")]
    Analysis(#[from] medwatch_llm::AnalysisError),

    #[error("Invalid alert candidate: {0}")]
    InvalidCandidate(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// A failure scoped to one unit of work in a pass. The orchestrator
/// records these and keeps going; they never abort the pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitError {
    /// What was being analyzed ("drug:<id>", "pair:<a>:<b>")
    pub unit: String,
    pub detail: String,
}

impl UnitError {
    pub fn new(unit: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            detail: detail.into(),
        }
    }
}
