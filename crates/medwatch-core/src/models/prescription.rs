//! Prescription model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A prescription linking a patient to a drug.
///
/// Owned by the prescription workflow; analytics only reads these to
/// determine which drugs a patient is concurrently taking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub drug_id: String,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Prescription {
    /// Create a new active prescription starting now.
    pub fn new(
        patient_id: impl Into<String>,
        doctor_id: impl Into<String>,
        drug_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            patient_id: patient_id.into(),
            doctor_id: doctor_id.into(),
            drug_id: drug_id.into(),
            is_active: true,
            start_date: now,
            end_date: None,
            created_at: now,
        }
    }
}
