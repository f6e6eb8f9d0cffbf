//! Prescription database operations.

use rusqlite::{params, OptionalExtension};

use super::{normalize_timestamp, to_db_timestamp, Database, DbError, DbResult};
use crate::models::Prescription;

impl Database {
    /// Insert a prescription.
    pub fn insert_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                id, patient_id, doctor_id, drug_id, is_active, start_date, end_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                prescription.id,
                prescription.patient_id,
                prescription.doctor_id,
                prescription.drug_id,
                prescription.is_active,
                to_db_timestamp(prescription.start_date),
                prescription.end_date.map(to_db_timestamp),
                to_db_timestamp(prescription.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a prescription by id.
    pub fn get_prescription(&self, id: &str) -> DbResult<Option<Prescription>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, patient_id, doctor_id, drug_id, is_active, start_date, end_date, created_at
                FROM prescriptions WHERE id = ?
                "#,
                [id],
                map_prescription_row,
            )
            .optional()?;

        row.map(|r| r.try_into()).transpose()
    }

    /// List active prescriptions, optionally for a single patient.
    pub fn list_active_prescriptions(&self, patient_id: Option<&str>) -> DbResult<Vec<Prescription>> {
        let base = r#"
            SELECT id, patient_id, doctor_id, drug_id, is_active, start_date, end_date, created_at
            FROM prescriptions WHERE is_active = 1
        "#;

        let mut rows = Vec::new();
        match patient_id {
            Some(pid) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{} AND patient_id = ? ORDER BY patient_id, drug_id", base))?;
                let mapped = stmt.query_map([pid], map_prescription_row)?;
                for row in mapped {
                    rows.push(row?);
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{} ORDER BY patient_id, drug_id", base))?;
                let mapped = stmt.query_map([], map_prescription_row)?;
                for row in mapped {
                    rows.push(row?);
                }
            }
        }

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Deactivate a prescription (patient stopped taking the drug).
    pub fn deactivate_prescription(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("UPDATE prescriptions SET is_active = 0 WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct PrescriptionRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    drug_id: String,
    is_active: bool,
    start_date: String,
    end_date: Option<String>,
    created_at: String,
}

fn map_prescription_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrescriptionRow> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        drug_id: row.get(3)?,
        is_active: row.get(4)?,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DbError;

    fn try_from(row: PrescriptionRow) -> Result<Self, Self::Error> {
        Ok(Prescription {
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            drug_id: row.drug_id,
            is_active: row.is_active,
            start_date: normalize_timestamp(&row.start_date)?,
            end_date: row.end_date.map(|s| normalize_timestamp(&s)).transpose()?,
            created_at: normalize_timestamp(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Drug;

    fn setup_db() -> (Database, Drug) {
        let db = Database::open_in_memory().unwrap();
        let drug = Drug::new("Warfarin");
        db.insert_drug(&drug).unwrap();
        (db, drug)
    }

    #[test]
    fn test_insert_and_get() {
        let (db, drug) = setup_db();

        let prescription = Prescription::new("patient-1", "doctor-1", &drug.id);
        db.insert_prescription(&prescription).unwrap();

        let retrieved = db.get_prescription(&prescription.id).unwrap().unwrap();
        assert_eq!(retrieved.patient_id, "patient-1");
        assert_eq!(retrieved.drug_id, drug.id);
        assert!(retrieved.end_date.is_none());
    }

    #[test]
    fn test_list_active_by_patient() {
        let (db, drug) = setup_db();
        let other_drug = Drug::new("Aspirin");
        db.insert_drug(&other_drug).unwrap();

        db.insert_prescription(&Prescription::new("patient-1", "doc", &drug.id))
            .unwrap();
        db.insert_prescription(&Prescription::new("patient-1", "doc", &other_drug.id))
            .unwrap();
        db.insert_prescription(&Prescription::new("patient-2", "doc", &drug.id))
            .unwrap();

        let all = db.list_active_prescriptions(None).unwrap();
        assert_eq!(all.len(), 3);

        let p1 = db.list_active_prescriptions(Some("patient-1")).unwrap();
        assert_eq!(p1.len(), 2);
    }

    #[test]
    fn test_deactivated_excluded() {
        let (db, drug) = setup_db();

        let prescription = Prescription::new("patient-1", "doc", &drug.id);
        db.insert_prescription(&prescription).unwrap();
        db.deactivate_prescription(&prescription.id).unwrap();

        assert!(db.list_active_prescriptions(None).unwrap().is_empty());
    }
}
