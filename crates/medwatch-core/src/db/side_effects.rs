//! Side-effect report database operations.
//!
//! Analytics treats these rows as read-only input. Every aggregate below
//! counts anonymous reports only: non-anonymous reports never feed a
//! cross-patient statistic.

use chrono::{DateTime, Utc};
use rusqlite::{params, ToSql};

use super::{normalize_timestamp, to_db_timestamp, Database, DbError, DbResult};
use crate::models::{ReportSeverity, SeverityCounts, SideEffectReport};

/// Filter for report queries. All fields are conjunctive; `created_after`
/// is inclusive, `created_before` exclusive, so adjacent windows partition.
#[derive(Debug, Clone, Default)]
pub struct SideEffectFilter {
    pub drug_id: Option<String>,
    pub patient_id: Option<String>,
    pub is_anonymous: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl Database {
    /// Insert a side-effect report.
    pub fn insert_report(&self, report: &SideEffectReport) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO side_effect_reports (
                id, drug_id, prescription_id, patient_id, description,
                severity, is_concerning, is_anonymous, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                report.id,
                report.drug_id,
                report.prescription_id,
                report.patient_id,
                report.description,
                report.severity.as_str(),
                report.is_concerning,
                report.is_anonymous,
                to_db_timestamp(report.created_at),
            ],
        )?;
        Ok(())
    }

    /// Find reports matching a filter, newest first.
    pub fn find_reports(&self, filter: &SideEffectFilter) -> DbResult<Vec<SideEffectReport>> {
        let mut sql = String::from(
            r#"
            SELECT id, drug_id, prescription_id, patient_id, description,
                   severity, is_concerning, is_anonymous, created_at
            FROM side_effect_reports WHERE 1=1
            "#,
        );
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(drug_id) = &filter.drug_id {
            sql.push_str(" AND drug_id = ?");
            values.push(Box::new(drug_id.clone()));
        }
        if let Some(patient_id) = &filter.patient_id {
            sql.push_str(" AND patient_id = ?");
            values.push(Box::new(patient_id.clone()));
        }
        if let Some(anonymous) = filter.is_anonymous {
            sql.push_str(" AND is_anonymous = ?");
            values.push(Box::new(anonymous));
        }
        if let Some(after) = filter.created_after {
            sql.push_str(" AND created_at >= ?");
            values.push(Box::new(to_db_timestamp(after)));
        }
        if let Some(before) = filter.created_before {
            sql.push_str(" AND created_at < ?");
            values.push(Box::new(to_db_timestamp(before)));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let mapped = stmt.query_map(params.as_slice(), map_report_row)?;

        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row?);
        }
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Count anonymous reports for a drug in the half-open window [from, until).
    pub fn count_anonymous_reports(
        &self,
        drug_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM side_effect_reports
            WHERE drug_id = ?1 AND is_anonymous = 1
              AND created_at >= ?2 AND created_at < ?3
            "#,
            params![drug_id, to_db_timestamp(from), to_db_timestamp(until)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Per-severity anonymous report counts for a drug since `from`.
    pub fn severity_counts(&self, drug_id: &str, from: DateTime<Utc>) -> DbResult<SeverityCounts> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT severity, COUNT(*) FROM side_effect_reports
            WHERE drug_id = ?1 AND is_anonymous = 1 AND created_at >= ?2
            GROUP BY severity
            "#,
        )?;
        let mapped = stmt.query_map(params![drug_id, to_db_timestamp(from)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;

        let mut counts = SeverityCounts::default();
        for row in mapped {
            let (severity, count) = row?;
            match ReportSeverity::parse(&severity) {
                Some(ReportSeverity::Mild) => counts.mild = count,
                Some(ReportSeverity::Moderate) => counts.moderate = count,
                Some(ReportSeverity::Severe) => counts.severe = count,
                None => return Err(DbError::Constraint(format!("bad severity: {}", severity))),
            }
        }
        Ok(counts)
    }

    /// Count anonymous reports for a drug flagged concerning since `from`.
    pub fn count_concerning_reports(&self, drug_id: &str, from: DateTime<Utc>) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM side_effect_reports
            WHERE drug_id = ?1 AND is_anonymous = 1 AND is_concerning = 1
              AND created_at >= ?2
            "#,
            params![drug_id, to_db_timestamp(from)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count distinct patients behind anonymous reports for a drug since `from`.
    pub fn count_distinct_reporters(&self, drug_id: &str, from: DateTime<Utc>) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            r#"
            SELECT COUNT(DISTINCT patient_id) FROM side_effect_reports
            WHERE drug_id = ?1 AND is_anonymous = 1 AND created_at >= ?2
            "#,
            params![drug_id, to_db_timestamp(from)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count anonymous reports across all drugs since `from`.
    pub fn count_recent_anonymous_reports(&self, from: DateTime<Utc>) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM side_effect_reports WHERE is_anonymous = 1 AND created_at >= ?",
            [to_db_timestamp(from)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

struct ReportRow {
    id: String,
    drug_id: String,
    prescription_id: Option<String>,
    patient_id: String,
    description: String,
    severity: String,
    is_concerning: bool,
    is_anonymous: bool,
    created_at: String,
}

fn map_report_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        drug_id: row.get(1)?,
        prescription_id: row.get(2)?,
        patient_id: row.get(3)?,
        description: row.get(4)?,
        severity: row.get(5)?,
        is_concerning: row.get(6)?,
        is_anonymous: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl TryFrom<ReportRow> for SideEffectReport {
    type Error = DbError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let severity = ReportSeverity::parse(&row.severity)
            .ok_or_else(|| DbError::Constraint(format!("bad severity: {}", row.severity)))?;
        Ok(SideEffectReport {
            id: row.id,
            drug_id: row.drug_id,
            prescription_id: row.prescription_id,
            patient_id: row.patient_id,
            description: row.description,
            severity,
            is_concerning: row.is_concerning,
            is_anonymous: row.is_anonymous,
            created_at: normalize_timestamp(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Drug;
    use chrono::Duration;

    fn setup_db() -> (Database, Drug) {
        let db = Database::open_in_memory().unwrap();
        let drug = Drug::new("Warfarin");
        db.insert_drug(&drug).unwrap();
        (db, drug)
    }

    fn report_at(
        drug_id: &str,
        patient_id: &str,
        severity: ReportSeverity,
        created_at: DateTime<Utc>,
    ) -> SideEffectReport {
        let mut report =
            SideEffectReport::new(drug_id, patient_id, "nausea", severity).anonymous();
        report.created_at = created_at;
        report
    }

    #[test]
    fn test_insert_and_find() {
        let (db, drug) = setup_db();
        let report = SideEffectReport::new(&drug.id, "p1", "headache", ReportSeverity::Mild);
        db.insert_report(&report).unwrap();

        let found = db
            .find_reports(&SideEffectFilter {
                drug_id: Some(drug.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], report);
    }

    #[test]
    fn test_window_boundaries_half_open() {
        let (db, drug) = setup_db();
        let now = Utc::now();
        let from = now - Duration::days(7);

        // Exactly at `from` counts, exactly at `until` does not.
        db.insert_report(&report_at(&drug.id, "p1", ReportSeverity::Mild, from))
            .unwrap();
        db.insert_report(&report_at(&drug.id, "p2", ReportSeverity::Mild, now))
            .unwrap();
        db.insert_report(&report_at(
            &drug.id,
            "p3",
            ReportSeverity::Mild,
            now - Duration::days(3),
        ))
        .unwrap();

        let count = db.count_anonymous_reports(&drug.id, from, now).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_aggregates_ignore_non_anonymous() {
        let (db, drug) = setup_db();
        let now = Utc::now();
        let from = now - Duration::days(30);

        db.insert_report(&report_at(
            &drug.id,
            "p1",
            ReportSeverity::Severe,
            now - Duration::days(1),
        ))
        .unwrap();

        // Identifiable report: must not appear in any aggregate
        let mut identifiable =
            SideEffectReport::new(&drug.id, "p2", "dizziness", ReportSeverity::Severe);
        identifiable.created_at = now - Duration::days(1);
        db.insert_report(&identifiable).unwrap();

        assert_eq!(
            db.count_anonymous_reports(&drug.id, from, now + Duration::seconds(1))
                .unwrap(),
            1
        );
        assert_eq!(db.severity_counts(&drug.id, from).unwrap().severe, 1);
        assert_eq!(db.count_distinct_reporters(&drug.id, from).unwrap(), 1);
        assert_eq!(db.count_recent_anonymous_reports(from).unwrap(), 1);
    }

    #[test]
    fn test_severity_counts_grouping() {
        let (db, drug) = setup_db();
        let now = Utc::now();
        let at = now - Duration::hours(1);

        for (patient, severity) in [
            ("p1", ReportSeverity::Mild),
            ("p2", ReportSeverity::Mild),
            ("p3", ReportSeverity::Moderate),
            ("p4", ReportSeverity::Severe),
        ] {
            db.insert_report(&report_at(&drug.id, patient, severity, at))
                .unwrap();
        }

        let counts = db.severity_counts(&drug.id, now - Duration::days(1)).unwrap();
        assert_eq!(counts.mild, 2);
        assert_eq!(counts.moderate, 1);
        assert_eq!(counts.severe, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_distinct_reporters_deduplicates_patients() {
        let (db, drug) = setup_db();
        let at = Utc::now() - Duration::hours(1);

        db.insert_report(&report_at(&drug.id, "p1", ReportSeverity::Mild, at))
            .unwrap();
        db.insert_report(&report_at(&drug.id, "p1", ReportSeverity::Severe, at))
            .unwrap();
        db.insert_report(&report_at(&drug.id, "p2", ReportSeverity::Mild, at))
            .unwrap();

        let reporters = db
            .count_distinct_reporters(&drug.id, Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(reporters, 2);
    }

    #[test]
    fn test_concerning_counter() {
        let (db, drug) = setup_db();
        let at = Utc::now() - Duration::hours(1);

        let mut concerning = report_at(&drug.id, "p1", ReportSeverity::Severe, at);
        concerning.is_concerning = true;
        db.insert_report(&concerning).unwrap();
        db.insert_report(&report_at(&drug.id, "p2", ReportSeverity::Mild, at))
            .unwrap();

        let count = db
            .count_concerning_reports(&drug.id, Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(count, 1);
    }
}
