//! Analytics alert database operations.
//!
//! Alerts are append-only: rows are inserted by the materializer, flipped to
//! resolved exactly once by a human, and never deleted. Schema triggers back
//! both rules so raw SQL cannot bypass them.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, ToSql};

use super::{normalize_timestamp, to_db_timestamp, Database, DbError, DbResult};
use crate::models::{AlertFilter, AlertSeverity, AlertType, AnalyticsAlert};

const DEFAULT_LIST_LIMIT: usize = 50;

const ALERT_COLUMNS: &str = r#"
    id, alert_type, subject_key, drug_ids, title, description, severity,
    confidence_score, affected_patient_count, data_points, recommendations,
    is_resolved, resolved_by, resolved_at, resolution_notes, created_at
"#;

impl Database {
    /// Insert an alert unless an unresolved alert for the same subject
    /// already exists at or after `dedup_cutoff`.
    ///
    /// Insert and duplicate check run as one statement, so two concurrent
    /// passes over the same subject cannot both insert. Returns true if the
    /// row was inserted.
    pub fn insert_alert_deduped(
        &self,
        alert: &AnalyticsAlert,
        dedup_cutoff: DateTime<Utc>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            INSERT INTO analytics_alerts (
                id, alert_type, subject_key, drug_ids, title, description, severity,
                confidence_score, affected_patient_count, data_points, recommendations,
                is_resolved, resolved_by, resolved_at, resolution_notes, created_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16
            WHERE NOT EXISTS (
                SELECT 1 FROM analytics_alerts
                WHERE alert_type = ?2 AND subject_key = ?3
                  AND is_resolved = 0 AND created_at >= ?17
            )
            "#,
            params![
                alert.id,
                alert.alert_type.as_str(),
                alert.subject_key,
                serde_json::to_string(&alert.drug_ids)?,
                alert.title,
                alert.description,
                alert.severity.as_str(),
                alert.confidence_score,
                alert.affected_patient_count,
                serde_json::to_string(&alert.data_points)?,
                serde_json::to_string(&alert.recommendations)?,
                alert.is_resolved,
                alert.resolved_by,
                alert.resolved_at.map(to_db_timestamp),
                alert.resolution_notes,
                to_db_timestamp(alert.created_at),
                to_db_timestamp(dedup_cutoff),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an alert by id.
    pub fn get_alert(&self, id: &str) -> DbResult<Option<AnalyticsAlert>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM analytics_alerts WHERE id = ?",
                    ALERT_COLUMNS
                ),
                [id],
                map_alert_row,
            )
            .optional()?;
        row.map(|r| r.try_into()).transpose()
    }

    /// List alerts matching a filter, newest first.
    pub fn list_alerts(&self, filter: &AlertFilter) -> DbResult<Vec<AnalyticsAlert>> {
        let mut sql = format!(
            "SELECT {} FROM analytics_alerts WHERE 1=1",
            ALERT_COLUMNS
        );
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(alert_type) = filter.alert_type {
            sql.push_str(" AND alert_type = ?");
            values.push(Box::new(alert_type.as_str()));
        }
        if let Some(severity) = filter.severity {
            sql.push_str(" AND severity = ?");
            values.push(Box::new(severity.as_str()));
        }
        if let Some(resolved) = filter.is_resolved {
            sql.push_str(" AND is_resolved = ?");
            values.push(Box::new(resolved));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        values.push(Box::new(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT) as i64));

        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let mapped = stmt.query_map(params.as_slice(), map_alert_row)?;

        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row?);
        }
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// List alerts created at or after `after`, newest first.
    pub fn list_alerts_since(&self, after: DateTime<Utc>) -> DbResult<Vec<AnalyticsAlert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM analytics_alerts WHERE created_at >= ? ORDER BY created_at DESC",
            ALERT_COLUMNS
        ))?;
        let mapped = stmt.query_map([to_db_timestamp(after)], map_alert_row)?;

        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row?);
        }
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Resolve an alert. Resolving an already-resolved alert is a no-op that
    /// returns the stored row; the original resolution is never overwritten.
    pub fn resolve_alert(
        &self,
        id: &str,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> DbResult<AnalyticsAlert> {
        self.conn.execute(
            r#"
            UPDATE analytics_alerts
            SET is_resolved = 1, resolved_by = ?2, resolved_at = ?3, resolution_notes = ?4
            WHERE id = ?1 AND is_resolved = 0
            "#,
            params![id, resolved_by, to_db_timestamp(Utc::now()), notes],
        )?;

        self.get_alert(id)?
            .ok_or_else(|| DbError::NotFound(format!("alert {}", id)))
    }

    /// Count unresolved alerts.
    pub fn count_unresolved_alerts(&self) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM analytics_alerts WHERE is_resolved = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count unresolved high or critical alerts.
    pub fn count_unresolved_severe_alerts(&self) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM analytics_alerts
            WHERE is_resolved = 0 AND severity IN ('high', 'critical')
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

struct AlertRow {
    id: String,
    alert_type: String,
    subject_key: String,
    drug_ids: String,
    title: String,
    description: String,
    severity: String,
    confidence_score: f64,
    affected_patient_count: u32,
    data_points: String,
    recommendations: String,
    is_resolved: bool,
    resolved_by: Option<String>,
    resolved_at: Option<String>,
    resolution_notes: Option<String>,
    created_at: String,
}

fn map_alert_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRow> {
    Ok(AlertRow {
        id: row.get(0)?,
        alert_type: row.get(1)?,
        subject_key: row.get(2)?,
        drug_ids: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        severity: row.get(6)?,
        confidence_score: row.get(7)?,
        affected_patient_count: row.get(8)?,
        data_points: row.get(9)?,
        recommendations: row.get(10)?,
        is_resolved: row.get(11)?,
        resolved_by: row.get(12)?,
        resolved_at: row.get(13)?,
        resolution_notes: row.get(14)?,
        created_at: row.get(15)?,
    })
}

impl TryFrom<AlertRow> for AnalyticsAlert {
    type Error = DbError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let alert_type = AlertType::parse(&row.alert_type)
            .ok_or_else(|| DbError::Constraint(format!("bad alert type: {}", row.alert_type)))?;
        let severity = AlertSeverity::parse(&row.severity)
            .ok_or_else(|| DbError::Constraint(format!("bad severity: {}", row.severity)))?;

        Ok(AnalyticsAlert {
            id: row.id,
            alert_type,
            subject_key: row.subject_key,
            drug_ids: serde_json::from_str(&row.drug_ids)?,
            title: row.title,
            description: row.description,
            severity,
            confidence_score: row.confidence_score,
            affected_patient_count: row.affected_patient_count,
            data_points: serde_json::from_str(&row.data_points)?,
            recommendations: serde_json::from_str(&row.recommendations)?,
            is_resolved: row.is_resolved,
            resolved_by: row.resolved_by,
            resolved_at: row
                .resolved_at
                .map(|s| normalize_timestamp(&s))
                .transpose()?,
            resolution_notes: row.resolution_notes,
            created_at: normalize_timestamp(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertCandidate, AlertSubject};
    use chrono::Duration;

    fn spike_candidate(drug_id: &str) -> AlertCandidate {
        AlertCandidate {
            alert_type: AlertType::SideEffectSpike,
            subject: AlertSubject::Drug(drug_id.into()),
            title: format!("Side effect spike for {}", drug_id),
            description: "Report rate increased sharply".into(),
            severity: AlertSeverity::High,
            confidence_score: 0.8,
            affected_patient_count: 12,
            data_points: serde_json::json!({"recentCount": 25, "baselineCount": 4}),
            recommendations: vec!["Review recent prescriptions for this drug".into()],
        }
    }

    fn cutoff() -> DateTime<Utc> {
        Utc::now() - Duration::days(30)
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let alert = AnalyticsAlert::from_candidate(spike_candidate("d1"));

        assert!(db.insert_alert_deduped(&alert, cutoff()).unwrap());

        let stored = db.get_alert(&alert.id).unwrap().unwrap();
        assert_eq!(stored.subject_key, "drug:d1");
        assert_eq!(stored.drug_ids, vec!["d1".to_string()]);
        assert_eq!(stored.data_points["recentCount"], 25);
        assert!(!stored.is_resolved);
    }

    #[test]
    fn test_dedup_suppresses_same_subject() {
        let db = Database::open_in_memory().unwrap();

        let first = AnalyticsAlert::from_candidate(spike_candidate("d1"));
        let second = AnalyticsAlert::from_candidate(spike_candidate("d1"));

        assert!(db.insert_alert_deduped(&first, cutoff()).unwrap());
        assert!(!db.insert_alert_deduped(&second, cutoff()).unwrap());
        assert_eq!(db.count_unresolved_alerts().unwrap(), 1);

        // Different subject is not suppressed
        let other = AnalyticsAlert::from_candidate(spike_candidate("d2"));
        assert!(db.insert_alert_deduped(&other, cutoff()).unwrap());
    }

    #[test]
    fn test_resolved_alert_does_not_suppress() {
        let db = Database::open_in_memory().unwrap();

        let first = AnalyticsAlert::from_candidate(spike_candidate("d1"));
        db.insert_alert_deduped(&first, cutoff()).unwrap();
        db.resolve_alert(&first.id, "dr-jones", Some("checked, recalled batch"))
            .unwrap();

        // Subject resurfaced after resolution: a new alert is allowed
        let second = AnalyticsAlert::from_candidate(spike_candidate("d1"));
        assert!(db.insert_alert_deduped(&second, cutoff()).unwrap());
    }

    #[test]
    fn test_resolve_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let alert = AnalyticsAlert::from_candidate(spike_candidate("d1"));
        db.insert_alert_deduped(&alert, cutoff()).unwrap();

        let resolved = db
            .resolve_alert(&alert.id, "dr-jones", Some("first resolution"))
            .unwrap();
        assert!(resolved.is_resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("dr-jones"));

        // Second resolve keeps the original resolution
        let again = db
            .resolve_alert(&alert.id, "dr-smith", Some("second attempt"))
            .unwrap();
        assert_eq!(again.resolved_by.as_deref(), Some("dr-jones"));
        assert_eq!(again.resolution_notes.as_deref(), Some("first resolution"));
    }

    #[test]
    fn test_resolve_missing_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let result = db.resolve_alert("nope", "dr-jones", None);
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_list_filters_and_limit() {
        let db = Database::open_in_memory().unwrap();

        for i in 0..3 {
            let mut candidate = spike_candidate(&format!("d{}", i));
            if i == 0 {
                candidate.severity = AlertSeverity::Medium;
            }
            let alert = AnalyticsAlert::from_candidate(candidate);
            db.insert_alert_deduped(&alert, cutoff()).unwrap();
        }

        let high_only = db
            .list_alerts(&AlertFilter {
                severity: Some(AlertSeverity::High),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(high_only.len(), 2);

        let limited = db
            .list_alerts(&AlertFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);

        assert_eq!(db.count_unresolved_severe_alerts().unwrap(), 2);
    }

    #[test]
    fn test_list_since_ordering() {
        let db = Database::open_in_memory().unwrap();

        let mut old = AnalyticsAlert::from_candidate(spike_candidate("d1"));
        old.created_at = Utc::now() - Duration::days(10);
        let recent = AnalyticsAlert::from_candidate(spike_candidate("d2"));

        db.insert_alert_deduped(&old, cutoff()).unwrap();
        db.insert_alert_deduped(&recent, cutoff()).unwrap();

        let since = db
            .list_alerts_since(Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].id, recent.id);
    }
}
