//! Drug interaction database operations.

use rusqlite::{params, OptionalExtension};

use super::{normalize_timestamp, to_db_timestamp, Database, DbError, DbResult};
use crate::models::{DrugPair, InteractionSeverity, KnownDrugInteraction};

impl Database {
    /// Insert an interaction unless one already exists for the pair.
    ///
    /// Returns true if the row was inserted. The unique index on the
    /// normalized pair makes this idempotent under concurrent discovery.
    pub fn insert_interaction_if_absent(
        &self,
        interaction: &KnownDrugInteraction,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            INSERT INTO drug_interactions (
                id, drug_id_1, drug_id_2, severity, description,
                confidence, discovered_by_analytics, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (drug_id_1, drug_id_2) DO NOTHING
            "#,
            params![
                interaction.id,
                interaction.pair.first(),
                interaction.pair.second(),
                interaction.severity.as_str(),
                interaction.description,
                interaction.confidence,
                interaction.discovered_by_analytics,
                to_db_timestamp(interaction.created_at),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Look up the interaction record for a pair, in either argument order.
    pub fn find_interaction(&self, pair: &DrugPair) -> DbResult<Option<KnownDrugInteraction>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, drug_id_1, drug_id_2, severity, description,
                       confidence, discovered_by_analytics, created_at
                FROM drug_interactions WHERE drug_id_1 = ?1 AND drug_id_2 = ?2
                "#,
                params![pair.first(), pair.second()],
                map_interaction_row,
            )
            .optional()?;
        row.map(|r| r.try_into()).transpose()
    }

    /// List all known interactions.
    pub fn list_interactions(&self) -> DbResult<Vec<KnownDrugInteraction>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, drug_id_1, drug_id_2, severity, description,
                   confidence, discovered_by_analytics, created_at
            FROM drug_interactions ORDER BY drug_id_1, drug_id_2
            "#,
        )?;
        let mapped = stmt.query_map([], map_interaction_row)?;

        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row?);
        }
        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

struct InteractionRow {
    id: String,
    drug_id_1: String,
    drug_id_2: String,
    severity: String,
    description: String,
    confidence: f64,
    discovered_by_analytics: bool,
    created_at: String,
}

fn map_interaction_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InteractionRow> {
    Ok(InteractionRow {
        id: row.get(0)?,
        drug_id_1: row.get(1)?,
        drug_id_2: row.get(2)?,
        severity: row.get(3)?,
        description: row.get(4)?,
        confidence: row.get(5)?,
        discovered_by_analytics: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl TryFrom<InteractionRow> for KnownDrugInteraction {
    type Error = DbError;

    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        let severity = InteractionSeverity::parse(&row.severity)
            .ok_or_else(|| DbError::Constraint(format!("bad severity: {}", row.severity)))?;
        Ok(KnownDrugInteraction {
            id: row.id,
            pair: DrugPair::new(row.drug_id_1, row.drug_id_2),
            severity,
            description: row.description,
            confidence: row.confidence,
            discovered_by_analytics: row.discovered_by_analytics,
            created_at: normalize_timestamp(&row.created_at)?,
        })
    }
}
