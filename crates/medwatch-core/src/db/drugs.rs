//! Drug database operations.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{to_db_timestamp, Database, DbResult};
use crate::models::Drug;

impl Database {
    /// Insert a drug.
    pub fn insert_drug(&self, drug: &Drug) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO drugs (id, name, drug_class, description, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                drug.id,
                drug.name,
                drug.drug_class,
                drug.description,
                drug.is_active,
                to_db_timestamp(Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Get a drug by id.
    pub fn get_drug(&self, id: &str) -> DbResult<Option<Drug>> {
        let drug = self
            .conn
            .query_row(
                "SELECT id, name, drug_class, description, is_active FROM drugs WHERE id = ?",
                [id],
                |row| {
                    Ok(Drug {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        drug_class: row.get(2)?,
                        description: row.get(3)?,
                        is_active: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(drug)
    }

    /// List all active drugs, ordered by name.
    pub fn list_active_drugs(&self) -> DbResult<Vec<Drug>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, drug_class, description, is_active FROM drugs
             WHERE is_active = 1 ORDER BY name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(Drug {
                id: row.get(0)?,
                name: row.get(1)?,
                drug_class: row.get(2)?,
                description: row.get(3)?,
                is_active: row.get(4)?,
            })
        })?;

        let mut drugs = Vec::new();
        for row in rows {
            drugs.push(row?);
        }
        Ok(drugs)
    }

    /// Mark a drug as inactive (soft delete).
    pub fn deactivate_drug(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("UPDATE drugs SET is_active = 0 WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}
