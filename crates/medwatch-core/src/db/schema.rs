//! SQLite schema definition.

/// Complete database schema for medwatch.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Drugs
-- ============================================================================

CREATE TABLE IF NOT EXISTS drugs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    drug_class TEXT,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_drugs_active ON drugs(is_active);
CREATE INDEX IF NOT EXISTS idx_drugs_name ON drugs(name);

-- ============================================================================
-- Prescriptions
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    doctor_id TEXT NOT NULL,
    drug_id TEXT NOT NULL REFERENCES drugs(id),
    is_active INTEGER NOT NULL DEFAULT 1,
    start_date TEXT NOT NULL,
    end_date TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id);
CREATE INDEX IF NOT EXISTS idx_prescriptions_active ON prescriptions(is_active);
CREATE INDEX IF NOT EXISTS idx_prescriptions_drug ON prescriptions(drug_id);

-- ============================================================================
-- Side-Effect Reports (read-only to analytics)
-- ============================================================================

CREATE TABLE IF NOT EXISTS side_effect_reports (
    id TEXT PRIMARY KEY,
    drug_id TEXT NOT NULL REFERENCES drugs(id),
    prescription_id TEXT REFERENCES prescriptions(id),
    patient_id TEXT NOT NULL,
    description TEXT NOT NULL,
    severity TEXT NOT NULL CHECK (severity IN ('mild', 'moderate', 'severe')),
    is_concerning INTEGER NOT NULL DEFAULT 0,
    is_anonymous INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_drug_created ON side_effect_reports(drug_id, created_at);
CREATE INDEX IF NOT EXISTS idx_reports_anonymous ON side_effect_reports(is_anonymous);
CREATE INDEX IF NOT EXISTS idx_reports_patient ON side_effect_reports(patient_id);

-- ============================================================================
-- Known Drug Interactions
-- ============================================================================

-- One row per unordered pair: ids are stored normalized (drug_id_1 < drug_id_2)
-- and the unique constraint makes concurrent discovery inserts idempotent.
CREATE TABLE IF NOT EXISTS drug_interactions (
    id TEXT PRIMARY KEY,
    drug_id_1 TEXT NOT NULL REFERENCES drugs(id),
    drug_id_2 TEXT NOT NULL REFERENCES drugs(id),
    severity TEXT NOT NULL CHECK (severity IN ('minor', 'moderate', 'major', 'contraindicated')),
    description TEXT NOT NULL,
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    discovered_by_analytics INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    CHECK (drug_id_1 < drug_id_2),
    UNIQUE (drug_id_1, drug_id_2)
);

-- ============================================================================
-- Analytics Alerts (Append-Only audit trail)
-- ============================================================================

CREATE TABLE IF NOT EXISTS analytics_alerts (
    id TEXT PRIMARY KEY,
    alert_type TEXT NOT NULL CHECK (alert_type IN ('side_effect_spike', 'drug_interaction')),
    subject_key TEXT NOT NULL,
    drug_ids TEXT NOT NULL DEFAULT '[]',          -- JSON array of drug ids
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    severity TEXT NOT NULL CHECK (severity IN ('low', 'medium', 'high', 'critical')),
    confidence_score REAL NOT NULL CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
    affected_patient_count INTEGER NOT NULL DEFAULT 0,
    data_points TEXT NOT NULL DEFAULT '{}',       -- JSON evidence payload
    recommendations TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    is_resolved INTEGER NOT NULL DEFAULT 0,
    resolved_by TEXT,
    resolved_at TEXT,
    resolution_notes TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_type ON analytics_alerts(alert_type);
CREATE INDEX IF NOT EXISTS idx_alerts_resolved ON analytics_alerts(is_resolved);
CREATE INDEX IF NOT EXISTS idx_alerts_subject ON analytics_alerts(subject_key);
CREATE INDEX IF NOT EXISTS idx_alerts_created ON analytics_alerts(created_at);

-- Alerts are never deleted
CREATE TRIGGER IF NOT EXISTS analytics_alerts_no_delete BEFORE DELETE ON analytics_alerts
BEGIN
    SELECT RAISE(ABORT, 'Alerts are append-only and cannot be deleted');
END;

-- Resolution is irreversible
CREATE TRIGGER IF NOT EXISTS analytics_alerts_no_unresolve BEFORE UPDATE ON analytics_alerts
WHEN old.is_resolved = 1 AND new.is_resolved = 0
BEGIN
    SELECT RAISE(ABORT, 'Resolved alerts cannot be reopened');
END;
"#;
