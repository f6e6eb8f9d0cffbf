//! Drug catalog model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A prescribable drug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Drug {
    /// Unique identifier
    pub id: String,
    /// Primary drug name
    pub name: String,
    /// Therapeutic class (e.g., "anticoagulant")
    pub drug_class: Option<String>,
    /// Textual description, used as input to interaction analysis
    pub description: Option<String>,
    /// Whether the drug is currently prescribable
    pub is_active: bool,
}

impl Drug {
    /// Create a new active drug.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            drug_class: None,
            description: None,
            is_active: true,
        }
    }
}
