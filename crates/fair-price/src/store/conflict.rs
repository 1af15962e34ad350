use crate::domain::{PropertyField, PropertyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two confidently matched records disagree on an immutable fact.
///
/// The canonical property keeps the retained value until someone reviews the conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationConflict {
    pub property_id: PropertyId,
    pub field: PropertyField,
    pub retained_value: String,
    pub retained_source: Option<String>,
    pub incoming_value: String,
    pub incoming_source: String,
    pub incoming_record_id: String,
    pub tolerance: u32,
    pub observed_at: DateTime<Utc>,
}

impl fmt::Display for ReconciliationConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: kept {} ({}) over {} from {}/{} (tolerance {})",
            self.field,
            self.property_id,
            self.retained_value,
            self.retained_source.as_deref().unwrap_or("unknown source"),
            self.incoming_value,
            self.incoming_source,
            self.incoming_record_id,
            self.tolerance
        )
    }
}
