use super::property::PropertyId;
use super::transaction::TransactionId;
use crate::pricing::ConfidenceScore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EstimateId(Uuid);

impl EstimateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EstimateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EstimateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Audit reference to the record a comparable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ComparableRef {
    Transaction(TransactionId),
    Property(PropertyId),
}

impl fmt::Display for ComparableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(id) => write!(f, "{id}"),
            Self::Property(id) => write!(f, "property:{id}"),
        }
    }
}

/// One run of the engine for one property. Appended to history, never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationEstimate {
    pub id: EstimateId,
    pub property_id: PropertyId,
    pub point_estimate: u64,
    pub low: u64,
    pub high: u64,
    pub confidence: ConfidenceScore,
    pub comparables: Vec<ComparableRef>,
    pub window_months: u32,
    pub as_of: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl ValuationEstimate {
    pub fn confidence_value(&self) -> f64 {
        self.confidence.value
    }
}
