//! Comparable selection: which past sales inform a valuation, and how much each counts.

mod candidates;
mod query;
mod select;
mod similarity;

pub use candidates::{gather_candidates, Candidate};
pub use query::{
    ComparableQuery, GeographyScope, InvalidWindowSchedule, SelectionPolicy, SimilarityWeights,
    StructuralTolerance, TargetProfile, WindowSchedule,
};
pub use select::select_comparables;

use crate::domain::{Address, ComparableRef, CoreStructure, PropertyId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparable {
    pub reference: ComparableRef,
    pub property_id: Option<PropertyId>,
    pub address: Address,
    pub price: u64,
    pub sale_date: NaiveDate,
    pub structure: CoreStructure,
    pub age_months: f64,
    pub distance_km: Option<f64>,
    pub weight: f64,
}

/// Ephemeral result of one selection, ordered by weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparableSet {
    pub target: PropertyId,
    pub query: ComparableQuery,
    /// Window actually used after widening.
    pub window_months: u32,
    pub ring_used: bool,
    /// Candidates inside the chosen window before outlier fencing and truncation.
    pub candidates_found: usize,
    pub outliers_removed: usize,
    pub comparables: Vec<Comparable>,
}

impl ComparableSet {
    pub fn len(&self) -> usize {
        self.comparables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparables.is_empty()
    }

    pub fn references(&self) -> Vec<ComparableRef> {
        self.comparables.iter().map(|c| c.reference).collect()
    }

    pub fn oldest_age_months(&self) -> Option<f64> {
        self.comparables
            .iter()
            .map(|c| c.age_months)
            .max_by(f64::total_cmp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("property {property_id} lacks {} needed for comparable selection", .missing.join(", "))]
    IncompleteTarget {
        property_id: PropertyId,
        missing: Vec<&'static str>,
    },
}
