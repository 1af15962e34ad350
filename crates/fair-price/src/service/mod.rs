//! The three public operations (fair price, listing classification and
//! comparables) composed over the store and repositories.

mod batch;

pub use batch::{
    AbortHandle, BatchItem, BatchOptions, BatchOutcome, BatchReport, BatchResult, BatchValuation,
};

use crate::comparables::{
    gather_candidates, select_comparables, ComparableQuery, ComparableSet, SelectionError,
    TargetProfile,
};
use crate::domain::{EstimateId, PropertyId, SaleRecord, TransactionId, ValuationEstimate};
use crate::policy::ValuationPolicy;
use crate::pricing::{
    classify, compute_fair_price, score_confidence, AggregationError, Classification,
    ClassificationError,
};
use crate::repository::{RepositoryError, TransactionLog, ValuationRepository};
use crate::store::{PropertyStore, StoreError};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Why no fair price could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnavailableReason {
    NoComparables { window_months: u32 },
    InsufficientData { found: usize, required: usize },
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoComparables { window_months } => {
                write!(f, "no comparable sales within {window_months} months")
            }
            Self::InsufficientData { found, required } => {
                write!(f, "{found} comparables found, {required} required")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValuationError {
    #[error("property {0} not found")]
    PropertyNotFound(PropertyId),
    #[error(transparent)]
    IncompleteTarget(#[from] SelectionError),
    #[error("fair price not available for {property_id}: {reason}")]
    NotAvailable {
        property_id: PropertyId,
        reason: UnavailableReason,
    },
    /// The estimate was produced and recorded but is too weak to label a listing against.
    #[error(
        "valuation for {property_id} has confidence {score:.2}, below the required {minimum:.2}"
    )]
    LowConfidence {
        property_id: PropertyId,
        score: f64,
        minimum: f64,
        estimate: Box<ValuationEstimate>,
    },
    #[error("list price must be positive")]
    InvalidListPrice,
    #[error(transparent)]
    Classification(ClassificationError),
    #[error("invalid sale record: {0}")]
    InvalidSale(String),
    #[error(transparent)]
    Aggregation(AggregationError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<StoreError> for ValuationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::PropertyNotFound(id),
            other => Self::Store(other),
        }
    }
}

impl ValuationError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotAvailable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub property_id: PropertyId,
    pub estimate: ValuationEstimate,
    pub classification: Classification,
}

/// Service composing the property store, transaction log and valuation history.
pub struct ValuationService<T, V> {
    store: Arc<PropertyStore>,
    transactions: Arc<T>,
    valuations: Arc<V>,
    policy: ValuationPolicy,
}

impl<T, V> ValuationService<T, V>
where
    T: TransactionLog + 'static,
    V: ValuationRepository + 'static,
{
    pub fn new(
        store: Arc<PropertyStore>,
        transactions: Arc<T>,
        valuations: Arc<V>,
        policy: ValuationPolicy,
    ) -> Self {
        Self {
            store,
            transactions,
            valuations,
            policy,
        }
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    pub fn policy(&self) -> &ValuationPolicy {
        &self.policy
    }

    pub fn transactions(&self) -> &T {
        &self.transactions
    }

    /// Comparables for a property using the configured window schedule and result cap.
    pub fn get_comparables(
        &self,
        property_id: &PropertyId,
        as_of: NaiveDate,
    ) -> Result<ComparableSet, ValuationError> {
        self.select_comparables(property_id, as_of, None, None)
    }

    /// Comparables with an explicit initial window and/or result cap.
    pub fn select_comparables(
        &self,
        property_id: &PropertyId,
        as_of: NaiveDate,
        window_months: Option<u32>,
        max_results: Option<usize>,
    ) -> Result<ComparableSet, ValuationError> {
        let property = self.store.require(property_id)?;
        let target = TargetProfile::from_property(&property)?;

        let mut query = ComparableQuery::for_target(target, &self.policy.selection);
        if let Some(months) = window_months {
            query = query.with_initial_window(months);
        }
        if let Some(limit) = max_results {
            query = query.with_max_results(limit);
        }

        // The fallback ring may reach into neighboring zips, so it needs the whole pool.
        let ring = query.geography.fallback_radius_km.is_some();
        let transactions = if ring {
            self.transactions.all()?
        } else {
            self.transactions.for_zip(property.zip())?
        };
        let properties: Vec<_> = self
            .store
            .snapshot()?
            .into_iter()
            .filter(|candidate| ring || candidate.zip() == property.zip())
            .collect();

        let candidates = gather_candidates(&transactions, &properties);
        Ok(select_comparables(&query, &candidates, as_of))
    }

    /// Runs the full pipeline and appends the estimate to the valuation history.
    pub fn get_fair_price(
        &self,
        property_id: &PropertyId,
        as_of: NaiveDate,
    ) -> Result<ValuationEstimate, ValuationError> {
        let set = self.get_comparables(property_id, as_of)?;
        if set.is_empty() {
            debug!(
                property_id = %property_id,
                window_months = set.window_months,
                "no comparables found"
            );
            return Err(ValuationError::NotAvailable {
                property_id: *property_id,
                reason: UnavailableReason::NoComparables {
                    window_months: set.window_months,
                },
            });
        }

        let fair_price =
            compute_fair_price(&set, &self.policy.aggregation).map_err(|err| match err {
                AggregationError::InsufficientData { found, required } => {
                    ValuationError::NotAvailable {
                        property_id: *property_id,
                        reason: UnavailableReason::InsufficientData { found, required },
                    }
                }
                other => ValuationError::Aggregation(other),
            })?;
        let confidence = score_confidence(&set, &fair_price, &self.policy.confidence);

        let estimate = ValuationEstimate {
            id: EstimateId::new(),
            property_id: *property_id,
            point_estimate: fair_price.point,
            low: fair_price.low,
            high: fair_price.high,
            confidence,
            comparables: set.references(),
            window_months: set.window_months,
            as_of,
            created_at: Utc::now(),
        };
        self.valuations.append(estimate.clone())?;

        info!(
            property_id = %property_id,
            point = estimate.point_estimate,
            low = estimate.low,
            high = estimate.high,
            confidence = estimate.confidence_value(),
            comparables = estimate.comparables.len(),
            window_months = estimate.window_months,
            "fair price estimated"
        );
        Ok(estimate)
    }

    /// Values the property, then labels `list_price` against the fresh estimate.
    ///
    /// Unavailability is propagated as-is; no label is guessed without an estimate.
    pub fn classify_listing(
        &self,
        property_id: &PropertyId,
        list_price: u64,
        as_of: NaiveDate,
    ) -> Result<ClassificationResult, ValuationError> {
        if list_price == 0 {
            return Err(ValuationError::InvalidListPrice);
        }
        let estimate = self.get_fair_price(property_id, as_of)?;
        let classification = match classify(list_price, &estimate, &self.policy.classification) {
            Ok(classification) => classification,
            Err(ClassificationError::LowConfidence { score, minimum }) => {
                return Err(ValuationError::LowConfidence {
                    property_id: *property_id,
                    score,
                    minimum,
                    estimate: Box::new(estimate),
                });
            }
            Err(ClassificationError::InvalidListPrice) => {
                return Err(ValuationError::InvalidListPrice)
            }
            Err(err @ ClassificationError::InvalidEstimate) => {
                return Err(ValuationError::Classification(err))
            }
        };

        metrics::counter!(
            "fair_price_classifications_total",
            "label" => classification.label.label()
        )
        .increment(1);
        info!(
            property_id = %property_id,
            list_price,
            label = %classification.label,
            deviation_percent = classification.deviation_percent,
            "listing classified"
        );

        Ok(ClassificationResult {
            property_id: *property_id,
            estimate,
            classification,
        })
    }

    /// Links a sale to its canonical property (best effort) and appends it to the log.
    pub fn record_sale(&self, sale: SaleRecord) -> Result<TransactionId, ValuationError> {
        if sale.sale_price == 0 {
            return Err(ValuationError::InvalidSale("sale price must be positive".to_string()));
        }
        if !sale.address.has_valid_zip() {
            return Err(ValuationError::InvalidSale(format!(
                "zip code {} must be five digits",
                sale.address.zip
            )));
        }

        let property_id = self.store.resolve_address(&sale.address, sale.location)?;
        let transaction = self.transactions.append(sale, property_id)?;
        debug!(
            transaction_id = %transaction.id,
            linked = property_id.is_some(),
            "sale recorded"
        );
        Ok(transaction.id)
    }

    pub fn estimate_history(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<ValuationEstimate>, ValuationError> {
        Ok(self.valuations.history(property_id)?)
    }

    pub fn latest_estimate(
        &self,
        property_id: &PropertyId,
    ) -> Result<Option<ValuationEstimate>, ValuationError> {
        Ok(self.valuations.latest(property_id)?)
    }
}
