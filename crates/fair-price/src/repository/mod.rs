//! Persisted state behind storage traits so the service can be exercised in isolation.

mod memory;

pub use memory::{
    InMemoryObservationRepository, InMemoryTransactionLog, InMemoryValuationRepository,
};

use crate::domain::{
    MarketObservation, MetricKind, ObservationKey, PropertyId, SaleRecord, Transaction,
    ValuationEstimate,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Append-only log of historical sales.
pub trait TransactionLog: Send + Sync {
    /// Appends a sale; re-appending the same sale (source, address, date, price) is a conflict.
    fn append(
        &self,
        sale: SaleRecord,
        property_id: Option<PropertyId>,
    ) -> Result<Transaction, RepositoryError>;
    fn all(&self) -> Result<Vec<Transaction>, RepositoryError>;
    fn for_zip(&self, zip: &str) -> Result<Vec<Transaction>, RepositoryError>;
    fn for_property(&self, id: &PropertyId) -> Result<Vec<Transaction>, RepositoryError>;
}

/// Keyed market statistics; writing an existing key replaces its value.
pub trait MarketObservationRepository: Send + Sync {
    fn upsert(&self, observation: MarketObservation) -> Result<UpsertOutcome, RepositoryError>;
    fn get(&self, key: &ObservationKey) -> Result<Option<MarketObservation>, RepositoryError>;
    fn series(
        &self,
        geography: &str,
        metric: MetricKind,
        since: Option<NaiveDate>,
    ) -> Result<Vec<MarketObservation>, RepositoryError>;
}

/// Append-only valuation history, queryable per property in creation order.
pub trait ValuationRepository: Send + Sync {
    fn append(&self, estimate: ValuationEstimate) -> Result<(), RepositoryError>;
    fn latest(&self, id: &PropertyId) -> Result<Option<ValuationEstimate>, RepositoryError>;
    fn history(&self, id: &PropertyId) -> Result<Vec<ValuationEstimate>, RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
