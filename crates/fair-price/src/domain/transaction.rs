use super::address::{Address, GeoPoint};
use super::property::{PropertyId, Structure};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number assigned by the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{:08}", self.0)
    }
}

/// A sale as reported by a feed, before it is linked and logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub source: String,
    pub address: Address,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    pub sale_date: NaiveDate,
    pub sale_price: u64,
    /// Structure at the time of sale, which may differ from today's property.
    #[serde(default)]
    pub structure: Structure,
}

/// Immutable historical sale. The log never mutates one after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub property_id: Option<PropertyId>,
    pub source: String,
    pub address: Address,
    pub location: Option<GeoPoint>,
    pub sale_date: NaiveDate,
    pub sale_price: u64,
    pub structure: Structure,
    pub recorded_at: DateTime<Utc>,
}

impl Transaction {
    pub fn zip(&self) -> &str {
        self.address.zip5()
    }
}
