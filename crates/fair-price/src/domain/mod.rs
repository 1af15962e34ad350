mod address;
mod market;
mod property;
mod transaction;
mod valuation;

pub use address::{Address, GeoPoint};
pub(crate) use address::{address_tokens, normalize_street_line};
pub use market::{MarketObservation, MetricKind, ObservationKey};
pub use property::{
    Bathrooms, CoreStructure, FieldProvenance, InvalidBathrooms, Property, PropertyField,
    PropertyId, PropertyStatus, SourceKey, SourceRecord, Structure,
};
pub use transaction::{SaleRecord, Transaction, TransactionId};
pub use valuation::{ComparableRef, EstimateId, ValuationEstimate};
