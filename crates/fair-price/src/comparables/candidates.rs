use crate::domain::{
    Address, ComparableRef, GeoPoint, Property, PropertyId, Structure, Transaction,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// A past sale that may serve as a comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub reference: ComparableRef,
    pub property_id: Option<PropertyId>,
    pub address: Address,
    pub location: Option<GeoPoint>,
    pub price: u64,
    pub sale_date: NaiveDate,
    pub structure: Structure,
}

impl Candidate {
    pub fn from_transaction(transaction: &Transaction) -> Self {
        Self {
            reference: ComparableRef::Transaction(transaction.id),
            property_id: transaction.property_id,
            address: transaction.address.clone(),
            location: transaction.location,
            price: transaction.sale_price,
            sale_date: transaction.sale_date,
            structure: transaction.structure.clone(),
        }
    }

    /// Uses the property's last sale; `None` when it has never sold.
    pub fn from_property(property: &Property) -> Option<Self> {
        Some(Self {
            reference: ComparableRef::Property(property.id),
            property_id: Some(property.id),
            address: property.address.clone(),
            location: property.location,
            price: property.last_sale_price?,
            sale_date: property.last_sale_date?,
            structure: property.structure.clone(),
        })
    }

    pub fn zip(&self) -> &str {
        self.address.zip5()
    }
}

/// Builds the candidate pool from the transaction log and the store.
///
/// A property's last sale is only added when no logged transaction already
/// records that sale for the same parcel.
pub fn gather_candidates(
    transactions: &[Transaction],
    properties: &[Arc<Property>],
) -> Vec<Candidate> {
    let mut logged_by_id: HashSet<(PropertyId, NaiveDate)> = HashSet::new();
    let mut logged_by_key: HashSet<(String, NaiveDate)> = HashSet::new();
    for transaction in transactions {
        if let Some(id) = transaction.property_id {
            logged_by_id.insert((id, transaction.sale_date));
        }
        logged_by_key.insert((transaction.address.reconciliation_key(), transaction.sale_date));
    }

    let mut candidates: Vec<Candidate> =
        transactions.iter().map(Candidate::from_transaction).collect();
    candidates.extend(properties.iter().filter_map(|property| {
        let candidate = Candidate::from_property(property)?;
        let logged = logged_by_id.contains(&(property.id, candidate.sale_date))
            || logged_by_key.contains(&(property.reconciliation_key(), candidate.sale_date));
        (!logged).then_some(candidate)
    }));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionId;
    use chrono::{TimeZone, Utc};

    #[test]
    fn property_sales_already_logged_are_not_duplicated() {
        let address = Address::new("55 Pearl St", "Boulder", "CO", "80301");
        let sold = NaiveDate::from_ymd_opt(2024, 11, 2).expect("date");
        let seen = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let mut logged = Property::new(
            PropertyId::derive(&address.reconciliation_key(), 0),
            address.clone(),
            seen,
        );
        logged.last_sale_price = Some(540_000);
        logged.last_sale_date = Some(sold);

        let other_address = Address::new("9 Spruce St", "Boulder", "CO", "80301");
        let mut unlogged = Property::new(
            PropertyId::derive(&other_address.reconciliation_key(), 0),
            other_address,
            seen,
        );
        unlogged.last_sale_price = Some(610_000);
        unlogged.last_sale_date = Some(sold);

        let transaction = Transaction {
            id: TransactionId(1),
            property_id: None,
            source: "county".to_string(),
            address: Address::new("55 pearl street", "", "", "80301"),
            location: None,
            sale_date: sold,
            sale_price: 540_000,
            structure: Structure::default(),
            recorded_at: seen,
        };

        let properties = [Arc::new(logged), Arc::new(unlogged.clone())];
        let candidates = gather_candidates(&[transaction], &properties);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].reference, ComparableRef::Property(unlogged.id));
    }
}
