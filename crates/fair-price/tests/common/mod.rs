#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use fair_price::domain::{
    Address, Bathrooms, GeoPoint, PropertyStatus, SaleRecord, SourceRecord, Structure,
};
use fair_price::policy::ValuationPolicy;
use fair_price::repository::{InMemoryTransactionLog, InMemoryValuationRepository};
use fair_price::service::ValuationService;
use fair_price::store::PropertyStore;
use std::sync::Arc;

pub type Service = ValuationService<InMemoryTransactionLog, InMemoryValuationRepository>;

pub fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid as-of date")
}

pub fn observed(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, 9, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> NaiveDate {
    as_of() - Duration::days(days)
}

pub fn boulder(line: &str, zip: &str) -> Address {
    Address::new(line, "Boulder", "CO", zip)
}

pub fn structure(bedrooms: u8, bathrooms: f32, area: u32) -> Structure {
    Structure {
        bedrooms: Some(bedrooms),
        bathrooms: Some(Bathrooms::new(bathrooms).expect("half-step bathrooms")),
        living_area_sqft: Some(area),
        lot_size_sqft: None,
        year_built: None,
    }
}

pub fn listing(
    id: &str,
    address: Address,
    structure: Structure,
    list_price: Option<u64>,
) -> SourceRecord {
    SourceRecord {
        source: "listing_api".to_string(),
        source_record_id: id.to_string(),
        address,
        location: None,
        structure,
        list_price,
        last_sale_price: None,
        last_sale_date: None,
        estimate: None,
        status: Some(PropertyStatus::Active),
        observed_at: observed(1),
    }
}

pub fn sale(
    address: Address,
    structure: Structure,
    price: u64,
    sale_date: NaiveDate,
) -> SaleRecord {
    SaleRecord {
        source: "county".to_string(),
        address,
        location: None,
        sale_date,
        sale_price: price,
        structure,
    }
}

pub fn point(latitude: f64, longitude: f64) -> Option<GeoPoint> {
    GeoPoint::new(latitude, longitude)
}

pub fn service(policy: ValuationPolicy) -> Service {
    ValuationService::new(
        Arc::new(PropertyStore::new(policy.store.clone())),
        Arc::new(InMemoryTransactionLog::new()),
        Arc::new(InMemoryValuationRepository::new()),
        policy,
    )
}

/// The 80301 neighborhood: three recent sales of similar homes.
pub fn seed_pearl_street_sales(service: &Service) {
    for (line, area, price, days) in [
        ("101 Spruce St", 1_750, 550_000, 91),
        ("203 Pine St", 1_800, 560_000, 61),
        ("305 Walnut St", 1_900, 575_000, 122),
    ] {
        service
            .record_sale(sale(
                boulder(line, "80301"),
                structure(3, 2.0, area),
                price,
                days_ago(days),
            ))
            .expect("sale recorded");
    }
}
