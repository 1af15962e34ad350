//! Zip-level market statistics derived from the transaction log.

use crate::domain::{MarketObservation, MetricKind, Property, PropertyStatus, Transaction};
use crate::pricing::stats::linear_quantile;
use crate::repository::{MarketObservationRepository, RepositoryError, UpsertOutcome};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Zips with fewer sales than this produce no observations.
pub const MIN_SALES_FOR_TRENDS: usize = 5;

/// Average, median, price per square foot and count of sales per zip.
///
/// Observations come out ordered by zip, then metric.
pub fn derive_trends(
    transactions: &[Transaction],
    date: NaiveDate,
    source: &str,
) -> Vec<MarketObservation> {
    let mut by_zip: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for transaction in transactions.iter().filter(|t| t.sale_date <= date) {
        by_zip.entry(transaction.zip()).or_default().push(transaction);
    }

    let mut observations = Vec::new();
    for (zip, sales) in by_zip {
        if sales.len() < MIN_SALES_FOR_TRENDS {
            debug!(zip, sales = sales.len(), "too few sales for market trends");
            continue;
        }

        let mut prices: Vec<f64> = sales.iter().map(|t| t.sale_price as f64).collect();
        prices.sort_by(f64::total_cmp);
        let average = prices.iter().sum::<f64>() / prices.len() as f64;
        let median = linear_quantile(&prices, 0.5).unwrap_or(average);

        let observe = |metric: MetricKind, value: f64| MarketObservation {
            geography: zip.to_string(),
            date,
            source: source.to_string(),
            metric,
            value,
        };

        observations.push(observe(MetricKind::MedianPrice, median));
        observations.push(observe(MetricKind::AveragePrice, average));

        let (priced, area) = sales
            .iter()
            .filter_map(|t| {
                let area = t.structure.living_area_sqft.filter(|area| *area > 0)?;
                Some((t.sale_price as f64, f64::from(area)))
            })
            .fold((0.0, 0.0), |(price_sum, area_sum), (price, area)| {
                (price_sum + price, area_sum + area)
            });
        if area > 0.0 {
            observations.push(observe(MetricKind::PricePerSqft, priced / area));
        }
        observations.push(observe(MetricKind::SalesCount, sales.len() as f64));
    }
    observations
}

/// Market-wide headline figures: sale prices up to a date plus the current active inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub as_of: NaiveDate,
    /// `None` covers every zip.
    pub zip: Option<String>,
    pub total_sales: usize,
    pub average_price: Option<f64>,
    pub median_price: Option<f64>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub active_listings: usize,
}

/// Summarizes sales on or before `date`, optionally for one zip. Price figures stay
/// `None` when no sale qualifies.
pub fn summarize_market(
    transactions: &[Transaction],
    properties: &[Arc<Property>],
    date: NaiveDate,
    zip: Option<&str>,
) -> MarketSummary {
    let zip = zip.map(str::trim).filter(|zip| !zip.is_empty());
    let in_scope = |candidate: &str| zip.map_or(true, |zip| candidate == zip);

    let mut prices: Vec<u64> = transactions
        .iter()
        .filter(|t| t.sale_date <= date && in_scope(t.zip()))
        .map(|t| t.sale_price)
        .collect();
    prices.sort_unstable();

    let sorted: Vec<f64> = prices.iter().map(|price| *price as f64).collect();
    let average_price =
        (!sorted.is_empty()).then(|| sorted.iter().sum::<f64>() / sorted.len() as f64);
    let active_listings = properties
        .iter()
        .filter(|property| property.status == PropertyStatus::Active && in_scope(property.zip()))
        .count();

    MarketSummary {
        as_of: date,
        zip: zip.map(str::to_string),
        total_sales: prices.len(),
        average_price,
        median_price: linear_quantile(&sorted, 0.5),
        min_price: prices.first().copied(),
        max_price: prices.last().copied(),
        active_listings,
    }
}

/// Derives trends and writes them, replacing any observation with the same key.
pub fn record_trends<R: MarketObservationRepository + ?Sized>(
    repository: &R,
    transactions: &[Transaction],
    date: NaiveDate,
    source: &str,
) -> Result<Vec<MarketObservation>, RepositoryError> {
    let observations = derive_trends(transactions, date, source);
    let mut replaced = 0;
    for observation in &observations {
        if repository.upsert(observation.clone())? == UpsertOutcome::Replaced {
            replaced += 1;
        }
    }
    debug!(written = observations.len(), replaced, "market trends recorded");
    Ok(observations)
}
