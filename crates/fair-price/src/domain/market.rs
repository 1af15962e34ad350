use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    MedianPrice,
    AveragePrice,
    PricePerSqft,
    InventoryCount,
    SalesCount,
    DaysOnMarket,
}

impl MetricKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::MedianPrice => "median_price",
            Self::AveragePrice => "average_price",
            Self::PricePerSqft => "price_per_sqft",
            Self::InventoryCount => "inventory_count",
            Self::SalesCount => "sales_count",
            Self::DaysOnMarket => "days_on_market",
        }
    }
}

/// Uniqueness key: one value per geography, date, source and metric.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationKey {
    pub geography: String,
    pub date: NaiveDate,
    pub source: String,
    pub metric: MetricKind,
}

/// Point-in-time aggregate statistic for a zip or region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    pub geography: String,
    pub date: NaiveDate,
    pub source: String,
    pub metric: MetricKind,
    pub value: f64,
}

impl MarketObservation {
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            geography: self.geography.clone(),
            date: self.date,
            source: self.source.clone(),
            metric: self.metric,
        }
    }
}
