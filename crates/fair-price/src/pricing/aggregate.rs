use super::stats::weighted_quantile;
use crate::comparables::ComparableSet;
use serde::{Deserialize, Serialize};

/// Point estimate and interquartile band, in whole dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairPrice {
    pub point: u64,
    pub low: u64,
    pub high: u64,
    pub sample_size: usize,
}

fn default_min_comparables() -> usize {
    3
}

fn default_low_quantile() -> f64 {
    0.25
}

fn default_high_quantile() -> f64 {
    0.75
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationPolicy {
    #[serde(default = "default_min_comparables")]
    pub min_comparables: usize,
    #[serde(default = "default_low_quantile")]
    pub low_quantile: f64,
    #[serde(default = "default_high_quantile")]
    pub high_quantile: f64,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            min_comparables: default_min_comparables(),
            low_quantile: default_low_quantile(),
            high_quantile: default_high_quantile(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("insufficient comparables: found {found}, need {required}")]
    InsufficientData { found: usize, required: usize },
    #[error("invalid comparable input: {0}")]
    InvalidInput(String),
}

/// Weighted median over comparable prices with a weighted quartile band.
///
/// Never produces a number from fewer than `min_comparables` comparables.
pub fn compute_fair_price(
    set: &ComparableSet,
    policy: &AggregationPolicy,
) -> Result<FairPrice, AggregationError> {
    let required = policy.min_comparables.max(1);
    if set.len() < required {
        return Err(AggregationError::InsufficientData {
            found: set.len(),
            required,
        });
    }

    let mut samples = Vec::with_capacity(set.len());
    for comparable in &set.comparables {
        if comparable.price == 0 {
            return Err(AggregationError::InvalidInput(format!(
                "comparable {} has a zero price",
                comparable.reference
            )));
        }
        if !comparable.weight.is_finite() || comparable.weight <= 0.0 {
            return Err(AggregationError::InvalidInput(format!(
                "comparable {} has weight {}",
                comparable.reference, comparable.weight
            )));
        }
        samples.push((comparable.price, comparable.weight));
    }

    let quantile = |q: f64| {
        weighted_quantile(&samples, q)
            .ok_or_else(|| AggregationError::InvalidInput("total weight is zero".to_string()))
    };

    Ok(FairPrice {
        point: quantile(0.5)?,
        low: quantile(policy.low_quantile)?,
        high: quantile(policy.high_quantile)?,
        sample_size: samples.len(),
    })
}
