use crate::domain::ValuationEstimate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLabel {
    Underpriced,
    Fair,
    Overpriced,
}

impl PriceLabel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Underpriced => "underpriced",
            Self::Fair => "fair",
            Self::Overpriced => "overpriced",
        }
    }
}

impl fmt::Display for PriceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: PriceLabel,
    pub list_price: u64,
    pub fair_price: u64,
    /// Signed dollars above (positive) or below the fair price.
    pub price_difference: i64,
    pub deviation_percent: f64,
    pub threshold_percent: f64,
    pub confidence: f64,
}

fn default_threshold_percent() -> f64 {
    8.0
}

fn default_min_confidence() -> f64 {
    0.4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            threshold_percent: default_threshold_percent(),
            min_confidence: default_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error("valuation confidence {score:.2} is below the required {minimum:.2}")]
    LowConfidence { score: f64, minimum: f64 },
    #[error("list price must be positive")]
    InvalidListPrice,
    #[error("estimate has no positive point value to compare against")]
    InvalidEstimate,
}

/// Labels a list price against a fair-price estimate. Boundaries are inclusive of `Fair`.
pub fn classify(
    list_price: u64,
    estimate: &ValuationEstimate,
    policy: &ClassificationPolicy,
) -> Result<Classification, ClassificationError> {
    if list_price == 0 {
        return Err(ClassificationError::InvalidListPrice);
    }
    if estimate.point_estimate == 0 {
        return Err(ClassificationError::InvalidEstimate);
    }
    let confidence = estimate.confidence_value();
    if confidence < policy.min_confidence {
        return Err(ClassificationError::LowConfidence {
            score: confidence,
            minimum: policy.min_confidence,
        });
    }

    let point = estimate.point_estimate as f64;
    let deviation_percent = (list_price as f64 - point) * 100.0 / point;
    let threshold = policy.threshold_percent.abs();
    let label = if deviation_percent < -threshold {
        PriceLabel::Underpriced
    } else if deviation_percent > threshold {
        PriceLabel::Overpriced
    } else {
        PriceLabel::Fair
    };

    Ok(Classification {
        label,
        list_price,
        fair_price: estimate.point_estimate,
        price_difference: list_price as i64 - estimate.point_estimate as i64,
        deviation_percent,
        threshold_percent: threshold,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EstimateId, PropertyId};
    use crate::pricing::ConfidenceScore;
    use chrono::{NaiveDate, Utc};

    fn estimate(point: u64, confidence: f64) -> ValuationEstimate {
        ValuationEstimate {
            id: EstimateId::new(),
            property_id: PropertyId::derive("55 pearl st|80301", 0),
            point_estimate: point,
            low: point,
            high: point,
            confidence: ConfidenceScore {
                value: confidence,
                components: Vec::new(),
            },
            comparables: Vec::new(),
            window_months: 6,
            as_of: NaiveDate::from_ymd_opt(2025, 6, 30).expect("date"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn labels_follow_the_threshold() {
        let policy = ClassificationPolicy::default();
        let estimate = estimate(560_000, 0.8);

        let over = classify(620_000, &estimate, &policy).expect("classified");
        assert_eq!(over.label, PriceLabel::Overpriced);
        assert!((over.deviation_percent - 10.714).abs() < 0.01);
        assert_eq!(over.price_difference, 60_000);

        let label = |price| classify(price, &estimate, &policy).expect("classified").label;
        assert_eq!(label(500_000), PriceLabel::Underpriced);
        assert_eq!(label(580_000), PriceLabel::Fair);
    }

    #[test]
    fn threshold_boundary_is_fair() {
        let policy = ClassificationPolicy::default();
        let estimate = estimate(500_000, 0.8);
        let label = |price| classify(price, &estimate, &policy).expect("classified").label;
        assert_eq!(label(540_000), PriceLabel::Fair);
        assert_eq!(label(460_000), PriceLabel::Fair);
    }

    #[test]
    fn classification_is_deterministic() {
        let policy = ClassificationPolicy::default();
        let estimate = estimate(560_000, 0.8);
        let first = classify(605_000, &estimate, &policy).expect("classified");
        for _ in 0..10 {
            assert_eq!(classify(605_000, &estimate, &policy).expect("classified"), first);
        }
    }

    #[test]
    fn low_confidence_refuses_to_label() {
        let result = classify(620_000, &estimate(560_000, 0.2), &ClassificationPolicy::default());
        assert_eq!(
            result,
            Err(ClassificationError::LowConfidence {
                score: 0.2,
                minimum: 0.4
            })
        );
        assert_eq!(
            classify(0, &estimate(560_000, 0.9), &ClassificationPolicy::default()),
            Err(ClassificationError::InvalidListPrice)
        );
    }

    #[test]
    fn zero_point_estimate_is_not_a_list_price_error() {
        let result = classify(620_000, &estimate(0, 0.9), &ClassificationPolicy::default());
        assert_eq!(result, Err(ClassificationError::InvalidEstimate));
    }
}
