use super::aggregate::FairPrice;
use super::stats::weighted_mean_and_cv;
use crate::comparables::ComparableSet;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubScoreKind {
    SampleSize,
    Dispersion,
    Recency,
}

impl SubScoreKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SampleSize => "sample_size",
            Self::Dispersion => "dispersion",
            Self::Recency => "recency",
        }
    }
}

impl fmt::Display for SubScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One named contribution to the composite confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub kind: SubScoreKind,
    pub value: f64,
    pub weight: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub value: f64,
    pub components: Vec<SubScore>,
}

impl ConfidenceScore {
    pub fn component(&self, kind: SubScoreKind) -> Option<&SubScore> {
        self.components.iter().find(|score| score.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidencePolicy {
    /// Comparable count at which the sample sub-score reaches 1 − 1/e.
    pub sample_scale: f64,
    pub dispersion_sensitivity: f64,
    pub recency_half_life_months: f64,
    pub sample_weight: f64,
    pub dispersion_weight: f64,
    pub recency_weight: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            sample_scale: 3.0,
            dispersion_sensitivity: 5.0,
            recency_half_life_months: 12.0,
            sample_weight: 1.0,
            dispersion_weight: 1.0,
            recency_weight: 1.0,
        }
    }
}

/// Scores how far the fair price can be trusted, in [0, 1].
pub fn score_confidence(
    set: &ComparableSet,
    fair_price: &FairPrice,
    policy: &ConfidencePolicy,
) -> ConfidenceScore {
    let n = set.len();
    let sample = if n == 0 || policy.sample_scale <= 0.0 {
        0.0
    } else {
        1.0 - (-(n as f64) / policy.sample_scale).exp()
    };

    let samples: Vec<(u64, f64)> = set.comparables.iter().map(|c| (c.price, c.weight)).collect();
    let (dispersion, dispersion_note) = match weighted_mean_and_cv(&samples) {
        Some((_, cv)) => (
            1.0 / (1.0 + cv * policy.dispersion_sensitivity.max(0.0)),
            format!(
                "coefficient of variation {:.3} around band {}..{}",
                cv, fair_price.low, fair_price.high
            ),
        ),
        None => (0.0, "no priced comparables".to_string()),
    };

    let (recency, recency_note) = match set.oldest_age_months() {
        Some(age) if policy.recency_half_life_months > 0.0 => (
            0.5_f64.powf(age / policy.recency_half_life_months),
            format!("oldest comparable sold {age:.1} months ago"),
        ),
        Some(age) => (1.0, format!("oldest comparable sold {age:.1} months ago")),
        None => (0.0, "no comparable sales".to_string()),
    };

    let components = vec![
        SubScore {
            kind: SubScoreKind::SampleSize,
            value: sample.clamp(0.0, 1.0),
            weight: policy.sample_weight,
            note: format!("{n} comparables"),
        },
        SubScore {
            kind: SubScoreKind::Dispersion,
            value: dispersion.clamp(0.0, 1.0),
            weight: policy.dispersion_weight,
            note: dispersion_note,
        },
        SubScore {
            kind: SubScoreKind::Recency,
            value: recency.clamp(0.0, 1.0),
            weight: policy.recency_weight,
            note: recency_note,
        },
    ];

    ConfidenceScore {
        value: weighted_geometric_mean(&components),
        components,
    }
}

fn weighted_geometric_mean(components: &[SubScore]) -> f64 {
    let weighted: Vec<_> = components.iter().filter(|c| c.weight > 0.0).collect();
    let total: f64 = weighted.iter().map(|c| c.weight).sum();
    if total <= 0.0 || weighted.iter().any(|c| c.value <= 0.0) {
        return 0.0;
    }
    let log_sum: f64 = weighted.iter().map(|c| c.weight * c.value.ln()).sum();
    (log_sum / total).exp().clamp(0.0, 1.0)
}
