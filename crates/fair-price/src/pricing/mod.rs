//! Fair-price arithmetic: aggregation, confidence and classification.

mod aggregate;
mod classify;
mod confidence;
pub(crate) mod stats;

pub use aggregate::{compute_fair_price, AggregationError, AggregationPolicy, FairPrice};
pub use classify::{
    classify, Classification, ClassificationError, ClassificationPolicy, PriceLabel,
};
pub use confidence::{
    score_confidence, ConfidencePolicy, ConfidenceScore, SubScore, SubScoreKind,
};
