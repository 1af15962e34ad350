use crate::comparables::SelectionPolicy;
use crate::pricing::{AggregationPolicy, ClassificationPolicy, ConfidencePolicy};
use crate::store::StorePolicy;
use serde::{Deserialize, Serialize};

/// Every tunable of the engine in one serde-friendly bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationPolicy {
    pub store: StorePolicy,
    pub selection: SelectionPolicy,
    pub aggregation: AggregationPolicy,
    pub confidence: ConfidencePolicy,
    pub classification: ClassificationPolicy,
}
