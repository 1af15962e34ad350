use super::query::SimilarityWeights;
use crate::domain::CoreStructure;

const BEDROOM_UNIT: f64 = 1.0;
const BATHROOM_UNIT: f64 = 0.5;
const AREA_UNIT: f64 = 0.2;

/// Weighted average of the normalized deviations between target and candidate.
pub(crate) fn similarity_distance(
    target: &CoreStructure,
    candidate: &CoreStructure,
    age_months: f64,
    window_months: u32,
    weights: &SimilarityWeights,
) -> f64 {
    let bedrooms = f64::from(target.bedrooms.abs_diff(candidate.bedrooms)) / BEDROOM_UNIT;
    let bathrooms = f64::from(
        target
            .bathrooms
            .halves()
            .abs_diff(candidate.bathrooms.halves()),
    ) / 2.0
        / BATHROOM_UNIT;
    let area = (f64::from(candidate.living_area_sqft) / f64::from(target.living_area_sqft) - 1.0)
        .abs()
        / AREA_UNIT;
    let recency = if window_months == 0 {
        0.0
    } else {
        age_months.max(0.0) / f64::from(window_months)
    };

    let terms = [
        (weights.bedrooms, bedrooms),
        (weights.bathrooms, bathrooms),
        (weights.living_area, area),
        (weights.recency, recency),
    ];
    let total_weight: f64 = terms.iter().map(|(weight, _)| weight.max(0.0)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    terms
        .iter()
        .map(|(weight, deviation)| weight.max(0.0) * deviation)
        .sum::<f64>()
        / total_weight
}

/// Similarity weight in (0, 1]; identical, same-day sales score 1.
pub(crate) fn similarity_weight(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bathrooms;

    fn core(bedrooms: u8, halves: u16, area: u32) -> CoreStructure {
        CoreStructure {
            bedrooms,
            bathrooms: Bathrooms::from_halves(halves),
            living_area_sqft: area,
        }
    }

    #[test]
    fn identical_fresh_sale_has_full_weight() {
        let target = core(3, 4, 1_800);
        let distance = similarity_distance(&target, &target, 0.0, 6, &SimilarityWeights::default());
        assert_eq!(similarity_weight(distance), 1.0);
    }

    #[test]
    fn larger_deviation_means_lower_weight() {
        let target = core(3, 4, 1_800);
        let weights = SimilarityWeights::default();
        let close = similarity_distance(&target, &core(3, 4, 1_750), 2.0, 6, &weights);
        let far = similarity_distance(&target, &core(4, 5, 2_100), 2.0, 6, &weights);
        assert!(similarity_weight(close) > similarity_weight(far));
    }

    #[test]
    fn zero_weights_ignore_that_dimension() {
        let target = core(3, 4, 1_800);
        let weights = SimilarityWeights {
            bedrooms: 0.0,
            bathrooms: 0.0,
            living_area: 1.0,
            recency: 0.0,
        };
        let distance = similarity_distance(&target, &core(4, 6, 1_800), 5.0, 6, &weights);
        assert_eq!(distance, 0.0);
    }
}
