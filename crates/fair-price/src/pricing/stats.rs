//! Small order statistics shared by aggregation, confidence and outlier fencing.

/// Lower weighted quantile: the smallest value whose cumulative weight reaches `q` of the total.
///
/// Returns `None` for an empty sample or a non-positive total weight.
pub(crate) fn weighted_quantile(samples: &[(u64, f64)], q: f64) -> Option<u64> {
    let total: f64 = samples.iter().map(|(_, weight)| *weight).sum();
    if samples.is_empty() || total <= 0.0 || !total.is_finite() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let target = q.clamp(0.0, 1.0) * total;
    let tolerance = total * 1e-12;
    let mut cumulative = 0.0;
    for (value, weight) in &sorted {
        cumulative += weight;
        if cumulative + tolerance >= target {
            return Some(*value);
        }
    }
    sorted.last().map(|(value, _)| *value)
}

/// Linear-interpolation quantile over an ascending slice.
pub(crate) fn linear_quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let position = q.clamp(0.0, 1.0) * last as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Weighted mean and coefficient of variation (weighted std / mean).
pub(crate) fn weighted_mean_and_cv(samples: &[(u64, f64)]) -> Option<(f64, f64)> {
    let total: f64 = samples.iter().map(|(_, weight)| *weight).sum();
    if samples.is_empty() || total <= 0.0 {
        return None;
    }
    let mean = samples
        .iter()
        .map(|(value, weight)| *value as f64 * weight)
        .sum::<f64>()
        / total;
    if mean <= 0.0 {
        return None;
    }
    let variance = samples
        .iter()
        .map(|(value, weight)| weight * (*value as f64 - mean).powi(2))
        .sum::<f64>()
        / total;
    Some((mean, variance.sqrt() / mean))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_median_is_the_lower_median() {
        let samples = [(100, 1.0), (200, 1.0), (300, 1.0), (400, 1.0)];
        assert_eq!(weighted_quantile(&samples, 0.5), Some(200));
        assert_eq!(weighted_quantile(&samples, 0.25), Some(100));
        assert_eq!(weighted_quantile(&samples, 0.75), Some(300));
    }

    #[test]
    fn heavy_weight_pulls_the_median() {
        let samples = [(300, 1.0), (100, 1.0), (200, 5.0)];
        assert_eq!(weighted_quantile(&samples, 0.5), Some(200));
        assert_eq!(weighted_quantile(&[], 0.5), None);
        assert_eq!(weighted_quantile(&[(100, 0.0)], 0.5), None);
    }

    #[test]
    fn linear_quantile_interpolates() {
        let sorted = [550.0, 560.0, 565.0, 575.0, 2400.0];
        assert_eq!(linear_quantile(&sorted, 0.25), Some(560.0));
        assert_eq!(linear_quantile(&[1.0, 2.0], 0.5), Some(1.5));
        assert_eq!(linear_quantile(&[], 0.5), None);
    }

    #[test]
    fn cv_is_zero_for_identical_prices() {
        let (mean, cv) = weighted_mean_and_cv(&[(500, 1.0), (500, 2.0)]).expect("stats");
        assert_eq!(mean, 500.0);
        assert_eq!(cv, 0.0);
    }
}
