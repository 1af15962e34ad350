use super::candidates::Candidate;
use super::query::{ComparableQuery, TargetProfile};
use super::similarity::{similarity_distance, similarity_weight};
use super::{Comparable, ComparableSet};
use crate::domain::CoreStructure;
use crate::pricing::stats::linear_quantile;
use chrono::{Months, NaiveDate};
use tracing::debug;

const DAYS_PER_MONTH: f64 = 30.4375;

/// Pure comparable selection over an already gathered candidate pool.
///
/// Windows are tried narrowest first and the first one still holding `min_sample`
/// comparables after the price fence wins. Whether the fallback ring joins the pool
/// is decided once, at the narrowest window, so a wider window always sees a superset.
pub fn select_comparables(
    query: &ComparableQuery,
    candidates: &[Candidate],
    as_of: NaiveDate,
) -> ComparableSet {
    let target = &query.target;
    let steps = query.windows.steps();
    let narrowest = steps.first().copied().unwrap_or_default();

    let eligible: Vec<(&Candidate, CoreStructure, Option<f64>)> = candidates
        .iter()
        .filter(|candidate| !is_target(target, candidate))
        .filter(|candidate| candidate.sale_date <= as_of && candidate.price > 0)
        .filter_map(|candidate| {
            let core = candidate.structure.core()?;
            query
                .tolerance
                .accepts(&target.structure, &core)
                .then(|| (candidate, core, distance_km(target, candidate)))
        })
        .collect();

    let in_zip = |candidate: &Candidate| candidate.zip() == query.geography.zip;
    let in_ring = |distance: Option<f64>| match (query.geography.fallback_radius_km, distance) {
        (Some(radius), Some(distance)) => distance <= radius,
        _ => false,
    };

    let narrow_cutoff = window_start(as_of, narrowest);
    let in_zip_narrow = eligible
        .iter()
        .filter(|(candidate, _, _)| in_zip(candidate) && candidate.sale_date >= narrow_cutoff)
        .count();
    let ring_used = query.geography.fallback_radius_km.is_some()
        && target.location.is_some()
        && in_zip_narrow < query.min_sample;

    let pool: Vec<_> = eligible
        .into_iter()
        .filter(|(candidate, _, distance)| {
            in_zip(candidate) || (ring_used && in_ring(*distance))
        })
        .collect();

    // A window counts as sufficient only once its fenced set holds `min_sample`.
    let mut window_months = query.windows.widest();
    let mut candidates_found = 0;
    let mut outliers_removed = 0;
    let mut comparables = Vec::new();
    for window in steps {
        let cutoff = window_start(as_of, *window);
        let chosen: Vec<_> = pool
            .iter()
            .filter(|(candidate, _, _)| candidate.sale_date >= cutoff)
            .collect();
        window_months = *window;
        candidates_found = chosen.len();
        comparables = chosen
            .into_iter()
            .map(|(candidate, core, distance)| {
                to_comparable(query, candidate, core, *distance, window_months, as_of)
            })
            .collect();
        outliers_removed = match query.outlier_fence {
            Some(multiplier) => apply_price_fence(&mut comparables, multiplier),
            None => 0,
        };
        if comparables.len() >= query.min_sample {
            break;
        }
    }

    comparables.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| b.sale_date.cmp(&a.sale_date))
            .then_with(|| a.reference.cmp(&b.reference))
    });
    comparables.truncate(query.max_results);

    debug!(
        property_id = %target.property_id,
        window_months,
        ring_used,
        candidates_found,
        outliers_removed,
        selected = comparables.len(),
        "selected comparables"
    );

    ComparableSet {
        target: target.property_id,
        query: query.clone(),
        window_months,
        ring_used,
        candidates_found,
        outliers_removed,
        comparables,
    }
}

fn to_comparable(
    query: &ComparableQuery,
    candidate: &Candidate,
    core: &CoreStructure,
    distance: Option<f64>,
    window_months: u32,
    as_of: NaiveDate,
) -> Comparable {
    let age_months = (as_of - candidate.sale_date).num_days().max(0) as f64 / DAYS_PER_MONTH;
    let distance_score = similarity_distance(
        &query.target.structure,
        core,
        age_months,
        window_months,
        &query.weights,
    );
    Comparable {
        reference: candidate.reference,
        property_id: candidate.property_id,
        address: candidate.address.clone(),
        price: candidate.price,
        sale_date: candidate.sale_date,
        structure: *core,
        age_months,
        distance_km: distance,
        weight: similarity_weight(distance_score),
    }
}

fn is_target(target: &TargetProfile, candidate: &Candidate) -> bool {
    match candidate.property_id {
        Some(id) => id == target.property_id,
        None => candidate.address.reconciliation_key() == target.reconciliation_key,
    }
}

fn distance_km(target: &TargetProfile, candidate: &Candidate) -> Option<f64> {
    Some(target.location?.distance_km(&candidate.location?))
}

fn window_start(as_of: NaiveDate, months: u32) -> NaiveDate {
    as_of
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// Drops comparables priced outside the Tukey fence. Needs at least four prices.
fn apply_price_fence(comparables: &mut Vec<Comparable>, multiplier: f64) -> usize {
    if comparables.len() < 4 {
        return 0;
    }
    let mut prices: Vec<f64> = comparables.iter().map(|c| c.price as f64).collect();
    prices.sort_by(f64::total_cmp);
    let (Some(q1), Some(q3)) = (linear_quantile(&prices, 0.25), linear_quantile(&prices, 0.75))
    else {
        return 0;
    };
    let spread = q3 - q1;
    let (lower, upper) = (q1 - multiplier * spread, q3 + multiplier * spread);

    let before = comparables.len();
    comparables.retain(|c| {
        let price = c.price as f64;
        price >= lower && price <= upper
    });
    before - comparables.len()
}
