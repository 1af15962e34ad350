use super::SelectionError;
use crate::domain::{CoreStructure, GeoPoint, Property, PropertyId};
use serde::{Deserialize, Serialize};

/// The subject of a valuation, reduced to what comparable selection needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetProfile {
    pub property_id: PropertyId,
    pub reconciliation_key: String,
    pub zip: String,
    pub location: Option<GeoPoint>,
    pub structure: CoreStructure,
}

impl TargetProfile {
    pub fn from_property(property: &Property) -> Result<Self, SelectionError> {
        let structure = property
            .structure
            .core()
            .ok_or_else(|| SelectionError::IncompleteTarget {
                property_id: property.id,
                missing: property.structure.missing_core(),
            })?;

        Ok(Self {
            property_id: property.id,
            reconciliation_key: property.reconciliation_key(),
            zip: property.zip().to_string(),
            location: property.location,
            structure,
        })
    }
}

/// Where candidates may come from: the target's zip, plus an optional ring around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographyScope {
    pub zip: String,
    pub fallback_radius_km: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralTolerance {
    pub bedrooms: u8,
    /// Bathroom tolerance in half steps (1 = ±0.5).
    pub bathroom_halves: u16,
    pub min_area_ratio: f64,
    pub max_area_ratio: f64,
}

impl Default for StructuralTolerance {
    fn default() -> Self {
        Self {
            bedrooms: 1,
            bathroom_halves: 1,
            min_area_ratio: 0.8,
            max_area_ratio: 1.2,
        }
    }
}

impl StructuralTolerance {
    pub fn accepts(&self, target: &CoreStructure, candidate: &CoreStructure) -> bool {
        let ratio = f64::from(candidate.living_area_sqft) / f64::from(target.living_area_sqft);
        target.bedrooms.abs_diff(candidate.bedrooms) <= self.bedrooms
            && target
                .bathrooms
                .halves()
                .abs_diff(candidate.bathrooms.halves())
                <= self.bathroom_halves
            && ratio >= self.min_area_ratio
            && ratio <= self.max_area_ratio
    }
}

/// Sale-recency windows in months, tried narrowest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct WindowSchedule(Vec<u32>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("window schedule must be non-empty, positive and strictly increasing: {0:?}")]
pub struct InvalidWindowSchedule(pub Vec<u32>);

impl WindowSchedule {
    pub fn new(steps: Vec<u32>) -> Result<Self, InvalidWindowSchedule> {
        let increasing = steps.windows(2).all(|pair| pair[0] < pair[1]);
        if steps.is_empty() || steps[0] == 0 || !increasing {
            return Err(InvalidWindowSchedule(steps));
        }
        Ok(Self(steps))
    }

    pub fn steps(&self) -> &[u32] {
        &self.0
    }

    pub fn widest(&self) -> u32 {
        self.0.last().copied().unwrap_or_default()
    }

    /// Schedule that starts at `months`, keeping the wider configured steps.
    pub fn starting_at(&self, months: u32) -> Self {
        if months == 0 {
            return self.clone();
        }
        let mut steps = vec![months];
        steps.extend(self.0.iter().copied().filter(|step| *step > months));
        Self(steps)
    }
}

impl Default for WindowSchedule {
    fn default() -> Self {
        Self(vec![6, 12, 24])
    }
}

impl TryFrom<Vec<u32>> for WindowSchedule {
    type Error = InvalidWindowSchedule;

    fn try_from(value: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WindowSchedule> for Vec<u32> {
    fn from(value: WindowSchedule) -> Self {
        value.0
    }
}

/// Relative importance of each normalized deviation in the similarity distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub bedrooms: f64,
    pub bathrooms: f64,
    pub living_area: f64,
    pub recency: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            bedrooms: 1.0,
            bathrooms: 1.0,
            living_area: 1.0,
            recency: 1.0,
        }
    }
}

fn default_min_sample() -> usize {
    3
}

fn default_max_results() -> usize {
    10
}

fn default_outlier_fence() -> Option<f64> {
    Some(1.5)
}

/// Configured defaults from which a [`ComparableQuery`] is built per target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    #[serde(default)]
    pub tolerance: StructuralTolerance,
    #[serde(default)]
    pub windows: WindowSchedule,
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub weights: SimilarityWeights,
    #[serde(default)]
    pub fallback_radius_km: Option<f64>,
    /// Tukey fence multiplier applied to comparable prices; `None` disables it.
    #[serde(default = "default_outlier_fence")]
    pub outlier_fence: Option<f64>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            tolerance: StructuralTolerance::default(),
            windows: WindowSchedule::default(),
            min_sample: default_min_sample(),
            max_results: default_max_results(),
            weights: SimilarityWeights::default(),
            fallback_radius_km: None,
            outlier_fence: default_outlier_fence(),
        }
    }
}

/// Typed description of one comparable search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparableQuery {
    pub target: TargetProfile,
    pub geography: GeographyScope,
    pub tolerance: StructuralTolerance,
    pub windows: WindowSchedule,
    pub min_sample: usize,
    pub max_results: usize,
    pub weights: SimilarityWeights,
    pub outlier_fence: Option<f64>,
}

impl ComparableQuery {
    pub fn for_target(target: TargetProfile, policy: &SelectionPolicy) -> Self {
        let geography = GeographyScope {
            zip: target.zip.clone(),
            fallback_radius_km: policy.fallback_radius_km,
        };
        Self {
            target,
            geography,
            tolerance: policy.tolerance,
            windows: policy.windows.clone(),
            min_sample: policy.min_sample,
            max_results: policy.max_results,
            weights: policy.weights,
            outlier_fence: policy.outlier_fence,
        }
    }

    pub fn with_initial_window(mut self, months: u32) -> Self {
        self.windows = self.windows.starting_at(months);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
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
    fn tolerance_bounds_are_inclusive() {
        let tolerance = StructuralTolerance::default();
        let target = core(3, 4, 1_800);
        assert!(tolerance.accepts(&target, &core(4, 5, 2_160)));
        assert!(tolerance.accepts(&target, &core(2, 3, 1_440)));
        assert!(!tolerance.accepts(&target, &core(5, 4, 1_800)));
        assert!(!tolerance.accepts(&target, &core(3, 6, 1_800)));
        assert!(!tolerance.accepts(&target, &core(3, 4, 2_200)));
    }

    #[test]
    fn window_schedule_rejects_unordered_steps() {
        assert!(WindowSchedule::new(vec![12, 6]).is_err());
        assert!(WindowSchedule::new(vec![]).is_err());
        assert!(WindowSchedule::new(vec![0, 6]).is_err());
        assert!(serde_json::from_str::<WindowSchedule>("[6, 6]").is_err());

        let schedule = WindowSchedule::default().starting_at(9);
        assert_eq!(schedule.steps(), &[9, 12, 24]);
        assert_eq!(WindowSchedule::default().starting_at(36).steps(), &[36]);
    }
}
