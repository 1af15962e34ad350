use super::conflict::ReconciliationConflict;
use crate::domain::{Bathrooms, FieldProvenance, Property, PropertyField, SourceRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declarative per-field source priority table.
///
/// Priority lookup order: the field-specific entry for the source, then the
/// source-wide entry, then `default_priority`. A higher number wins; equal
/// priorities fall back to the most recently observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePolicy {
    #[serde(default)]
    pub default_priority: u8,
    #[serde(default)]
    pub sources: BTreeMap<String, u8>,
    #[serde(default)]
    pub fields: BTreeMap<PropertyField, BTreeMap<String, u8>>,
    /// Fields that describe immutable facts, with the tolerated absolute difference.
    #[serde(default)]
    pub immutable: BTreeMap<PropertyField, u32>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        let sources = BTreeMap::from([
            ("county".to_string(), 30),
            ("listing_api".to_string(), 20),
            ("market_index".to_string(), 10),
        ]);

        let listing_first = BTreeMap::from([("listing_api".to_string(), 40)]);
        let fields = BTreeMap::from([
            (PropertyField::ListPrice, listing_first.clone()),
            (PropertyField::Status, listing_first.clone()),
            (PropertyField::CurrentEstimate, listing_first),
        ]);

        Self {
            default_priority: 0,
            sources,
            fields,
            immutable: BTreeMap::from([(PropertyField::YearBuilt, 0)]),
        }
    }
}

impl MergePolicy {
    pub fn priority(&self, field: PropertyField, source: &str) -> u8 {
        self.fields
            .get(&field)
            .and_then(|table| table.get(source))
            .or_else(|| self.sources.get(source))
            .copied()
            .unwrap_or(self.default_priority)
    }

    pub fn tolerance(&self, field: PropertyField) -> Option<u32> {
        self.immutable.get(&field).copied()
    }
}

/// How a source record was matched onto its canonical property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrength {
    /// First sighting; nothing to disagree with.
    New,
    /// Same source and source record id as an earlier sighting.
    SourceRecord,
    /// Same reconciliation key, coordinates consistent.
    Address,
    /// Nearby coordinates, same zip and house number, different address text.
    Proximity,
}

impl MatchStrength {
    pub const fn is_confident(self) -> bool {
        matches!(self, Self::SourceRecord | Self::Address)
    }
}

pub(crate) struct MergeOutcome {
    pub(crate) property: Property,
    pub(crate) changed: Vec<PropertyField>,
    pub(crate) conflicts: Vec<ReconciliationConflict>,
}

trait FieldValue: Clone + PartialEq + fmt::Display {
    fn difference(&self, other: &Self) -> u64;
}

impl FieldValue for u8 {
    fn difference(&self, other: &Self) -> u64 {
        u64::from(self.abs_diff(*other))
    }
}

impl FieldValue for u16 {
    fn difference(&self, other: &Self) -> u64 {
        u64::from(self.abs_diff(*other))
    }
}

impl FieldValue for u32 {
    fn difference(&self, other: &Self) -> u64 {
        u64::from(self.abs_diff(*other))
    }
}

impl FieldValue for u64 {
    fn difference(&self, other: &Self) -> u64 {
        self.abs_diff(*other)
    }
}

impl FieldValue for Bathrooms {
    fn difference(&self, other: &Self) -> u64 {
        u64::from(self.halves().abs_diff(other.halves()))
    }
}

struct FieldMerger<'a> {
    policy: &'a MergePolicy,
    record: &'a SourceRecord,
    strength: MatchStrength,
    property: Property,
    changed: Vec<PropertyField>,
    conflicts: Vec<ReconciliationConflict>,
}

impl FieldMerger<'_> {
    fn takes_precedence(&self, field: PropertyField) -> bool {
        match self.property.provenance.get(&field) {
            None => true,
            Some(current) => {
                let incoming = self.policy.priority(field, &self.record.source);
                let existing = self.policy.priority(field, &current.source);
                incoming > existing
                    || (incoming == existing && self.record.observed_at >= current.observed_at)
            }
        }
    }

    fn stamp(&mut self, field: PropertyField) {
        self.property.provenance.insert(
            field,
            FieldProvenance {
                source: self.record.source.clone(),
                source_record_id: self.record.source_record_id.clone(),
                observed_at: self.record.observed_at,
            },
        );
    }

    fn apply<T: PartialEq>(
        &mut self,
        field: PropertyField,
        incoming: Option<T>,
        slot: fn(&mut Property) -> &mut Option<T>,
    ) {
        let Some(incoming) = incoming else {
            return;
        };
        if !self.takes_precedence(field) {
            return;
        }

        let current = slot(&mut self.property);
        if current.as_ref() != Some(&incoming) {
            *current = Some(incoming);
            self.changed.push(field);
        }
        self.stamp(field);
    }

    /// Like `apply`, but honours the immutable-fact tolerance table.
    fn apply_checked<T: FieldValue>(
        &mut self,
        field: PropertyField,
        incoming: Option<T>,
        slot: fn(&mut Property) -> &mut Option<T>,
    ) {
        let Some(tolerance) = self.policy.tolerance(field) else {
            return self.apply(field, incoming, slot);
        };
        let Some(value) = incoming else {
            return;
        };

        let existing = slot(&mut self.property).clone();
        match existing {
            Some(existing) if existing.difference(&value) > u64::from(tolerance) => {
                if self.strength.is_confident() {
                    self.conflicts.push(ReconciliationConflict {
                        property_id: self.property.id,
                        field,
                        retained_value: existing.to_string(),
                        retained_source: self
                            .property
                            .provenance
                            .get(&field)
                            .map(|provenance| provenance.source.clone()),
                        incoming_value: value.to_string(),
                        incoming_source: self.record.source.clone(),
                        incoming_record_id: self.record.source_record_id.clone(),
                        tolerance,
                        observed_at: self.record.observed_at,
                    });
                } else {
                    tracing::debug!(
                        property_id = %self.property.id,
                        %field,
                        retained = %existing,
                        incoming = %value,
                        "weak match disagrees on immutable field; keeping prior value"
                    );
                }
            }
            _ => self.apply(field, Some(value), slot),
        }
    }

    fn apply_last_sale(&mut self) {
        let (Some(price), Some(date)) = (self.record.last_sale_price, self.record.last_sale_date)
        else {
            return;
        };

        let take = match self.property.last_sale_date {
            None => true,
            Some(current) if date > current => true,
            Some(current) if date == current => self.takes_precedence(PropertyField::LastSale),
            Some(_) => false,
        };

        if take {
            if self.property.last_sale_price != Some(price)
                || self.property.last_sale_date != Some(date)
            {
                self.changed.push(PropertyField::LastSale);
            }
            self.property.last_sale_price = Some(price);
            self.property.last_sale_date = Some(date);
            self.stamp(PropertyField::LastSale);
        }
    }

    fn apply_status(&mut self) {
        let Some(status) = self.record.status else {
            return;
        };
        if self.property.status.is_terminal() || !self.takes_precedence(PropertyField::Status) {
            return;
        }
        if self.property.status != status {
            self.property.status = status;
            self.changed.push(PropertyField::Status);
        }
        self.stamp(PropertyField::Status);
    }
}

/// Merges one source record into a copy of the current canonical property, field by field.
pub(crate) fn merge_record(
    current: &Property,
    record: &SourceRecord,
    policy: &MergePolicy,
    strength: MatchStrength,
) -> MergeOutcome {
    let mut merger = FieldMerger {
        policy,
        record,
        strength,
        property: current.clone(),
        changed: Vec::new(),
        conflicts: Vec::new(),
    };
    let structure = &record.structure;

    merger.apply(PropertyField::Location, record.location, |p| &mut p.location);
    merger.apply_checked(PropertyField::Bedrooms, structure.bedrooms, |p| {
        &mut p.structure.bedrooms
    });
    merger.apply_checked(PropertyField::Bathrooms, structure.bathrooms, |p| {
        &mut p.structure.bathrooms
    });
    merger.apply_checked(PropertyField::LivingArea, structure.living_area_sqft, |p| {
        &mut p.structure.living_area_sqft
    });
    merger.apply_checked(PropertyField::LotSize, structure.lot_size_sqft, |p| {
        &mut p.structure.lot_size_sqft
    });
    merger.apply_checked(PropertyField::YearBuilt, structure.year_built, |p| {
        &mut p.structure.year_built
    });
    merger.apply_last_sale();
    merger.apply_checked(PropertyField::ListPrice, record.list_price, |p| {
        &mut p.list_price
    });
    merger.apply_checked(PropertyField::CurrentEstimate, record.estimate, |p| {
        &mut p.current_estimate
    });
    merger.apply_status();

    let mut property = merger.property;
    if property.address.city.trim().is_empty() {
        property.address.city = record.address.city.clone();
    }
    if property.address.state.trim().is_empty() {
        property.address.state = record.address.state.clone();
    }
    property.sources.insert(record.source_key());
    property.last_seen = property.last_seen.max(record.observed_at);

    MergeOutcome {
        property,
        changed: merger.changed,
        conflicts: merger.conflicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, PropertyId, PropertyStatus, Structure};
    use chrono::{TimeZone, Utc};

    fn record(source: &str, day: u32, structure: Structure) -> SourceRecord {
        SourceRecord {
            source: source.to_string(),
            source_record_id: format!("{source}-1"),
            address: Address::new("55 Pearl St", "Boulder", "CO", "80301"),
            location: None,
            structure,
            list_price: None,
            last_sale_price: None,
            last_sale_date: None,
            estimate: None,
            status: None,
            observed_at: Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap(),
        }
    }

    fn empty_property() -> Property {
        Property::new(
            PropertyId::derive("55 pearl st|80301", 0),
            Address::new("55 Pearl St", "", "", "80301"),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        )
    }

    fn merge_county(
        current: &Property,
        day: u32,
        structure: Structure,
        strength: MatchStrength,
    ) -> MergeOutcome {
        let record = record("county", day, structure);
        merge_record(current, &record, &MergePolicy::default(), strength)
    }

    fn beds(count: u8) -> Structure {
        Structure {
            bedrooms: Some(count),
            ..Structure::default()
        }
    }

    #[test]
    fn higher_priority_source_wins_regardless_of_recency() {
        let policy = MergePolicy::default();
        let first = merge_county(&empty_property(), 1, beds(3), MatchStrength::New);
        let second = merge_record(
            &first.property,
            &record("listing_api", 20, beds(4)),
            &policy,
            MatchStrength::Address,
        );

        assert_eq!(second.property.structure.bedrooms, Some(3));
        assert!(second.changed.is_empty());
        assert_eq!(second.property.provenance[&PropertyField::Bedrooms].source, "county");
    }

    #[test]
    fn equal_priority_prefers_most_recent_observation() {
        let first = merge_county(&empty_property(), 1, beds(3), MatchStrength::New);
        let newer = merge_county(&first.property, 5, beds(4), MatchStrength::SourceRecord);
        let stale = merge_county(&newer.property, 2, beds(2), MatchStrength::SourceRecord);

        assert_eq!(newer.property.structure.bedrooms, Some(4));
        assert_eq!(stale.property.structure.bedrooms, Some(4));
    }

    #[test]
    fn field_specific_priority_overrides_source_priority() {
        let policy = MergePolicy::default();
        let mut county = record("county", 1, Structure::default());
        county.list_price = Some(500_000);
        let mut listing = record("listing_api", 2, Structure::default());
        listing.list_price = Some(525_000);

        let first = merge_record(&empty_property(), &county, &policy, MatchStrength::New);
        let second = merge_record(&first.property, &listing, &policy, MatchStrength::Address);

        assert_eq!(second.property.list_price, Some(525_000));
        assert_eq!(second.changed, vec![PropertyField::ListPrice]);
    }

    #[test]
    fn immutable_disagreement_is_reported_and_prior_value_kept() {
        let mut built_1995 = beds(3);
        built_1995.year_built = Some(1995);
        let mut built_1998 = beds(3);
        built_1998.year_built = Some(1998);
        built_1998.living_area_sqft = Some(1_800);

        let first = merge_county(&empty_property(), 1, built_1995, MatchStrength::New);
        let second = merge_county(&first.property, 2, built_1998, MatchStrength::Address);

        assert_eq!(second.property.structure.year_built, Some(1995));
        assert_eq!(second.property.structure.living_area_sqft, Some(1_800));
        assert_eq!(second.conflicts.len(), 1);
        let conflict = &second.conflicts[0];
        assert_eq!(conflict.field, PropertyField::YearBuilt);
        assert_eq!(conflict.retained_value, "1995");
        assert_eq!(conflict.incoming_value, "1998");
    }

    #[test]
    fn weak_matches_keep_prior_value_without_conflict() {
        let mut built_1995 = beds(3);
        built_1995.year_built = Some(1995);
        let mut built_1998 = beds(3);
        built_1998.year_built = Some(1998);

        let first = merge_county(&empty_property(), 1, built_1995, MatchStrength::New);
        let second = merge_county(&first.property, 2, built_1998, MatchStrength::Proximity);

        assert!(second.conflicts.is_empty());
        assert_eq!(second.property.structure.year_built, Some(1995));
    }

    #[test]
    fn historical_status_is_terminal() {
        let policy = MergePolicy::default();
        let mut property = empty_property();
        property.status = PropertyStatus::Historical;
        let mut listing = record("listing_api", 3, Structure::default());
        listing.status = Some(PropertyStatus::Active);

        let outcome = merge_record(&property, &listing, &policy, MatchStrength::Address);
        assert_eq!(outcome.property.status, PropertyStatus::Historical);
    }

    #[test]
    fn newer_sale_replaces_older_sale() {
        let policy = MergePolicy::default();
        let mut older = record("listing_api", 1, Structure::default());
        older.last_sale_price = Some(410_000);
        older.last_sale_date = chrono::NaiveDate::from_ymd_opt(2019, 6, 1);
        let mut newer = record("market_index", 2, Structure::default());
        newer.last_sale_price = Some(505_000);
        newer.last_sale_date = chrono::NaiveDate::from_ymd_opt(2023, 6, 1);

        let first = merge_record(&empty_property(), &newer, &policy, MatchStrength::New);
        let second = merge_record(&first.property, &older, &policy, MatchStrength::Address);
        assert_eq!(second.property.last_sale_price, Some(505_000));
    }

    #[test]
    fn merge_policy_deserializes_from_json_table() {
        let policy: MergePolicy = serde_json::from_str(
            r#"{
                "default_priority": 1,
                "sources": { "county": 50 },
                "fields": { "list_price": { "listing_api": 90 } },
                "immutable": { "year_built": 2 }
            }"#,
        )
        .expect("policy parses");

        assert_eq!(policy.priority(PropertyField::ListPrice, "listing_api"), 90);
        assert_eq!(policy.priority(PropertyField::Bedrooms, "listing_api"), 1);
        assert_eq!(policy.priority(PropertyField::Bedrooms, "county"), 50);
        assert_eq!(policy.tolerance(PropertyField::YearBuilt), Some(2));
    }
}
