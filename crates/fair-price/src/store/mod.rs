//! Normalized property store.
//!
//! Source records are reconciled onto one canonical [`Property`] per parcel. Matching
//! and creation happen under the index lock so a parcel is never created twice; the
//! field merge for a resolved property runs under a per-property lock so concurrent
//! upserts for the same parcel serialize while other parcels proceed. Readers clone
//! `Arc<Property>` handles and only ever see fully merged versions.

mod conflict;
mod merge;

pub use conflict::ReconciliationConflict;
pub use merge::{MatchStrength, MergePolicy};

use crate::domain::{
    address_tokens, normalize_street_line, Address, FieldProvenance, GeoPoint, Property,
    PropertyField, PropertyId, PropertyStatus, SourceKey, SourceRecord,
};
use chrono::Utc;
use merge::merge_record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

const FUZZY_MATCH_THRESHOLD: f64 = 0.6;

fn default_proximity_meters() -> f64 {
    75.0
}

/// Reconciliation settings for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorePolicy {
    #[serde(default)]
    pub merge: MergePolicy,
    /// Maximum distance for two coordinate pairs to describe the same parcel.
    #[serde(default = "default_proximity_meters")]
    pub proximity_meters: f64,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            merge: MergePolicy::default(),
            proximity_meters: default_proximity_meters(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid source record {source_name}/{record_id}: {reason}")]
    InvalidRecord {
        source_name: String,
        record_id: String,
        reason: String,
    },
    #[error("property {0} not found")]
    NotFound(PropertyId),
    #[error(
        "reconciliation conflict on property {property_id}: {} field(s) held for review",
        .conflicts.len()
    )]
    ReconciliationConflict {
        property_id: PropertyId,
        conflicts: Vec<ReconciliationConflict>,
    },
    #[error("property store lock poisoned: {0}")]
    Poisoned(&'static str),
}

#[derive(Debug, Clone)]
struct IndexEntry {
    house_number: Option<String>,
    location: Option<GeoPoint>,
}

#[derive(Debug, Default)]
struct StoreIndex {
    entries: HashMap<PropertyId, IndexEntry>,
    by_key: HashMap<String, Vec<PropertyId>>,
    by_zip: HashMap<String, Vec<PropertyId>>,
    by_source: HashMap<SourceKey, PropertyId>,
}

impl StoreIndex {
    fn find(
        &self,
        address: &Address,
        location: Option<GeoPoint>,
        proximity_meters: f64,
    ) -> Option<(PropertyId, MatchStrength)> {
        let key = address.reconciliation_key();
        if let Some(ids) = self.by_key.get(&key) {
            for id in ids {
                let within = match (self.entries.get(id).and_then(|e| e.location), location) {
                    (Some(known), Some(incoming)) => {
                        known.distance_meters(&incoming) <= proximity_meters
                    }
                    _ => true,
                };
                if within {
                    return Some((*id, MatchStrength::Address));
                }
            }
        }

        let (Some(location), Some(house_number)) = (location, address.house_number()) else {
            return None;
        };

        self.by_zip
            .get(address.zip5())?
            .iter()
            .filter_map(|id| {
                let entry = self.entries.get(id)?;
                if entry.house_number.as_deref() != Some(house_number.as_str()) {
                    return None;
                }
                let distance = entry.location?.distance_meters(&location);
                (distance <= proximity_meters).then_some((*id, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| (id, MatchStrength::Proximity))
    }

    fn create(&mut self, address: &Address, location: Option<GeoPoint>) -> PropertyId {
        let key = address.reconciliation_key();
        let mut attempt = 0;
        let mut id = PropertyId::derive(&key, attempt);
        while self.entries.contains_key(&id) {
            attempt += 1;
            id = PropertyId::derive(&key, attempt);
        }

        let zip = address.zip5().to_string();
        self.entries.insert(
            id,
            IndexEntry {
                house_number: address.house_number(),
                location,
            },
        );
        self.by_key.entry(key).or_default().push(id);
        self.by_zip.entry(zip).or_default().push(id);
        id
    }
}

/// The only shared mutable resource of the engine.
#[derive(Debug, Default)]
pub struct PropertyStore {
    policy: StorePolicy,
    properties: RwLock<HashMap<PropertyId, Arc<Property>>>,
    index: RwLock<StoreIndex>,
    locks: Mutex<HashMap<PropertyId, Arc<Mutex<()>>>>,
    conflicts: Mutex<Vec<ReconciliationConflict>>,
}

impl PropertyStore {
    pub fn new(policy: StorePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &StorePolicy {
        &self.policy
    }

    /// Reconciles a source record and merges it into the canonical property.
    ///
    /// On an immutable-fact conflict every other field is still committed and the
    /// error carries the property id together with the conflicts queued for review.
    pub fn upsert(&self, record: SourceRecord) -> Result<PropertyId, StoreError> {
        validate(&record)?;

        let (id, strength) = self.resolve(&record)?;
        let lock = self.property_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|_| StoreError::Poisoned("property lock"))?;

        let current = match self.lookup(&id)? {
            Some(property) => property,
            None => Arc::new(Property::new(
                id,
                record.address.clone(),
                record.observed_at,
            )),
        };

        let outcome = merge_record(&current, &record, &self.policy.merge, strength);
        self.commit(Arc::new(outcome.property))?;

        debug!(
            property_id = %id,
            source = %record.source,
            record_id = %record.source_record_id,
            ?strength,
            changed = outcome.changed.len(),
            "merged source record"
        );

        if outcome.conflicts.is_empty() {
            return Ok(id);
        }

        for conflict in &outcome.conflicts {
            warn!(
                property_id = %id,
                field = %conflict.field,
                retained = %conflict.retained_value,
                incoming = %conflict.incoming_value,
                source = %conflict.incoming_source,
                "reconciliation conflict held for review"
            );
        }
        self.conflicts
            .lock()
            .map_err(|_| StoreError::Poisoned("conflict queue"))?
            .extend(outcome.conflicts.iter().cloned());

        Err(StoreError::ReconciliationConflict {
            property_id: id,
            conflicts: outcome.conflicts,
        })
    }

    pub fn get(&self, id: &PropertyId) -> Option<Arc<Property>> {
        self.properties.read().ok()?.get(id).cloned()
    }

    pub fn require(&self, id: &PropertyId) -> Result<Arc<Property>, StoreError> {
        self.lookup(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Candidate ids for a free-form address, best match first.
    pub fn find_by_fuzzy_address(&self, query: &str) -> Result<Vec<PropertyId>, StoreError> {
        let normalized = normalize_street_line(query);
        let query_tokens = address_tokens(&normalized);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let query_house = query_tokens
            .first()
            .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
            .copied();

        let properties = self
            .properties
            .read()
            .map_err(|_| StoreError::Poisoned("properties"))?;

        let mut scored: Vec<(f64, PropertyId)> = properties
            .values()
            .filter_map(|property| {
                let line = property.address.normalized_line();
                let city = normalize_street_line(&property.address.city);
                let state = normalize_street_line(&property.address.state);
                let mut tokens = address_tokens(&line);
                tokens.extend(address_tokens(&city));
                tokens.extend(address_tokens(&state));
                tokens.push(property.zip());

                if let Some(house) = query_house {
                    if tokens.first() != Some(&house) {
                        return None;
                    }
                }

                let hits = query_tokens
                    .iter()
                    .filter(|token| tokens.contains(*token))
                    .count();
                let score = hits as f64 / query_tokens.len() as f64;
                (score >= FUZZY_MATCH_THRESHOLD).then_some((score, property.id))
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(scored.into_iter().map(|(_, id)| id).collect())
    }

    /// Best-effort link of an address (e.g. a historical sale) to a canonical property.
    pub fn resolve_address(
        &self,
        address: &Address,
        location: Option<GeoPoint>,
    ) -> Result<Option<PropertyId>, StoreError> {
        let index = self
            .index
            .read()
            .map_err(|_| StoreError::Poisoned("index"))?;
        Ok(index
            .find(address, location, self.policy.proximity_meters)
            .map(|(id, _)| id))
    }

    /// Consistent view of every canonical property, ordered by id.
    pub fn snapshot(&self) -> Result<Vec<Arc<Property>>, StoreError> {
        let properties = self
            .properties
            .read()
            .map_err(|_| StoreError::Poisoned("properties"))?;
        let mut snapshot: Vec<_> = properties.values().cloned().collect();
        snapshot.sort_by_key(|property| property.id);
        Ok(snapshot)
    }

    /// Moves a property to the terminal `Historical` status. Properties are never deleted.
    pub fn retire(&self, id: &PropertyId) -> Result<(), StoreError> {
        let lock = self.property_lock(*id)?;
        let _guard = lock
            .lock()
            .map_err(|_| StoreError::Poisoned("property lock"))?;

        let mut property = (*self.require(id)?).clone();
        if property.status.is_terminal() {
            return Ok(());
        }
        let now = Utc::now();
        property.status = PropertyStatus::Historical;
        property.provenance.insert(
            PropertyField::Status,
            FieldProvenance {
                source: "store".to_string(),
                source_record_id: "retire".to_string(),
                observed_at: now,
            },
        );
        property.last_seen = property.last_seen.max(now);
        self.commit(Arc::new(property))?;

        info!(property_id = %id, "property retired to historical");
        Ok(())
    }

    pub fn pending_conflicts(&self) -> Result<Vec<ReconciliationConflict>, StoreError> {
        Ok(self
            .conflicts
            .lock()
            .map_err(|_| StoreError::Poisoned("conflict queue"))?
            .clone())
    }

    pub fn len(&self) -> usize {
        self.properties.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, record: &SourceRecord) -> Result<(PropertyId, MatchStrength), StoreError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| StoreError::Poisoned("index"))?;

        let source_key = record.source_key();
        if let Some(id) = index.by_source.get(&source_key) {
            return Ok((*id, MatchStrength::SourceRecord));
        }

        let (id, strength) = match index.find(
            &record.address,
            record.location,
            self.policy.proximity_meters,
        ) {
            Some(found) => found,
            None => (
                index.create(&record.address, record.location),
                MatchStrength::New,
            ),
        };
        index.by_source.insert(source_key, id);
        Ok((id, strength))
    }

    fn lookup(&self, id: &PropertyId) -> Result<Option<Arc<Property>>, StoreError> {
        let properties = self
            .properties
            .read()
            .map_err(|_| StoreError::Poisoned("properties"))?;
        Ok(properties.get(id).cloned())
    }

    fn commit(&self, property: Arc<Property>) -> Result<(), StoreError> {
        let id = property.id;
        let location = property.location;
        self.properties
            .write()
            .map_err(|_| StoreError::Poisoned("properties"))?
            .insert(id, property);

        let mut index = self
            .index
            .write()
            .map_err(|_| StoreError::Poisoned("index"))?;
        if let Some(entry) = index.entries.get_mut(&id) {
            if location.is_some() {
                entry.location = location;
            }
        }
        Ok(())
    }

    fn property_lock(&self, id: PropertyId) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::Poisoned("lock table"))?;
        Ok(Arc::clone(locks.entry(id).or_default()))
    }
}

fn validate(record: &SourceRecord) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidRecord {
        source_name: record.source.clone(),
        record_id: record.source_record_id.clone(),
        reason: reason.to_string(),
    };

    if record.source.trim().is_empty() {
        return Err(invalid("missing source name"));
    }
    if record.source_record_id.trim().is_empty() {
        return Err(invalid("missing source record id"));
    }
    if record.address.line.trim().is_empty() {
        return Err(invalid("missing address line"));
    }
    if !record.address.has_valid_zip() {
        return Err(invalid("zip code must be five digits"));
    }
    if record.location.is_some_and(|point| !point.is_valid()) {
        return Err(invalid("coordinates out of range"));
    }
    if record.structure.living_area_sqft == Some(0) {
        return Err(invalid("living area must be positive"));
    }
    if record.last_sale_price == Some(0) || record.list_price == Some(0) {
        return Err(invalid("prices must be positive"));
    }
    Ok(())
}
