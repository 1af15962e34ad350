use super::address::{Address, GeoPoint};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable, source-independent identifier of a canonical property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(Uuid);

impl PropertyId {
    /// Derives the identifier from the reconciliation key seen at first sighting.
    pub(crate) fn derive(reconciliation_key: &str, attempt: u32) -> Self {
        let name = if attempt == 0 {
            format!("property/{reconciliation_key}")
        } else {
            format!("property/{reconciliation_key}#{attempt}")
        };
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PropertyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Bathroom count kept at half-step precision (stored as a count of halves).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Bathrooms(u16);

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("bathroom count {0} is not a non-negative half step")]
pub struct InvalidBathrooms(pub f32);

impl Bathrooms {
    pub const fn from_halves(halves: u16) -> Self {
        Self(halves)
    }

    /// Accepts only exact half steps (2.0, 2.5, ...).
    pub fn new(value: f32) -> Result<Self, InvalidBathrooms> {
        if !value.is_finite() || value < 0.0 {
            return Err(InvalidBathrooms(value));
        }
        let halves = value * 2.0;
        if (halves - halves.round()).abs() > 1e-3 || halves > f32::from(u16::MAX) {
            return Err(InvalidBathrooms(value));
        }
        Ok(Self(halves.round() as u16))
    }

    /// Rounds to the nearest half step, for feeds that report quarter baths.
    pub fn rounded(value: f32) -> Result<Self, InvalidBathrooms> {
        if !value.is_finite() || value < 0.0 || value * 2.0 > f32::from(u16::MAX) {
            return Err(InvalidBathrooms(value));
        }
        Ok(Self((value * 2.0).round() as u16))
    }

    pub const fn halves(self) -> u16 {
        self.0
    }

    pub fn as_f32(self) -> f32 {
        f32::from(self.0) / 2.0
    }
}

impl TryFrom<f32> for Bathrooms {
    type Error = InvalidBathrooms;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Bathrooms> for f32 {
    fn from(value: Bathrooms) -> Self {
        value.as_f32()
    }
}

impl fmt::Display for Bathrooms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}", self.0 / 2)
        } else {
            write!(f, "{:.1}", self.as_f32())
        }
    }
}

/// Structural attributes of a parcel; every field is optional because feeds are partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<Bathrooms>,
    pub living_area_sqft: Option<u32>,
    pub lot_size_sqft: Option<u32>,
    pub year_built: Option<u16>,
}

/// The three attributes comparable selection cannot work without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStructure {
    pub bedrooms: u8,
    pub bathrooms: Bathrooms,
    pub living_area_sqft: u32,
}

impl Structure {
    pub fn core(&self) -> Option<CoreStructure> {
        Some(CoreStructure {
            bedrooms: self.bedrooms?,
            bathrooms: self.bathrooms?,
            living_area_sqft: self.living_area_sqft.filter(|area| *area > 0)?,
        })
    }

    pub fn missing_core(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bedrooms.is_none() {
            missing.push("bedrooms");
        }
        if self.bathrooms.is_none() {
            missing.push("bathrooms");
        }
        if self.living_area_sqft.filter(|area| *area > 0).is_none() {
            missing.push("living_area_sqft");
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Active,
    Pending,
    Sold,
    Withdrawn,
    Unknown,
    /// Terminal state replacing deletion.
    Historical,
}

impl PropertyStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Sold => "sold",
            Self::Withdrawn => "withdrawn",
            Self::Unknown => "unknown",
            Self::Historical => "historical",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Historical)
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" | "for_sale" | "for sale" => Self::Active,
            "pending" | "under_contract" | "under contract" | "contingent" => Self::Pending,
            "sold" | "closed" => Self::Sold,
            "withdrawn" | "inactive" | "expired" | "cancelled" => Self::Withdrawn,
            "historical" | "delisted" => Self::Historical,
            _ => Self::Unknown,
        }
    }
}

/// Merge-tracked fields of a canonical property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyField {
    Location,
    Bedrooms,
    Bathrooms,
    LivingArea,
    LotSize,
    YearBuilt,
    LastSale,
    ListPrice,
    CurrentEstimate,
    Status,
}

impl PropertyField {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Bedrooms => "bedrooms",
            Self::Bathrooms => "bathrooms",
            Self::LivingArea => "living_area",
            Self::LotSize => "lot_size",
            Self::YearBuilt => "year_built",
            Self::LastSale => "last_sale",
            Self::ListPrice => "list_price",
            Self::CurrentEstimate => "current_estimate",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for PropertyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which source supplied the current value of a field, and when it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub source: String,
    pub source_record_id: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub source: String,
    pub source_record_id: String,
}

/// Canonical, deduplicated view of one physical parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub address: Address,
    pub location: Option<GeoPoint>,
    pub structure: Structure,
    pub last_sale_price: Option<u64>,
    pub last_sale_date: Option<NaiveDate>,
    pub list_price: Option<u64>,
    pub current_estimate: Option<u64>,
    pub status: PropertyStatus,
    pub provenance: BTreeMap<PropertyField, FieldProvenance>,
    pub sources: BTreeSet<SourceKey>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Property {
    pub(crate) fn new(id: PropertyId, address: Address, first_seen: DateTime<Utc>) -> Self {
        Self {
            id,
            address,
            location: None,
            structure: Structure::default(),
            last_sale_price: None,
            last_sale_date: None,
            list_price: None,
            current_estimate: None,
            status: PropertyStatus::Unknown,
            provenance: BTreeMap::new(),
            sources: BTreeSet::new(),
            first_seen,
            last_seen: first_seen,
        }
    }

    pub fn reconciliation_key(&self) -> String {
        self.address.reconciliation_key()
    }

    pub fn zip(&self) -> &str {
        self.address.zip5()
    }
}

/// Normalized record handed over by an ingest adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: String,
    pub source_record_id: String,
    pub address: Address,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub structure: Structure,
    #[serde(default)]
    pub list_price: Option<u64>,
    #[serde(default)]
    pub last_sale_price: Option<u64>,
    #[serde(default)]
    pub last_sale_date: Option<NaiveDate>,
    #[serde(default)]
    pub estimate: Option<u64>,
    #[serde(default)]
    pub status: Option<PropertyStatus>,
    pub observed_at: DateTime<Utc>,
}

impl SourceRecord {
    pub fn source_key(&self) -> SourceKey {
        SourceKey {
            source: self.source.clone(),
            source_record_id: self.source_record_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bathrooms_accept_half_steps_only() {
        assert_eq!(Bathrooms::new(2.5).expect("half step").halves(), 5);
        assert!(Bathrooms::new(2.25).is_err());
        assert!(Bathrooms::new(-1.0).is_err());
        assert_eq!(Bathrooms::rounded(2.25).expect("rounded").as_f32(), 2.5);
        assert_eq!(Bathrooms::rounded(1.75).expect("rounded").as_f32(), 2.0);
    }

    #[test]
    fn bathrooms_round_trip_through_serde_as_numbers() {
        let baths = Bathrooms::new(1.5).expect("valid");
        let json = serde_json::to_string(&baths).expect("serialize");
        assert_eq!(json, "1.5");
        assert!(serde_json::from_str::<Bathrooms>("1.3").is_err());
    }

    #[test]
    fn core_structure_reports_missing_fields() {
        let structure = Structure {
            bedrooms: Some(3),
            bathrooms: None,
            living_area_sqft: Some(0),
            ..Structure::default()
        };
        assert!(structure.core().is_none());
        assert_eq!(structure.missing_core(), vec!["bathrooms", "living_area_sqft"]);
    }

    #[test]
    fn property_ids_are_stable_per_key() {
        let a = PropertyId::derive("55 pearl st|80301", 0);
        let b = PropertyId::derive("55 pearl st|80301", 0);
        let c = PropertyId::derive("55 pearl st|80301", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string().parse::<PropertyId>().expect("parse"), a);
    }

    #[test]
    fn status_parsing_maps_feed_vocabulary() {
        assert_eq!(PropertyStatus::parse("For Sale"), PropertyStatus::Active);
        assert_eq!(PropertyStatus::parse("closed"), PropertyStatus::Sold);
        assert_eq!(PropertyStatus::parse("delisted"), PropertyStatus::Historical);
        assert_eq!(PropertyStatus::parse("???"), PropertyStatus::Unknown);
    }
}
