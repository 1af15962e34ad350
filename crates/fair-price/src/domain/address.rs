use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Postal address as reported by a source feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub line: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub zip: String,
}

impl Address {
    pub fn new(
        line: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
    ) -> Self {
        Self {
            line: line.into(),
            city: city.into(),
            state: state.into(),
            zip: zip.into(),
        }
    }

    /// Five-digit zip, ignoring any `+4` extension.
    pub fn zip5(&self) -> &str {
        let trimmed = self.zip.trim();
        trimmed.split('-').next().unwrap_or(trimmed)
    }

    pub fn has_valid_zip(&self) -> bool {
        let zip = self.zip5();
        zip.len() == 5 && zip.chars().all(|c| c.is_ascii_digit())
    }

    pub fn normalized_line(&self) -> String {
        normalize_street_line(&self.line)
    }

    /// Key used to reconcile source records onto one canonical parcel.
    pub fn reconciliation_key(&self) -> String {
        format!("{}|{}", self.normalized_line(), self.zip5())
    }

    pub fn house_number(&self) -> Option<String> {
        house_number(&self.normalized_line())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line.trim())?;
        if !self.city.trim().is_empty() {
            write!(f, ", {}", self.city.trim())?;
        }
        if !self.state.trim().is_empty() {
            write!(f, ", {}", self.state.trim())?;
        }
        write!(f, " {}", self.zip5())
    }
}

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let point = Self {
            latitude,
            longitude,
        };
        point.is_valid().then_some(point)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }

    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        self.distance_km(other) * 1000.0
    }
}

static STREET_TOKENS: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

fn street_tokens() -> &'static HashMap<&'static str, &'static str> {
    STREET_TOKENS.get_or_init(|| {
        const TOKENS: &[(&str, &str)] = &[
            // Suffixes
            ("street", "st"),
            ("str", "st"),
            ("avenue", "ave"),
            ("av", "ave"),
            ("road", "rd"),
            ("drive", "dr"),
            ("lane", "ln"),
            ("court", "ct"),
            ("circle", "cir"),
            ("boulevard", "blvd"),
            ("place", "pl"),
            ("parkway", "pkwy"),
            ("terrace", "ter"),
            ("trail", "trl"),
            ("highway", "hwy"),
            // Directionals
            ("north", "n"),
            ("south", "s"),
            ("east", "e"),
            ("west", "w"),
            ("northeast", "ne"),
            ("northwest", "nw"),
            ("southeast", "se"),
            ("southwest", "sw"),
            // Unit designators
            ("apartment", "unit"),
            ("apt", "unit"),
            ("suite", "unit"),
            ("ste", "unit"),
            ("#", "unit"),
        ];

        TOKENS.iter().copied().collect()
    })
}

pub(crate) fn normalize_street_line(value: &str) -> String {
    let cleaned: String = value
        .replace(['\u{feff}', '\u{200b}'], "")
        .chars()
        .map(|c| match c {
            '#' => " # ".to_string(),
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase().to_string(),
            _ => " ".to_string(),
        })
        .collect();

    let tokens = street_tokens();
    cleaned
        .split_whitespace()
        .map(|token| tokens.get(token).copied().unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn address_tokens(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

fn house_number(normalized: &str) -> Option<String> {
    normalized
        .split_whitespace()
        .next()
        .filter(|token| token.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_abbreviates_suffixes_and_units() {
        assert_eq!(
            normalize_street_line("1234  North Maple Street, Apt. 5"),
            "1234 n maple st unit 5"
        );
        assert_eq!(normalize_street_line("1234 N. Maple St #5"), "1234 n maple st unit 5");
    }

    #[test]
    fn reconciliation_key_ignores_zip_extension() {
        let a = Address::new("55 Pearl Street", "Boulder", "CO", "80301-1234");
        let b = Address::new("55 pearl st", "BOULDER", "co", "80301");
        assert_eq!(a.reconciliation_key(), b.reconciliation_key());
        assert_eq!(a.house_number().as_deref(), Some("55"));
    }

    #[test]
    fn zip_validation_requires_five_digits() {
        assert!(Address::new("1 Main", "", "", "80301").has_valid_zip());
        assert!(!Address::new("1 Main", "", "", "8030").has_valid_zip());
        assert!(!Address::new("1 Main", "", "", "ABCDE").has_valid_zip());
    }

    #[test]
    fn haversine_distance_is_plausible() {
        let boulder = GeoPoint::new(40.0150, -105.2705).expect("valid");
        let longmont = GeoPoint::new(40.1672, -105.1019).expect("valid");
        let distance = boulder.distance_km(&longmont);
        assert!((distance - 22.2).abs() < 1.0, "got {distance}");
        assert!(GeoPoint::new(95.0, 0.0).is_none());
    }
}
