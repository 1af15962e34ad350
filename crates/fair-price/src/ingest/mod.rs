//! File adapters that turn raw feeds into [`SourceRecord`](crate::domain::SourceRecord)s
//! and [`SaleRecord`](crate::domain::SaleRecord)s. Nothing in the valuation core calls them.

mod county;
mod listings;

pub use county::{CountyImport, CountySale, CountySalesImporter};
pub use listings::ListingImporter;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row { line: u64, reason: String },
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(err) => write!(f, "failed to read import file: {}", err),
            ImportError::Csv(err) => write!(f, "invalid CSV data: {}", err),
            ImportError::Row { line, reason } => write!(f, "line {}: {}", line, reason),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io(err) => Some(err),
            ImportError::Csv(err) => Some(err),
            ImportError::Row { .. } => None,
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// `Sale Price` / `sale price` / `SALE_PRICE` all become `sale_price`.
pub(crate) fn normalize_header(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_ascii_lowercase()
}

/// Parses amounts like `$1,234,567` or `612500.00` into whole dollars.
pub(crate) fn parse_price(value: &str) -> Option<u64> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let amount: f64 = cleaned.parse().ok()?;
    (amount.is_finite() && amount > 0.0).then(|| amount.round() as u64)
}

pub(crate) fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

pub(crate) fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

pub(crate) fn whole<T: TryFrom<u64>>(value: Option<f64>) -> Option<T> {
    let value = value.filter(|v| v.is_finite() && *v >= 0.0)?;
    T::try_from(value.round() as u64).ok()
}

/// Counts such as bedrooms must already be whole; `2.5` is an error, not `3`.
pub(crate) fn exact_count<T: TryFrom<u64>>(value: Option<f64>) -> Result<Option<T>, String> {
    let Some(value) = value else {
        return Ok(None);
    };
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(format!("{value} is not a whole non-negative count"));
    }
    T::try_from(value as u64)
        .map(Some)
        .map_err(|_| format!("{value} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_become_snake_case() {
        assert_eq!(normalize_header("\u{feff}Sale  Price"), "sale_price");
        assert_eq!(normalize_header("Three Qtr Baths"), "three_qtr_baths");
    }

    #[test]
    fn prices_strip_currency_formatting() {
        assert_eq!(parse_price("$1,234,567"), Some(1_234_567));
        assert_eq!(parse_price(" 612500.00 "), Some(612_500));
        assert_eq!(parse_price("$0"), None);
        assert_eq!(parse_price("n/a"), None);
    }

    #[test]
    fn datetimes_accept_rfc3339_iso_and_us_dates() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 4).expect("date");
        assert_eq!(parse_datetime("2025-03-04").map(|dt| dt.date()), Some(expected));
        assert_eq!(parse_datetime("03/04/2025").map(|dt| dt.date()), Some(expected));
        assert_eq!(
            parse_datetime("2025-03-04T10:00:00Z").map(|dt| dt.date()),
            Some(expected)
        );
        assert!(parse_datetime("  ").is_none());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn counts_must_be_whole() {
        assert_eq!(exact_count::<u8>(Some(3.0)), Ok(Some(3)));
        assert_eq!(exact_count::<u8>(None), Ok(None));
        assert!(exact_count::<u8>(Some(2.5)).is_err());
        assert!(exact_count::<u8>(Some(-1.0)).is_err());
        assert!(exact_count::<u8>(Some(300.0)).is_err());
        assert_eq!(whole::<u8>(Some(2.6)), Some(3));
    }
}
