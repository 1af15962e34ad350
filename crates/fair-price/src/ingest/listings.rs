use super::{empty_string_as_none, exact_count, parse_datetime, parse_price, whole, ImportError};
use crate::domain::{Address, Bathrooms, GeoPoint, PropertyStatus, SourceRecord, Structure};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Reader for already-normalized listing exports.
#[derive(Debug, Clone)]
pub struct ListingImporter {
    source: String,
}

impl Default for ListingImporter {
    fn default() -> Self {
        Self::new("listing_api")
    }
}

impl ListingImporter {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(
        &self,
        path: P,
        observed_at: DateTime<Utc>,
    ) -> Result<Vec<SourceRecord>, ImportError> {
        let file = std::fs::File::open(path)?;
        self.from_reader(file, observed_at)
    }

    /// `observed_at` is used for rows that carry no timestamp of their own.
    pub fn from_reader<R: Read>(
        &self,
        reader: R,
        observed_at: DateTime<Utc>,
    ) -> Result<Vec<SourceRecord>, ImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let mut records = Vec::new();

        for result in csv_reader.records() {
            let raw = result?;
            let line = raw.position().map(|position| position.line()).unwrap_or_default();
            let row: ListingRow = raw.deserialize(Some(&headers))?;
            records.push(self.to_record(row, line, observed_at)?);
        }

        info!(listings = records.len(), source = %self.source, "listings loaded");
        Ok(records)
    }

    fn to_record(
        &self,
        row: ListingRow,
        line: u64,
        fallback_observed_at: DateTime<Utc>,
    ) -> Result<SourceRecord, ImportError> {
        let row_error = |reason: String| ImportError::Row { line, reason };

        let bedrooms = exact_count::<u8>(row.bedrooms)
            .map_err(|reason| row_error(format!("bedrooms: {reason}")))?;
        let bathrooms = row
            .bathrooms
            .map(|value| Bathrooms::new(value as f32))
            .transpose()
            .map_err(|err| row_error(err.to_string()))?;
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => {
                let point = GeoPoint::new(latitude, longitude).ok_or_else(|| {
                    row_error(format!("coordinates {latitude},{longitude} out of range"))
                })?;
                Some(point)
            }
            _ => None,
        };
        let last_sale_date = match row.last_sale_date.as_deref() {
            Some(value) => Some(
                parse_datetime(value)
                    .ok_or_else(|| row_error(format!("unreadable last_sale_date {value:?}")))?
                    .date(),
            ),
            None => None,
        };
        let observed_at = match row.observed_at.as_deref() {
            Some(value) => Utc.from_utc_datetime(
                &parse_datetime(value)
                    .ok_or_else(|| row_error(format!("unreadable observed_at {value:?}")))?,
            ),
            None => fallback_observed_at,
        };

        Ok(SourceRecord {
            source: self.source.clone(),
            source_record_id: row.id,
            address: Address::new(
                row.address_line1,
                row.city.unwrap_or_default(),
                row.state.unwrap_or_default(),
                row.zip_code,
            ),
            location,
            structure: Structure {
                bedrooms,
                bathrooms,
                living_area_sqft: whole::<u32>(row.square_footage).filter(|area| *area > 0),
                lot_size_sqft: whole::<u32>(row.lot_size).filter(|area| *area > 0),
                year_built: whole::<u16>(row.year_built).filter(|year| *year > 0),
            },
            list_price: row.list_price.as_deref().and_then(parse_price),
            last_sale_price: row.last_sale_price.as_deref().and_then(parse_price),
            last_sale_date,
            estimate: row.estimate.as_deref().and_then(parse_price),
            status: row.status.as_deref().map(PropertyStatus::parse),
            observed_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListingRow {
    id: String,
    address_line1: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    city: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    state: Option<String>,
    zip_code: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    bedrooms: Option<f64>,
    #[serde(default)]
    bathrooms: Option<f64>,
    #[serde(default)]
    square_footage: Option<f64>,
    #[serde(default)]
    lot_size: Option<f64>,
    #[serde(default)]
    year_built: Option<f64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    list_price: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    last_sale_price: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    last_sale_date: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    estimate: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    status: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    observed_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;

    const HEADER: &str = concat!(
        "id,address_line1,city,state,zip_code,latitude,longitude,bedrooms,bathrooms,",
        "square_footage,lot_size,year_built,list_price,last_sale_price,last_sale_date,",
        "status,observed_at\n",
    );

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()
    }

    #[test]
    fn listing_rows_become_source_records() {
        let csv = format!(
            "{HEADER}L-1,55 Pearl St,Boulder,CO,80301,40.0176,-105.2797,3,2,1800,6000,1995,\
             620000,505000,2019-06-01,Active,2025-06-01T08:00:00Z\n"
        );
        let records = ListingImporter::default()
            .from_reader(Cursor::new(csv), now())
            .expect("import");

        let record = &records[0];
        assert_eq!(record.source, "listing_api");
        assert_eq!(record.list_price, Some(620_000));
        assert_eq!(record.status, Some(PropertyStatus::Active));
        assert_eq!(record.last_sale_date, NaiveDate::from_ymd_opt(2019, 6, 1));
        assert_eq!(record.structure.bathrooms, Some(Bathrooms::from_halves(4)));
        assert_eq!(record.observed_at, Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        assert!(record.location.is_some());
    }

    #[test]
    fn missing_optional_columns_fall_back() {
        let csv = format!("{HEADER}L-2,9 Spruce St,,,80302,,,,,,,,,,,,\n");
        let records = ListingImporter::new("mls")
            .from_reader(Cursor::new(csv), now())
            .expect("import");
        assert_eq!(records[0].source, "mls");
        assert_eq!(records[0].observed_at, now());
        assert!(records[0].structure.core().is_none());
        assert!(records[0].status.is_none());
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let csv = format!("{HEADER}L-3,9 Spruce St,Boulder,CO,80302,95.0,-105.0,3,2,1800,,,,,,,\n");
        let error = ListingImporter::default()
            .from_reader(Cursor::new(csv), now())
            .expect_err("bad coordinates");
        assert!(matches!(error, ImportError::Row { line: 2, .. }));
    }

    #[test]
    fn quarter_baths_are_rejected_not_rounded() {
        let csv = format!("{HEADER}L-4,9 Spruce St,Boulder,CO,80302,,,3,2.25,1800,,,,,,,\n");
        let error = ListingImporter::default()
            .from_reader(Cursor::new(csv), now())
            .expect_err("quarter bath");
        match error {
            ImportError::Row { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("2.25"), "{reason}");
            }
            other => panic!("expected a row error, got {other:?}"),
        }
    }

    #[test]
    fn fractional_bedrooms_are_rejected() {
        let csv = format!("{HEADER}L-5,9 Spruce St,Boulder,CO,80302,,,2.5,2,1800,,,,,,,\n");
        let error = ListingImporter::default()
            .from_reader(Cursor::new(csv), now())
            .expect_err("half bedroom");
        assert!(matches!(
            error,
            ImportError::Row { line: 2, ref reason } if reason.starts_with("bedrooms")
        ));
    }
}
