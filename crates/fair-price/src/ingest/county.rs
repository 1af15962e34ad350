use super::{
    empty_string_as_none, exact_count, normalize_header, parse_datetime, parse_price, whole,
    ImportError,
};
use crate::domain::{Address, Bathrooms, GeoPoint, SaleRecord, SourceRecord, Structure};
use chrono::{Months, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// One county sale, as a property sighting and as a logged sale.
#[derive(Debug, Clone, PartialEq)]
pub struct CountySale {
    pub record: SourceRecord,
    pub sale: SaleRecord,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountyImport {
    pub sales: Vec<CountySale>,
    /// Rows older than the lookback window.
    pub stale: usize,
    /// Rows without a usable address or zip.
    pub incomplete: usize,
}

/// Reader for the county sales extract.
#[derive(Debug, Clone)]
pub struct CountySalesImporter {
    source: String,
    default_state: String,
    lookback_years: u32,
}

impl Default for CountySalesImporter {
    fn default() -> Self {
        Self {
            source: "county".to_string(),
            default_state: "CO".to_string(),
            lookback_years: 5,
        }
    }
}

impl CountySalesImporter {
    pub fn new(
        source: impl Into<String>,
        default_state: impl Into<String>,
        lookback_years: u32,
    ) -> Self {
        Self {
            source: source.into(),
            default_state: default_state.into(),
            lookback_years,
        }
    }

    pub fn from_path<P: AsRef<Path>>(
        &self,
        path: P,
        as_of: NaiveDate,
    ) -> Result<CountyImport, ImportError> {
        let file = std::fs::File::open(path)?;
        self.from_reader(file, as_of)
    }

    pub fn from_reader<R: Read>(
        &self,
        reader: R,
        as_of: NaiveDate,
    ) -> Result<CountyImport, ImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: csv::StringRecord =
            csv_reader.headers()?.iter().map(normalize_header).collect();
        let cutoff = as_of
            .checked_sub_months(Months::new(self.lookback_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);

        let mut import = CountyImport::default();
        for result in csv_reader.records() {
            let raw = result?;
            let line = raw.position().map(|position| position.line()).unwrap_or_default();
            let row: CountyRow = raw.deserialize(Some(&headers))?;

            let sale_price = row
                .sale_price
                .as_deref()
                .and_then(parse_price)
                .ok_or_else(|| ImportError::Row {
                    line,
                    reason: format!("unreadable sale price {:?}", row.sale_price),
                })?;
            let sale_date = row
                .sale_date
                .as_deref()
                .and_then(parse_datetime)
                .map(|dt| dt.date())
                .ok_or_else(|| ImportError::Row {
                    line,
                    reason: format!("unreadable sale date {:?}", row.sale_date),
                })?;

            if sale_date < cutoff {
                import.stale += 1;
                continue;
            }

            let address = Address::new(
                row.property_address.clone().unwrap_or_default(),
                row.city.clone().unwrap_or_default(),
                row.state.clone().unwrap_or_else(|| self.default_state.clone()),
                row.zip_code.clone().unwrap_or_default(),
            );
            if address.line.trim().is_empty() || !address.has_valid_zip() {
                warn!(line, address = %address, "county row without usable address skipped");
                import.incomplete += 1;
                continue;
            }

            let structure = row.structure();
            let location = match (row.latitude, row.longitude) {
                (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
                _ => None,
            };
            let observed_at = Utc.from_utc_datetime(&sale_date.and_time(chrono::NaiveTime::MIN));
            let record_id = row
                .parcel_nb
                .clone()
                .unwrap_or_else(|| format!("line-{line}"));

            import.sales.push(CountySale {
                record: SourceRecord {
                    source: self.source.clone(),
                    source_record_id: record_id,
                    address: address.clone(),
                    location,
                    structure: structure.clone(),
                    list_price: None,
                    last_sale_price: Some(sale_price),
                    last_sale_date: Some(sale_date),
                    estimate: None,
                    status: None,
                    observed_at,
                },
                sale: SaleRecord {
                    source: self.source.clone(),
                    address,
                    location,
                    sale_date,
                    sale_price,
                    structure,
                },
            });
            debug!(line, sale_price, %sale_date, "county sale parsed");
        }

        info!(
            sales = import.sales.len(),
            stale = import.stale,
            incomplete = import.incomplete,
            "county extract loaded"
        );
        Ok(import)
    }
}

#[derive(Debug, Deserialize)]
struct CountyRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    parcel_nb: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    property_address: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    city: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    state: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    zip_code: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    sale_date: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    sale_price: Option<String>,
    #[serde(default)]
    bedrooms: Option<f64>,
    #[serde(default)]
    full_baths: Option<f64>,
    #[serde(default)]
    three_qtr_baths: Option<f64>,
    #[serde(default)]
    half_baths: Option<f64>,
    #[serde(default)]
    above_ground_sqft: Option<f64>,
    #[serde(default)]
    finished_bsmt_sqft: Option<f64>,
    #[serde(default)]
    year_built: Option<f64>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

impl CountyRow {
    /// Three-quarter baths count 0.75 and half baths 0.5, rounded to the nearest half step.
    fn bathrooms(&self) -> Option<Bathrooms> {
        if self.full_baths.is_none() && self.three_qtr_baths.is_none() && self.half_baths.is_none()
        {
            return None;
        }
        let total = self.full_baths.unwrap_or_default()
            + self.three_qtr_baths.unwrap_or_default() * 0.75
            + self.half_baths.unwrap_or_default() * 0.5;
        Bathrooms::rounded(total as f32).ok()
    }

    /// Above-ground plus finished basement area.
    fn living_area(&self) -> Option<u32> {
        let above = self.above_ground_sqft?;
        let total = above + self.finished_bsmt_sqft.unwrap_or_default();
        whole::<u32>(Some(total)).filter(|area| *area > 0)
    }

    fn structure(&self) -> Structure {
        Structure {
            bedrooms: exact_count(self.bedrooms).ok().flatten(),
            bathrooms: self.bathrooms(),
            living_area_sqft: self.living_area(),
            lot_size_sqft: None,
            year_built: whole::<u16>(self.year_built).filter(|year| *year > 0),
        }
    }
}
