use crate::cli::{SourceArgs, TargetArgs};
use chrono::{Local, NaiveDate, Utc};
use fair_price::config::AppConfig;
use fair_price::domain::{PropertyId, SourceRecord};
use fair_price::error::AppError;
use fair_price::ingest::{CountySalesImporter, ListingImporter};
use fair_price::policy::ValuationPolicy;
use fair_price::repository::{InMemoryTransactionLog, InMemoryValuationRepository, RepositoryError};
use fair_price::service::{ValuationError, ValuationService};
use fair_price::store::{MergePolicy, PropertyStore, StoreError};
use fair_price::telemetry;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) type Service = ValuationService<InMemoryTransactionLog, InMemoryValuationRepository>;

/// What was loaded into the in-memory engine before a command ran.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct LoadSummary {
    pub(crate) county_sales: usize,
    pub(crate) stale_sales: usize,
    pub(crate) incomplete_rows: usize,
    pub(crate) duplicate_sales: usize,
    pub(crate) listings: usize,
    pub(crate) conflicts: usize,
    pub(crate) properties: usize,
}

pub(crate) struct Workspace {
    pub(crate) config: AppConfig,
    pub(crate) service: Arc<Service>,
    pub(crate) summary: LoadSummary,
    pub(crate) as_of: NaiveDate,
}

/// Loads configuration, starts logging and hydrates the engine from the CSV sources.
pub(crate) fn load_workspace(source: &SourceArgs) -> Result<Workspace, AppError> {
    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    if let Some(path) = &source.merge_policy {
        config.policy.store.merge = read_merge_policy(path)?;
    }
    let as_of = source.as_of.unwrap_or_else(|| Local::now().date_naive());
    let service = Arc::new(build_service(config.policy.clone()));

    let mut summary = LoadSummary::default();
    let import = CountySalesImporter::default().from_path(&source.county_csv, as_of)?;
    summary.stale_sales = import.stale;
    summary.incomplete_rows = import.incomplete;
    for county_sale in import.sales {
        summary.conflicts += upsert_tolerating_conflicts(&service, county_sale.record)?;
        match service.record_sale(county_sale.sale) {
            Ok(_) => summary.county_sales += 1,
            Err(ValuationError::Repository(RepositoryError::Conflict)) => {
                summary.duplicate_sales += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(path) = &source.listings_csv {
        let records = ListingImporter::default().from_path(path, Utc::now())?;
        summary.listings = records.len();
        for record in records {
            summary.conflicts += upsert_tolerating_conflicts(&service, record)?;
        }
    }
    summary.properties = service.store().len();

    info!(
        environment = ?config.environment,
        county_sales = summary.county_sales,
        listings = summary.listings,
        properties = summary.properties,
        conflicts = summary.conflicts,
        %as_of,
        "sources loaded"
    );

    Ok(Workspace {
        config,
        service,
        summary,
        as_of,
    })
}

pub(crate) fn build_service(policy: ValuationPolicy) -> Service {
    ValuationService::new(
        Arc::new(PropertyStore::new(policy.store.clone())),
        Arc::new(InMemoryTransactionLog::new()),
        Arc::new(InMemoryValuationRepository::new()),
        policy,
    )
}

/// Conflicts are queued in the store for review; the load carries on.
fn upsert_tolerating_conflicts(service: &Service, record: SourceRecord) -> Result<usize, AppError> {
    match service.store().upsert(record) {
        Ok(_) => Ok(0),
        Err(StoreError::ReconciliationConflict { conflicts, .. }) => Ok(conflicts.len()),
        Err(err @ StoreError::InvalidRecord { .. }) => {
            warn!(error = %err, "source record rejected");
            Ok(0)
        }
        Err(err) => Err(err.into()),
    }
}

fn read_merge_policy(path: &std::path::Path) -> Result<MergePolicy, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let policy = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), "merge policy loaded");
    Ok(policy)
}

pub(crate) fn resolve_target(
    service: &Service,
    target: &TargetArgs,
) -> Result<PropertyId, AppError> {
    if let Some(id) = target.property_id {
        service.store().require(&id)?;
        return Ok(id);
    }

    let address = target.address.as_deref().unwrap_or_default();
    let matches = service.store().find_by_fuzzy_address(address)?;
    match matches.as_slice() {
        [] => Err(AppError::Lookup(format!("no property matches '{address}'"))),
        [id] => Ok(*id),
        [id, ..] => {
            warn!(
                address,
                candidates = matches.len(),
                chosen = %id,
                "address matched several properties"
            );
            Ok(*id)
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fair_price::domain::{Address, Bathrooms, Structure};

    fn listing(line: &str) -> SourceRecord {
        SourceRecord {
            source: "listing_api".to_string(),
            source_record_id: line.to_string(),
            address: Address::new(line, "Boulder", "CO", "80301"),
            location: None,
            structure: Structure {
                bedrooms: Some(3),
                bathrooms: Some(Bathrooms::from_halves(4)),
                living_area_sqft: Some(1_800),
                ..Structure::default()
            },
            list_price: Some(600_000),
            last_sale_price: None,
            last_sale_date: None,
            estimate: None,
            status: None,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn parses_iso_dates_only() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 30).expect("date");
        assert_eq!(parse_date(" 2025-06-30 "), Ok(expected));
        assert!(parse_date("06/30/2025").is_err());
    }

    #[test]
    fn resolves_addresses_and_rejects_unknown_ones() {
        let service = build_service(ValuationPolicy::default());
        let id = service.store().upsert(listing("55 Pearl St")).expect("stored");

        let by_address = TargetArgs {
            address: Some("55 pearl street".to_string()),
            property_id: None,
        };
        assert_eq!(resolve_target(&service, &by_address).expect("resolved"), id);

        let unknown = TargetArgs {
            address: Some("1 Nowhere Rd".to_string()),
            property_id: None,
        };
        assert!(matches!(resolve_target(&service, &unknown), Err(AppError::Lookup(_))));
    }

    #[test]
    fn invalid_records_do_not_abort_loading() {
        let service = build_service(ValuationPolicy::default());
        let mut record = listing("55 Pearl St");
        record.address.zip = "803".to_string();
        assert_eq!(upsert_tolerating_conflicts(&service, record).expect("tolerated"), 0);
        assert!(service.store().is_empty());
    }
}
