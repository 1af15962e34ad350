use super::{
    MarketObservationRepository, RepositoryError, TransactionLog, UpsertOutcome,
    ValuationRepository,
};
use crate::domain::{
    MarketObservation, MetricKind, ObservationKey, PropertyId, SaleRecord, Transaction,
    TransactionId, ValuationEstimate,
};
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

fn poisoned(name: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("{name} lock poisoned"))
}

type SaleKey = (String, String, NaiveDate, u64);

#[derive(Debug, Default)]
struct LogState {
    transactions: Vec<Transaction>,
    seen: HashSet<SaleKey>,
}

#[derive(Debug, Default)]
pub struct InMemoryTransactionLog {
    state: RwLock<LogState>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| state.transactions.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
        pick: impl Fn(&Transaction) -> bool,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let state = self.state.read().map_err(|_| poisoned("transaction log"))?;
        Ok(state
            .transactions
            .iter()
            .filter(|transaction| pick(transaction))
            .cloned()
            .collect())
    }
}

impl TransactionLog for InMemoryTransactionLog {
    fn append(
        &self,
        sale: SaleRecord,
        property_id: Option<PropertyId>,
    ) -> Result<Transaction, RepositoryError> {
        let mut state = self.state.write().map_err(|_| poisoned("transaction log"))?;
        let key = (
            sale.source.clone(),
            sale.address.reconciliation_key(),
            sale.sale_date,
            sale.sale_price,
        );
        if !state.seen.insert(key) {
            return Err(RepositoryError::Conflict);
        }

        let transaction = Transaction {
            id: TransactionId(state.transactions.len() as u64 + 1),
            property_id,
            source: sale.source,
            address: sale.address,
            location: sale.location,
            sale_date: sale.sale_date,
            sale_price: sale.sale_price,
            structure: sale.structure,
            recorded_at: Utc::now(),
        };
        state.transactions.push(transaction.clone());
        Ok(transaction)
    }

    fn all(&self) -> Result<Vec<Transaction>, RepositoryError> {
        self.read(|_| true)
    }

    fn for_zip(&self, zip: &str) -> Result<Vec<Transaction>, RepositoryError> {
        self.read(|transaction| transaction.zip() == zip)
    }

    fn for_property(&self, id: &PropertyId) -> Result<Vec<Transaction>, RepositoryError> {
        self.read(|transaction| transaction.property_id.as_ref() == Some(id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryObservationRepository {
    observations: Mutex<BTreeMap<ObservationKey, MarketObservation>>,
}

impl InMemoryObservationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarketObservationRepository for InMemoryObservationRepository {
    fn upsert(&self, observation: MarketObservation) -> Result<UpsertOutcome, RepositoryError> {
        let mut guard = self
            .observations
            .lock()
            .map_err(|_| poisoned("observations"))?;
        match guard.insert(observation.key(), observation) {
            Some(_) => Ok(UpsertOutcome::Replaced),
            None => Ok(UpsertOutcome::Inserted),
        }
    }

    fn get(&self, key: &ObservationKey) -> Result<Option<MarketObservation>, RepositoryError> {
        let guard = self
            .observations
            .lock()
            .map_err(|_| poisoned("observations"))?;
        Ok(guard.get(key).cloned())
    }

    fn series(
        &self,
        geography: &str,
        metric: MetricKind,
        since: Option<NaiveDate>,
    ) -> Result<Vec<MarketObservation>, RepositoryError> {
        let guard = self
            .observations
            .lock()
            .map_err(|_| poisoned("observations"))?;
        // BTreeMap ordering puts geography then date first, so the series comes out dated.
        Ok(guard
            .values()
            .filter(|observation| observation.geography == geography)
            .filter(|observation| observation.metric == metric)
            .filter(|observation| since.map_or(true, |since| observation.date >= since))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryValuationRepository {
    history: Mutex<HashMap<PropertyId, Vec<ValuationEstimate>>>,
}

impl InMemoryValuationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValuationRepository for InMemoryValuationRepository {
    fn append(&self, estimate: ValuationEstimate) -> Result<(), RepositoryError> {
        let mut guard = self.history.lock().map_err(|_| poisoned("valuations"))?;
        let entries = guard.entry(estimate.property_id).or_default();
        if entries.iter().any(|existing| existing.id == estimate.id) {
            return Err(RepositoryError::Conflict);
        }
        entries.push(estimate);
        Ok(())
    }

    fn latest(&self, id: &PropertyId) -> Result<Option<ValuationEstimate>, RepositoryError> {
        let guard = self.history.lock().map_err(|_| poisoned("valuations"))?;
        Ok(guard.get(id).and_then(|entries| entries.last()).cloned())
    }

    fn history(&self, id: &PropertyId) -> Result<Vec<ValuationEstimate>, RepositoryError> {
        let guard = self.history.lock().map_err(|_| poisoned("valuations"))?;
        Ok(guard.get(id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Structure};

    fn sale(line: &str, price: u64) -> SaleRecord {
        SaleRecord {
            source: "county".to_string(),
            address: Address::new(line, "Boulder", "CO", "80301"),
            location: None,
            sale_date: NaiveDate::from_ymd_opt(2024, 5, 1).expect("date"),
            sale_price: price,
            structure: Structure::default(),
        }
    }

    fn observation(date: NaiveDate, value: f64) -> MarketObservation {
        MarketObservation {
            geography: "80301".to_string(),
            date,
            source: "county".to_string(),
            metric: MetricKind::MedianPrice,
            value,
        }
    }

    #[test]
    fn transaction_log_assigns_sequential_ids_and_rejects_duplicates() {
        let log = InMemoryTransactionLog::new();
        let first = log.append(sale("1 Main St", 500_000), None).expect("append");
        let second = log.append(sale("2 Main St", 510_000), None).expect("append");
        assert_eq!(first.id, TransactionId(1));
        assert_eq!(second.id, TransactionId(2));

        let duplicate = log.append(sale("1 main street", 500_000), None);
        assert!(matches!(duplicate, Err(RepositoryError::Conflict)));
        assert_eq!(log.len(), 2);
        assert_eq!(log.for_zip("80301").expect("zip").len(), 2);
    }

    #[test]
    fn observations_overwrite_on_identical_key() {
        let repo = InMemoryObservationRepository::new();
        let may = NaiveDate::from_ymd_opt(2025, 5, 1).expect("date");
        let april = NaiveDate::from_ymd_opt(2025, 4, 1).expect("date");

        let first = repo.upsert(observation(may, 600_000.0)).expect("upsert");
        let second = repo.upsert(observation(may, 610_000.0)).expect("upsert");
        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Replaced);
        repo.upsert(observation(april, 590_000.0)).expect("upsert");

        let stored = repo
            .get(&observation(may, 0.0).key())
            .expect("get")
            .expect("present");
        assert_eq!(stored.value, 610_000.0);

        let series = repo
            .series("80301", MetricKind::MedianPrice, None)
            .expect("series");
        let dates: Vec<_> = series.iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![april, may]);
        assert_eq!(
            repo.series("80301", MetricKind::MedianPrice, Some(may))
                .expect("series")
                .len(),
            1
        );
    }
}
