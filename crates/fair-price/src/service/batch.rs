use super::{UnavailableReason, ValuationError, ValuationService};
use crate::domain::{PropertyId, ValuationEstimate};
use crate::pricing::Classification;
use crate::repository::{TransactionLog, ValuationRepository};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Cloneable stop flag: once raised, no further runs are scheduled.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// One property to value, optionally with a list price to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub property_id: PropertyId,
    pub list_price: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Valued {
        estimate: ValuationEstimate,
        classification: Option<Classification>,
        /// Set when the estimate exists but the listing could not be labeled.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Unavailable {
        reason: UnavailableReason,
    },
    Failed {
        error: String,
    },
    Skipped,
}

impl BatchOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Valued { .. } => "valued",
            Self::Unavailable { .. } => "unavailable",
            Self::Failed { .. } => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub property_id: PropertyId,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub valued: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub skipped: usize,
    /// One entry per input item, in input order.
    pub results: Vec<BatchResult>,
}

impl BatchReport {
    fn push(&mut self, result: BatchResult) {
        match result.outcome {
            BatchOutcome::Valued { .. } => self.valued += 1,
            BatchOutcome::Unavailable { .. } => self.unavailable += 1,
            BatchOutcome::Failed { .. } => self.failed += 1,
            BatchOutcome::Skipped => self.skipped += 1,
        }
        self.results.push(result);
    }
}

/// Values many properties in parallel on the blocking pool.
///
/// Each property runs independently; a failing run is recorded and never
/// affects the others. Aborting stops scheduling while in-flight runs finish.
pub struct BatchValuation<T, V> {
    service: Arc<ValuationService<T, V>>,
    options: BatchOptions,
    abort: AbortHandle,
}

impl<T, V> BatchValuation<T, V>
where
    T: TransactionLog + 'static,
    V: ValuationRepository + 'static,
{
    pub fn new(service: Arc<ValuationService<T, V>>, options: BatchOptions) -> Self {
        Self {
            service,
            options,
            abort: AbortHandle::default(),
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub async fn run(&self, items: Vec<BatchItem>, as_of: NaiveDate) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut pending = Vec::with_capacity(items.len());

        for item in items {
            if self.abort.is_aborted() {
                pending.push((item.property_id, None));
                continue;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                pending.push((item.property_id, None));
                continue;
            };
            // Abort may have been raised while waiting for a slot.
            if self.abort.is_aborted() {
                drop(permit);
                pending.push((item.property_id, None));
                continue;
            }

            let service = Arc::clone(&self.service);
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                value_one(&service, &item, as_of)
            });
            pending.push((item.property_id, Some(handle)));
        }

        let mut report = BatchReport::default();
        for (property_id, handle) in pending {
            let outcome = match handle {
                None => BatchOutcome::Skipped,
                Some(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(
                            property_id = %property_id,
                            error = %err,
                            "valuation task did not complete"
                        );
                        BatchOutcome::Failed {
                            error: format!("valuation task did not complete: {err}"),
                        }
                    }
                },
            };
            metrics::counter!("fair_price_valuations_total", "outcome" => outcome.label())
                .increment(1);
            report.push(BatchResult {
                property_id,
                outcome,
            });
        }

        info!(
            valued = report.valued,
            unavailable = report.unavailable,
            failed = report.failed,
            skipped = report.skipped,
            aborted = self.abort.is_aborted(),
            "batch valuation finished"
        );
        report
    }
}

fn value_one<T, V>(
    service: &ValuationService<T, V>,
    item: &BatchItem,
    as_of: NaiveDate,
) -> BatchOutcome
where
    T: TransactionLog + 'static,
    V: ValuationRepository + 'static,
{
    let Some(list_price) = item.list_price else {
        return match service.get_fair_price(&item.property_id, as_of) {
            Ok(estimate) => BatchOutcome::Valued {
                estimate,
                classification: None,
                note: None,
            },
            Err(err) => failure(&item.property_id, err),
        };
    };

    match service.classify_listing(&item.property_id, list_price, as_of) {
        Ok(result) => BatchOutcome::Valued {
            estimate: result.estimate,
            classification: Some(result.classification),
            note: None,
        },
        Err(ValuationError::LowConfidence {
            property_id,
            score,
            minimum,
            estimate,
        }) => BatchOutcome::Valued {
            note: Some(format!(
                "valuation for {property_id} has confidence {score:.2}, \
                 below the required {minimum:.2}; listing left unlabeled"
            )),
            estimate: *estimate,
            classification: None,
        },
        Err(err) => failure(&item.property_id, err),
    }
}

fn failure(property_id: &PropertyId, err: ValuationError) -> BatchOutcome {
    match err {
        ValuationError::NotAvailable { reason, .. } => BatchOutcome::Unavailable { reason },
        other => {
            warn!(property_id = %property_id, error = %other, "valuation failed");
            BatchOutcome::Failed {
                error: other.to_string(),
            }
        }
    }
}
