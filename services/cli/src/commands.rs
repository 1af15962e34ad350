use crate::cli::{BatchArgs, ClassifyArgs, CompsArgs, TrendsArgs, ValueArgs};
use crate::exporter;
use crate::infra::{load_workspace, resolve_target};
use crate::render::{self, OutputFormat};
use fair_price::domain::PropertyStatus;
use fair_price::error::AppError;
use fair_price::market::{record_trends, summarize_market, MarketSummary};
use fair_price::repository::{InMemoryObservationRepository, TransactionLog};
use fair_price::service::{BatchItem, BatchOptions, BatchValuation};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

pub(crate) fn value(args: ValueArgs) -> Result<(), AppError> {
    let workspace = load_workspace(&args.source)?;
    let service = &workspace.service;
    let id = resolve_target(service, &args.target)?;
    let estimate = service.get_fair_price(&id, workspace.as_of)?;

    match args.format {
        OutputFormat::Json => render::print_json(&estimate),
        OutputFormat::Text => {
            render::render_estimate(&*service.store().require(&id)?, &estimate);
            Ok(())
        }
    }
}

pub(crate) fn classify(args: ClassifyArgs) -> Result<(), AppError> {
    let workspace = load_workspace(&args.source)?;
    let service = &workspace.service;
    let id = resolve_target(service, &args.target)?;
    let property = service.store().require(&id)?;

    let list_price = args
        .list_price
        .or(property.list_price)
        .ok_or_else(|| {
            AppError::Lookup(format!("property {id} has no list price; pass --list-price"))
        })?;
    let result = service.classify_listing(&id, list_price, workspace.as_of)?;

    match args.format {
        OutputFormat::Json => render::print_json(&result),
        OutputFormat::Text => {
            render::render_classification(&property, &result);
            Ok(())
        }
    }
}

pub(crate) fn comps(args: CompsArgs) -> Result<(), AppError> {
    let workspace = load_workspace(&args.source)?;
    let service = &workspace.service;
    let id = resolve_target(service, &args.target)?;
    let set = service.select_comparables(&id, workspace.as_of, args.window_months, args.limit)?;

    match args.format {
        OutputFormat::Json => render::print_json(&set),
        OutputFormat::Text => {
            render::render_comparables(&*service.store().require(&id)?, &set);
            Ok(())
        }
    }
}

pub(crate) async fn batch(args: BatchArgs) -> Result<(), AppError> {
    // The recorder has to exist before the first counter is touched.
    let metrics = match &args.metrics_out {
        Some(_) => Some(exporter::install_recorder()?),
        None => None,
    };

    let workspace = load_workspace(&args.source)?;
    let options = BatchOptions {
        concurrency: args
            .concurrency
            .unwrap_or(workspace.config.batch.concurrency),
    };

    let items: Vec<BatchItem> = workspace
        .service
        .store()
        .snapshot()?
        .into_iter()
        .filter(|property| property.status == PropertyStatus::Active)
        .map(|property| BatchItem {
            property_id: property.id,
            list_price: property.list_price,
        })
        .collect();

    let runner = BatchValuation::new(Arc::clone(&workspace.service), options);
    let abort = runner.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; no further valuations will be scheduled");
            abort.abort();
        }
    });

    let report = runner.run(items, workspace.as_of).await;

    if let (Some(handle), Some(path)) = (&metrics, &args.metrics_out) {
        exporter::write_snapshot(handle, path)?;
    }

    match args.format {
        OutputFormat::Json => render::print_json(&BatchOutput {
            sources: &workspace.summary,
            report: &report,
        }),
        OutputFormat::Text => {
            render::render_batch(&report);
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    sources: &'a crate::infra::LoadSummary,
    report: &'a fair_price::service::BatchReport,
}

#[derive(Serialize)]
struct TrendsOutput<'a> {
    summary: &'a MarketSummary,
    observations: &'a [fair_price::domain::MarketObservation],
}

pub(crate) fn trends(args: TrendsArgs) -> Result<(), AppError> {
    let workspace = load_workspace(&args.source)?;
    let transactions = workspace.service.transactions().all()?;
    let properties = workspace.service.store().snapshot()?;
    let summary = summarize_market(
        &transactions,
        &properties,
        workspace.as_of,
        args.zip.as_deref(),
    );

    let repository = InMemoryObservationRepository::new();
    let observations = record_trends(&repository, &transactions, workspace.as_of, "county")?
        .into_iter()
        .filter(|observation| {
            args.zip
                .as_deref()
                .map_or(true, |zip| observation.geography == zip.trim())
        })
        .collect::<Vec<_>>();

    match args.format {
        OutputFormat::Json => render::print_json(&TrendsOutput {
            summary: &summary,
            observations: &observations,
        }),
        OutputFormat::Text => {
            render::render_summary(&summary);
            render::render_trends(&observations);
            Ok(())
        }
    }
}
