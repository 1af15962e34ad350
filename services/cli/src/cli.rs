use crate::commands;
use crate::render::OutputFormat;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use fair_price::domain::PropertyId;
use fair_price::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fair-price",
    about = "Estimate fair prices for listed properties from comparable sales",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate the fair price of one property
    Value(ValueArgs),
    /// Label a list price as underpriced, fair or overpriced
    Classify(ClassifyArgs),
    /// Show the comparable sales behind a valuation
    Comps(CompsArgs),
    /// Value and classify every active listing
    Batch(BatchArgs),
    /// Derive zip-level market statistics from the loaded sales
    Trends(TrendsArgs),
}

/// Where the engine's data comes from.
#[derive(Args, Debug)]
pub(crate) struct SourceArgs {
    /// County sales extract (CSV)
    #[arg(long)]
    pub(crate) county_csv: PathBuf,
    /// Normalized listing export (CSV)
    #[arg(long)]
    pub(crate) listings_csv: Option<PathBuf>,
    /// JSON merge-policy table replacing the default source priorities
    #[arg(long)]
    pub(crate) merge_policy: Option<PathBuf>,
    /// Valuation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub(crate) struct TargetArgs {
    /// Free-form street address, matched against the loaded properties
    #[arg(long)]
    pub(crate) address: Option<String>,
    /// Canonical property id
    #[arg(long)]
    pub(crate) property_id: Option<PropertyId>,
}

#[derive(Args, Debug)]
pub(crate) struct ValueArgs {
    #[command(flatten)]
    pub(crate) source: SourceArgs,
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub(crate) format: OutputFormat,
}

#[derive(Args, Debug)]
pub(crate) struct ClassifyArgs {
    #[command(flatten)]
    pub(crate) source: SourceArgs,
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Asking price to classify. Defaults to the property's current list price.
    #[arg(long)]
    pub(crate) list_price: Option<u64>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub(crate) format: OutputFormat,
}

#[derive(Args, Debug)]
pub(crate) struct CompsArgs {
    #[command(flatten)]
    pub(crate) source: SourceArgs,
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Initial lookback window in months
    #[arg(long)]
    pub(crate) window_months: Option<u32>,
    /// Maximum number of comparables to return
    #[arg(long)]
    pub(crate) limit: Option<usize>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub(crate) format: OutputFormat,
}

#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    #[command(flatten)]
    pub(crate) source: SourceArgs,
    /// Number of valuations run at once. Overrides FAIR_PRICE_BATCH_CONCURRENCY.
    #[arg(long)]
    pub(crate) concurrency: Option<usize>,
    /// Write Prometheus metrics to this file when the batch finishes
    #[arg(long)]
    pub(crate) metrics_out: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub(crate) format: OutputFormat,
}

#[derive(Args, Debug)]
pub(crate) struct TrendsArgs {
    #[command(flatten)]
    pub(crate) source: SourceArgs,
    /// Only report this zip code
    #[arg(long)]
    pub(crate) zip: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub(crate) format: OutputFormat,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Value(args) => commands::value(args),
        Command::Classify(args) => commands::classify(args),
        Command::Comps(args) => commands::comps(args),
        Command::Batch(args) => commands::batch(args).await,
        Command::Trends(args) => commands::trends(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn address_and_property_id_are_exclusive() {
        let result = Cli::try_parse_from([
            "fair-price",
            "value",
            "--county-csv",
            "sales.csv",
            "--address",
            "55 Pearl St",
            "--property-id",
            "9b2f3c1e-4d5a-5b6c-8d7e-0f1a2b3c4d5e",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn classify_accepts_a_list_price_and_date() {
        let cli = Cli::try_parse_from([
            "fair-price",
            "classify",
            "--county-csv",
            "sales.csv",
            "--address",
            "55 Pearl St",
            "--list-price",
            "620000",
            "--as-of",
            "2025-06-30",
            "--format",
            "json",
        ])
        .expect("arguments parse");

        match cli.command {
            Command::Classify(args) => {
                assert_eq!(args.list_price, Some(620_000));
                assert_eq!(args.source.as_of, NaiveDate::from_ymd_opt(2025, 6, 30));
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
